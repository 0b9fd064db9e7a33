//! Conversion of inbound frames to the detector's RGB layout.

use image::RgbImage;
use relay_ipc::{Frame, PixelFormat};

use crate::{OverlayError, OverlayResult};

/// Convert a frame of any supported format to a packed RGB image.
///
/// The payload length is checked against the frame's declared dimensions
/// first, so malformed frames never reach the detector.
pub fn to_rgb_image(frame: &Frame) -> OverlayResult<RgbImage> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(OverlayError::EmptyFrame { width, height });
    }

    let expected = frame.format.buffer_size(width, height);
    if frame.data.len() != expected {
        return Err(OverlayError::BufferSize {
            format: frame.format,
            expected,
            actual: frame.data.len(),
        });
    }

    let data = &frame.data[..];
    let rgb = match frame.format {
        PixelFormat::Rgb24 => data.to_vec(),
        PixelFormat::Bgr24 => data
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect(),
        PixelFormat::Rgba => data
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect(),
        PixelFormat::I420 => i420_to_rgb(data, width, height),
    };

    RgbImage::from_raw(width, height, rgb).ok_or(OverlayError::BufferSize {
        format: frame.format,
        expected,
        actual: frame.data.len(),
    })
}

/// BT.601 limited-range YUV 4:2:0 to packed RGB.
fn i420_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let (y_plane, rest) = data.split_at(w * h);
    let (u_plane, v_plane) = rest.split_at(cw * ch);

    let mut out = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        for col in 0..w {
            let c = y_plane[row * w + col] as i32 - 16;
            let chroma = (row / 2) * cw + col / 2;
            let d = u_plane[chroma] as i32 - 128;
            let e = v_plane[chroma] as i32 - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;
            out.extend_from_slice(&[clamp_u8(r), clamp_u8(g), clamp_u8(b)]);
        }
    }
    out
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
