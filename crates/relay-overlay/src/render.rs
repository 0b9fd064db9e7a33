//! Detection overlay rendering.

use bytes::Bytes;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use relay_ipc::{Detection, Frame, PixelFormat};
use tracing::trace;

use crate::{OverlayError, OverlayResult, BOX_THICKNESS, LABEL_TAB_HEIGHT};

/// Box colours, picked per label so a class keeps its colour across frames.
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [203, 56, 255],
];

/// Colour used for a given label.
pub fn label_color(label: &str) -> Rgb<u8> {
    // FNV-1a, stable across runs.
    let hash = label
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    Rgb(PALETTE[hash as usize % PALETTE.len()])
}

/// Draws detection boxes onto decoded frames.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    thickness: u32,
    tab_height: u32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            thickness: BOX_THICKNESS,
            tab_height: LABEL_TAB_HEIGHT,
        }
    }
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `detections` onto `image` in place.
    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        for detection in detections {
            let color = label_color(detection.label());
            let (x1, y1, x2, y2) = detection.to_pixels(width, height);
            let x = (x1.floor() as i32).clamp(0, width as i32 - 1);
            let y = (y1.floor() as i32).clamp(0, height as i32 - 1);
            let w = ((x2 - x1).round() as u32).clamp(1, width - x as u32);
            let h = ((y2 - y1).round() as u32).clamp(1, height - y as u32);

            for inset in 0..self.thickness {
                let (iw, ih) = (w.saturating_sub(2 * inset), h.saturating_sub(2 * inset));
                if iw == 0 || ih == 0 {
                    break;
                }
                let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(iw, ih);
                draw_hollow_rect_mut(image, rect, color);
            }

            // Label tab above the box, over its top edge at the frame border.
            // Width scales with the score.
            let tab_w = ((w as f32 * detection.score()).round() as u32).max(self.thickness);
            let tab_y = (y - self.tab_height as i32).max(0);
            let tab = Rect::at(x, tab_y).of_size(tab_w.max(1), self.tab_height.max(1));
            draw_filled_rect_mut(image, tab, color);
        }
    }

    /// Draw `detections` onto `image` and wrap the result as an RGB frame
    /// carrying `source`'s timing metadata.
    pub fn render(
        &self,
        source: &Frame,
        mut image: RgbImage,
        detections: &[Detection],
    ) -> OverlayResult<Frame> {
        let dims = image.dimensions();
        if dims != (source.width, source.height) {
            return Err(OverlayError::DimensionMismatch {
                expected: (source.width, source.height),
                actual: dims,
            });
        }

        self.draw(&mut image, detections);
        trace!(boxes = detections.len(), pts = source.pts, "Overlay rendered");

        Ok(source.with_image(
            dims.0,
            dims.1,
            PixelFormat::Rgb24,
            Bytes::from(image.into_raw()),
        ))
    }
}
