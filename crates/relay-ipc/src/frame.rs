//! Video frame types.

use std::fmt;

use bytes::Bytes;

/// Rational scale converting presentation timestamps to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    num: u32,
    den: u32,
}

impl TimeBase {
    /// The 90 kHz clock used by RTP video payloads.
    pub const VIDEO_90KHZ: TimeBase = TimeBase { num: 1, den: 90_000 };

    /// Millisecond ticks.
    pub const MILLIS: TimeBase = TimeBase { num: 1, den: 1_000 };

    /// Create a time-base of `num / den` seconds per tick.
    ///
    /// Returns `None` when `den` is zero.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    /// Numerator.
    pub fn num(&self) -> u32 {
        self.num
    }

    /// Denominator (never zero).
    pub fn den(&self) -> u32 {
        self.den
    }

    /// Convert a timestamp in ticks to whole milliseconds, truncating.
    pub fn to_millis(&self, pts: i64) -> i64 {
        let ms = pts as i128 * self.num as i128 * 1000 / self.den as i128;
        ms.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Convert a timestamp in ticks to seconds.
    pub fn to_seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 8-bit RGB.
    Rgb24,

    /// Packed 8-bit BGR.
    Bgr24,

    /// Packed 8-bit RGBA.
    Rgba,

    /// Planar YUV 4:2:0 (Y, then U, then V; chroma planes rounded up).
    I420,
}

impl PixelFormat {
    /// Expected buffer size in bytes for the given dimensions.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Rgb24 | Self::Bgr24 => pixels * 3,
            Self::Rgba => pixels * 4,
            Self::I420 => {
                let chroma_w = (width as usize + 1) / 2;
                let chroma_h = (height as usize + 1) / 2;
                pixels + 2 * chroma_w * chroma_h
            }
        }
    }

    /// Short lowercase name, as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Rgba => "rgba",
            Self::I420 => "i420",
        }
    }
}

/// A decoded video frame.
///
/// Frames are immutable once received; the payload is reference counted so
/// handing a frame between stages never copies pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Layout of `data`.
    pub format: PixelFormat,

    /// Pixel data.
    pub data: Bytes,

    /// Presentation timestamp in `time_base` ticks.
    pub pts: i64,

    /// Scale converting `pts` to seconds.
    pub time_base: TimeBase,
}

impl Frame {
    /// Create a new frame.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Bytes,
        pts: i64,
        time_base: TimeBase,
    ) -> Self {
        Self {
            width,
            height,
            format,
            data,
            pts,
            time_base,
        }
    }

    /// Validate that the payload matches the declared dimensions and format.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.format.buffer_size(self.width, self.height)
    }

    /// Capture time on the stream's media clock, in milliseconds.
    pub fn capture_ts_ms(&self) -> i64 {
        self.time_base.to_millis(self.pts)
    }

    /// Build a frame carrying a new image but this frame's timing metadata.
    pub fn with_image(&self, width: u32, height: u32, format: PixelFormat, data: Bytes) -> Frame {
        Frame {
            width,
            height,
            format,
            data,
            pts: self.pts,
            time_base: self.time_base,
        }
    }
}
