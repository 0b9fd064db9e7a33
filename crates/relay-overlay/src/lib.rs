//! Frame conversion and detection overlay for vision-relay.
//!
//! Inbound frames are converted to packed RGB for the detector; the same
//! image is then annotated with the detections and handed back to the
//! transport as an `Rgb24` frame carrying the inbound timing metadata.

mod convert;
mod error;
mod render;

pub use convert::to_rgb_image;
pub use error::OverlayError;
pub use render::{label_color, OverlayRenderer};

/// Result type for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Outline thickness of detection boxes, in pixels.
pub const BOX_THICKNESS: u32 = 2;

/// Height of the filled label tab drawn above each box, in pixels.
pub const LABEL_TAB_HEIGHT: u32 = 6;
