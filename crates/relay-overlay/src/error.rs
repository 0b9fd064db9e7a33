//! Error types for the overlay module.

use relay_ipc::PixelFormat;
use thiserror::Error;

/// Errors that can occur while converting or rendering frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverlayError {
    /// Frame has a zero dimension.
    #[error("Empty frame: {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    /// Payload length does not match the declared layout.
    #[error("Malformed {format:?} frame: expected {expected} bytes, got {actual}")]
    BufferSize {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    /// Image dimensions disagree with the frame being rendered.
    #[error("Image is {actual:?}, frame is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}
