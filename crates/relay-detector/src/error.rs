//! Error types for the detector module.

use thiserror::Error;

/// Errors that can occur while loading or running a detector.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Model file missing or unreadable.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Backend failed to initialize.
    #[error("Detector initialization failed: {0}")]
    Initialization(String),

    /// Inference call failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Detector returned values that cannot be interpreted.
    #[error("Malformed detector output: {0}")]
    MalformedOutput(String),

    /// Input image unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A worker thread panicked while running inference.
    #[error("Detector worker panicked: {0}")]
    WorkerPanicked(String),

    /// The pool was shut down.
    #[error("Detector pool closed")]
    PoolClosed,

    /// Backend not compiled in.
    #[error("Not supported: {0}")]
    NotSupported(String),
}
