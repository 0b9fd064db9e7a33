//! Error types for the engine.

use relay_detector::DetectorError;
use relay_overlay::OverlayError;
use relay_transport::{ConnectionId, TransportError};
use thiserror::Error;

/// Errors writing a metrics batch.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Sink-specific failure.
    #[error("Sink error: {0}")]
    Sink(String),
}

/// Errors processing a single admitted frame.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Frame could not be converted or rendered.
    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    /// Detector failed on this frame.
    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Errors establishing or managing a peer session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The remote offer could not be negotiated.
    #[error("Negotiation failed: {0}")]
    Negotiation(TransportError),

    /// Transport failure unrelated to the offer.
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Connection id already registered.
    #[error("Connection {0} already registered")]
    DuplicateConnection(ConnectionId),

    /// The manager is shutting down.
    #[error("Session manager is shutting down")]
    ShuttingDown,
}

impl SessionError {
    /// Returns true when the failure was caused by the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Negotiation(_))
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        if e.is_negotiation() {
            Self::Negotiation(e)
        } else {
            Self::Transport(e)
        }
    }
}
