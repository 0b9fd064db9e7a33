//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote description could not be applied or answered.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Operation not valid in the connection's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A local track with this id already exists.
    #[error("Duplicate track: {0}")]
    DuplicateTrack(String),

    /// Unknown track id.
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    /// The other end of a media channel went away.
    #[error("Channel disconnected")]
    ChannelDisconnected,

    /// Connection already closed.
    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    /// Returns true for errors caused by the remote peer's offer rather than
    /// by this process.
    pub fn is_negotiation(&self) -> bool {
        matches!(self, Self::Negotiation(_) | Self::InvalidState(_))
    }
}
