//! Peer connection state machine types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a peer connection as reported by the transport.
///
/// Connections move `New -> Connecting -> Connected` and end in one of the
/// terminal states `Failed`, `Closed` or `Disconnected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, negotiation not started.
    #[default]
    New,

    /// Negotiating / establishing transport.
    Connecting,

    /// Media is flowing.
    Connected,

    /// Peer went away.
    Disconnected,

    /// Transport failed.
    Failed,

    /// Closed locally or remotely.
    Closed,
}

impl ConnectionState {
    /// Returns true for states the connection cannot recover from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed | Self::Disconnected)
    }

    /// Returns true if media is flowing.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
