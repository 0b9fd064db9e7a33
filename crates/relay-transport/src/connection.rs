//! Peer connection interface.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use relay_ipc::{ConnectionState, SessionDescription};
use tokio::sync::mpsc;

use crate::{LocalVideoTrack, RemoteTrack, TransportResult};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pc-{}", self.0)
    }
}

/// Events raised by a peer connection.
#[derive(Debug)]
pub enum PeerEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),

    /// The remote peer added a track.
    TrackReceived(RemoteTrack),
}

/// A connection to one remote peer.
///
/// Negotiation follows the answerer side of offer/answer: apply the remote
/// offer, create an answer, apply it locally, then read back the final local
/// description.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Apply the remote peer's offer. Tracks it announces are reported as
    /// [`PeerEvent::TrackReceived`] before this returns.
    async fn set_remote_description(&self, description: SessionDescription)
        -> TransportResult<()>;

    /// Create an answer covering every local track added so far.
    async fn create_answer(&self) -> TransportResult<SessionDescription>;

    /// Apply the local answer.
    async fn set_local_description(&self, description: SessionDescription)
        -> TransportResult<()>;

    /// The applied local description, if any.
    fn local_description(&self) -> Option<SessionDescription>;

    /// Add an outbound video track.
    fn add_track(&self, track_id: &str) -> TransportResult<LocalVideoTrack>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> TransportResult<()>;
}

/// A newly created connection and its event stream.
///
/// The stream is unbounded: a connection raises one event per track and per
/// state change, and none of them may be lost.
pub struct NewConnection {
    pub peer: Arc<dyn PeerConnection>,
    pub events: mpsc::UnboundedReceiver<PeerEvent>,
}

/// Factory for peer connections.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    async fn create_connection(&self) -> TransportResult<NewConnection>;
}
