//! Peer transport for vision-relay.
//!
//! This crate defines the connection and negotiation interface the session
//! layer drives ([`TransportGateway`], [`PeerConnection`]), the typed
//! [`PeerEvent`] stream replacing connection callbacks, the media track
//! types, the audio sink, and an in-process [`LoopbackGateway`].

mod connection;
mod error;
mod loopback;
mod sink;
mod track;

pub use connection::{ConnectionId, NewConnection, PeerConnection, PeerEvent, TransportGateway};
pub use error::TransportError;
pub use loopback::{build_offer, LoopbackGateway, LoopbackPeer, LoopbackRemote};
pub use sink::AudioSink;
pub use track::{
    AudioChunk, LocalVideoTrack, MediaKind, RemoteAudioTrack, RemoteTrack, RemoteVideoTrack,
};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Capacity of each media track channel, in frames or chunks.
pub const TRACK_CHANNEL_CAPACITY: usize = 30;
