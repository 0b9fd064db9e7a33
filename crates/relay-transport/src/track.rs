//! Media tracks.

use std::fmt;

use bytes::Bytes;
use relay_ipc::Frame;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::{TransportError, TransportResult, TRACK_CHANNEL_CAPACITY};

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded audio payload. The relay never inspects it.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Presentation timestamp in the track's clock.
    pub pts: i64,

    /// Sample data.
    pub data: Bytes,
}

/// Inbound video from the remote peer.
///
/// `recv` returns `None` once the remote side ends the track.
#[derive(Debug)]
pub struct RemoteVideoTrack {
    id: String,
    frames: mpsc::Receiver<Frame>,
}

impl RemoteVideoTrack {
    /// Create a track and the sender that feeds it.
    pub fn channel(id: impl Into<String>) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(TRACK_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                id: id.into(),
                frames: rx,
            },
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next frame.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

/// Inbound audio from the remote peer.
#[derive(Debug)]
pub struct RemoteAudioTrack {
    id: String,
    chunks: mpsc::Receiver<AudioChunk>,
}

impl RemoteAudioTrack {
    /// Create a track and the sender that feeds it.
    pub fn channel(id: impl Into<String>) -> (mpsc::Sender<AudioChunk>, Self) {
        let (tx, rx) = mpsc::channel(TRACK_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                id: id.into(),
                chunks: rx,
            },
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next chunk.
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        self.chunks.recv().await
    }
}

/// A track announced by the remote peer.
#[derive(Debug)]
pub enum RemoteTrack {
    Audio(RemoteAudioTrack),
    Video(RemoteVideoTrack),
}

impl RemoteTrack {
    pub fn id(&self) -> &str {
        match self {
            Self::Audio(t) => t.id(),
            Self::Video(t) => t.id(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }
}

/// Outbound video sent back to the remote peer.
#[derive(Debug, Clone)]
pub struct LocalVideoTrack {
    id: String,
    frames: mpsc::Sender<Frame>,
}

impl LocalVideoTrack {
    /// Create a track and the receiver the transport drains.
    pub fn channel(id: impl Into<String>) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(TRACK_CHANNEL_CAPACITY);
        (
            Self {
                id: id.into(),
                frames: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a frame for sending.
    ///
    /// Returns `Ok(false)` when the frame was dropped because the transport
    /// is not keeping up, and [`TransportError::ChannelDisconnected`] once
    /// the transport side has gone away.
    pub fn write_frame(&self, frame: Frame) -> TransportResult<bool> {
        match self.frames.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(frame)) => {
                trace!(track = %self.id, pts = frame.pts, "Outbound queue full, dropping frame");
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::ChannelDisconnected),
        }
    }

    /// Returns true once the transport side has gone away.
    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}
