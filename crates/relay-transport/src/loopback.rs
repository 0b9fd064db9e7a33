//! In-process transport.
//!
//! [`LoopbackGateway`] creates connections whose remote side is driven from
//! the same process through a [`LoopbackRemote`] handle: media sections of
//! the offer become remote tracks, frames pushed through the handle arrive on
//! those tracks, and outbound tracks can be read back. It performs the
//! offer/answer state checks of a real peer connection but no networking.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_ipc::{ConnectionState, Frame, SdpType, SessionDescription};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    AudioChunk, ConnectionId, LocalVideoTrack, MediaKind, NewConnection, PeerConnection,
    PeerEvent, RemoteAudioTrack, RemoteTrack, RemoteVideoTrack, TransportError,
    TransportGateway, TransportResult,
};

/// Build an SDP offer with one media section per `(kind, track id)`.
pub fn build_offer(tracks: &[(MediaKind, &str)]) -> SessionDescription {
    let mut sdp = String::from("v=0\r\no=- 0 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
    for (kind, id) in tracks {
        let payload = match kind {
            MediaKind::Audio => "111",
            MediaKind::Video => "96",
        };
        sdp.push_str(&format!(
            "m={kind} 9 UDP/TLS/RTP/SAVPF {payload}\r\na=msid:remote {id}\r\na=sendrecv\r\n"
        ));
    }
    SessionDescription::offer(sdp)
}

/// Media sections of an SDP document as `(kind, track id)`.
///
/// The track id comes from the section's `a=msid` line; sections without one
/// are named after their kind and position.
fn media_sections(sdp: &str) -> Vec<(MediaKind, String)> {
    let mut sections = Vec::new();
    let mut current: Option<usize> = None;
    let mut index = 0;

    for line in sdp.lines().map(|l| l.trim_end_matches('\r')) {
        if let Some(media) = line.strip_prefix("m=") {
            let kind = match media.split_whitespace().next() {
                Some("video") => Some(MediaKind::Video),
                Some("audio") => Some(MediaKind::Audio),
                _ => None,
            };
            current = kind.map(|kind| {
                sections.push((kind, format!("{kind}{index}")));
                sections.len() - 1
            });
            index += 1;
        } else if let (Some(pos), Some(msid)) = (current, line.strip_prefix("a=msid:")) {
            let mut parts = msid.split_whitespace();
            let stream = parts.next();
            if let Some(id) = parts.next().or(stream) {
                sections[pos].1 = id.to_string();
            }
        }
    }
    sections
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    closed: bool,
    remote: Option<SessionDescription>,
    local: Option<SessionDescription>,
    inbound_video: HashMap<String, mpsc::Sender<Frame>>,
    inbound_audio: HashMap<String, mpsc::Sender<AudioChunk>>,
    outbound_ids: Vec<String>,
    outbound: HashMap<String, mpsc::Receiver<Frame>>,
}

struct Shared {
    id: ConnectionId,
    events: mpsc::UnboundedSender<PeerEvent>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn emit(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            warn!(connection = %self.id, "Peer event dropped, no subscriber");
        }
    }

    fn transition_to(&self, state: ConnectionState) {
        let previous = {
            let mut inner = self.inner.lock();
            if inner.state == state {
                return;
            }
            std::mem::replace(&mut inner.state, state)
        };

        debug!(
            connection = %self.id,
            previous = %previous,
            current = %state,
            "Connection state transition"
        );
        self.emit(PeerEvent::StateChanged(state));
    }

    fn announce(&self, kind: MediaKind, id: &str) -> TransportResult<()> {
        let track = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(TransportError::Closed);
            }
            match kind {
                MediaKind::Video => {
                    let (tx, track) = RemoteVideoTrack::channel(id);
                    inner.inbound_video.insert(id.to_string(), tx);
                    RemoteTrack::Video(track)
                }
                MediaKind::Audio => {
                    let (tx, track) = RemoteAudioTrack::channel(id);
                    inner.inbound_audio.insert(id.to_string(), tx);
                    RemoteTrack::Audio(track)
                }
            }
        };

        debug!(connection = %self.id, %kind, track = id, "Remote track announced");
        self.emit(PeerEvent::TrackReceived(track));
        Ok(())
    }
}

/// Local end of a loopback connection.
pub struct LoopbackPeer {
    shared: Arc<Shared>,
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    fn id(&self) -> ConnectionId {
        self.shared.id
    }

    fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> TransportResult<()> {
        let sections = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(TransportError::Closed);
            }
            if inner.remote.is_some() {
                return Err(TransportError::InvalidState(
                    "remote description already set".into(),
                ));
            }
            if description.sdp_type != SdpType::Offer {
                return Err(TransportError::Negotiation(format!(
                    "expected an offer, got {}",
                    description.sdp_type
                )));
            }
            if !description.sdp.starts_with("v=0") {
                return Err(TransportError::Negotiation(
                    "offer is not an SDP document".into(),
                ));
            }
            let sections = media_sections(&description.sdp);
            if sections.is_empty() {
                return Err(TransportError::Negotiation(
                    "offer has no audio or video section".into(),
                ));
            }
            inner.remote = Some(description);
            sections
        };

        for (kind, id) in &sections {
            self.shared.announce(*kind, id)?;
        }
        self.shared.transition_to(ConnectionState::Connecting);
        Ok(())
    }

    async fn create_answer(&self) -> TransportResult<SessionDescription> {
        let inner = self.shared.inner.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        let Some(remote) = inner.remote.as_ref() else {
            return Err(TransportError::InvalidState(
                "no remote description".into(),
            ));
        };

        let mut sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            self.shared.id.get()
        );
        for (kind, id) in media_sections(&remote.sdp) {
            let direction = match kind {
                MediaKind::Video if inner.outbound_ids.contains(&id) => "sendrecv",
                _ => "recvonly",
            };
            sdp.push_str(&format!(
                "m={kind} 9 UDP/TLS/RTP/SAVPF 0\r\na=msid:relay {id}\r\na={direction}\r\n"
            ));
        }
        Ok(SessionDescription::answer(sdp))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> TransportResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(TransportError::Closed);
            }
            if inner.remote.is_none() {
                return Err(TransportError::InvalidState(
                    "no remote description".into(),
                ));
            }
            if description.sdp_type != SdpType::Answer {
                return Err(TransportError::Negotiation(format!(
                    "expected an answer, got {}",
                    description.sdp_type
                )));
            }
            inner.local = Some(description);
        }

        self.shared.transition_to(ConnectionState::Connected);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.shared.inner.lock().local.clone()
    }

    fn add_track(&self, track_id: &str) -> TransportResult<LocalVideoTrack> {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if inner.outbound_ids.iter().any(|id| id == track_id) {
            return Err(TransportError::DuplicateTrack(track_id.to_string()));
        }

        let (track, rx) = LocalVideoTrack::channel(track_id);
        inner.outbound_ids.push(track_id.to_string());
        inner.outbound.insert(track_id.to_string(), rx);
        Ok(track)
    }

    async fn close(&self) -> TransportResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            inner.inbound_video.clear();
            inner.inbound_audio.clear();
            inner.outbound.clear();
        }

        info!(connection = %self.shared.id, "Connection closed");
        self.shared.transition_to(ConnectionState::Closed);
        Ok(())
    }
}

/// Remote end of a loopback connection.
#[derive(Clone)]
pub struct LoopbackRemote {
    shared: Arc<Shared>,
}

impl LoopbackRemote {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// Push a frame onto an inbound video track, waiting for capacity.
    pub async fn send_frame(&self, track_id: &str, frame: Frame) -> TransportResult<()> {
        let tx = self
            .shared
            .inner
            .lock()
            .inbound_video
            .get(track_id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownTrack(track_id.to_string()))?;
        tx.send(frame)
            .await
            .map_err(|_| TransportError::ChannelDisconnected)
    }

    /// Push a chunk onto an inbound audio track, waiting for capacity.
    pub async fn send_audio(&self, track_id: &str, chunk: AudioChunk) -> TransportResult<()> {
        let tx = self
            .shared
            .inner
            .lock()
            .inbound_audio
            .get(track_id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownTrack(track_id.to_string()))?;
        tx.send(chunk)
            .await
            .map_err(|_| TransportError::ChannelDisconnected)
    }

    /// End an inbound track.
    pub fn end_track(&self, track_id: &str) {
        let mut inner = self.shared.inner.lock();
        inner.inbound_video.remove(track_id);
        inner.inbound_audio.remove(track_id);
    }

    /// Announce a new remote track after negotiation.
    pub fn add_remote_track(&self, kind: MediaKind, track_id: &str) -> TransportResult<()> {
        self.shared.announce(kind, track_id)
    }

    /// Drive the connection to `state`, as the network layer would.
    pub fn set_state(&self, state: ConnectionState) {
        self.shared.transition_to(state);
    }

    /// Ids of the outbound tracks added by the local side, in order.
    pub fn outbound_tracks(&self) -> Vec<String> {
        self.shared.inner.lock().outbound_ids.clone()
    }

    /// Take the receiving end of an outbound track.
    pub fn take_outbound(&self, track_id: &str) -> Option<mpsc::Receiver<Frame>> {
        self.shared.inner.lock().outbound.remove(track_id)
    }
}

/// Gateway producing loopback connections.
///
/// The gateway only observes its connections: once every handle to a
/// connection is gone, it is forgotten.
#[derive(Default)]
pub struct LoopbackGateway {
    connections: Mutex<Vec<Weak<Shared>>>,
}

impl LoopbackGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote handles of every live connection, oldest first.
    pub fn remotes(&self) -> Vec<LoopbackRemote> {
        let mut connections = self.connections.lock();
        connections.retain(|c| c.strong_count() > 0);
        connections
            .iter()
            .filter_map(Weak::upgrade)
            .map(|shared| LoopbackRemote { shared })
            .collect()
    }

    /// Remote handle of the most recent live connection.
    pub fn last_remote(&self) -> Option<LoopbackRemote> {
        self.remotes().pop()
    }
}

#[async_trait]
impl TransportGateway for LoopbackGateway {
    async fn create_connection(&self) -> TransportResult<NewConnection> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id: ConnectionId::next(),
            events: events_tx,
            inner: Mutex::new(Inner::default()),
        });

        {
            let mut connections = self.connections.lock();
            connections.retain(|c| c.strong_count() > 0);
            connections.push(Arc::downgrade(&shared));
            debug!(connection = %shared.id, live = connections.len(), "Loopback connection created");
        }

        Ok(NewConnection {
            peer: Arc::new(LoopbackPeer { shared }),
            events,
        })
    }
}
