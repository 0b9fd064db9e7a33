//! Peer session lifecycle.

use std::collections::HashSet;
use std::sync::Arc;

use relay_detector::DetectorPool;
use relay_ipc::{ConnectionState, RelayConfig, SessionDescription};
use relay_transport::{
    AudioSink, ConnectionId, NewConnection, PeerConnection, PeerEvent, RemoteTrack,
    RemoteVideoTrack, TransportError, TransportGateway,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::metrics::JsonFileSink;
use crate::processor::{StreamProcessor, StreamStats};
use crate::registry::ConnectionRegistry;
use crate::{SessionError, SessionResult};

/// Owns every peer connection from offer to teardown.
///
/// Each accepted offer gets a supervisor task that follows the connection's
/// events, wires tracks announced after negotiation, and tears the
/// connection down once it reaches a terminal state.
pub struct SessionManager {
    gateway: Arc<dyn TransportGateway>,
    pool: DetectorPool,
    config: Arc<RelayConfig>,
    registry: Arc<ConnectionRegistry>,
    shutdown: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn TransportGateway>, pool: DetectorPool, config: RelayConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            gateway,
            pool,
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of registered connections.
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Negotiate a new connection from a remote offer and return the answer.
    ///
    /// On failure the connection is closed and never registered.
    #[instrument(name = "handle_offer", skip_all)]
    pub async fn handle_offer(&self, offer: SessionDescription) -> SessionResult<SessionDescription> {
        if *self.shutdown.borrow() {
            return Err(SessionError::ShuttingDown);
        }

        let NewConnection { peer, mut events } = self.gateway.create_connection().await?;
        let id = peer.id();
        info!(connection = %id, "Connection created");

        let mut ctx = ConnectionContext::new(
            Arc::clone(&peer),
            self.pool.clone(),
            Arc::clone(&self.config),
        );

        let answer = match ctx.negotiate(offer, &mut events).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(connection = %id, "Negotiation failed: {}", e);
                ctx.teardown("negotiation failed").await;
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        if let Err(e) = self.registry.insert(Arc::clone(&peer), stop_tx) {
            ctx.teardown("registration failed").await;
            return Err(e);
        }

        // Shutdown may have drained the registry while negotiating.
        if *self.shutdown.borrow() {
            self.registry.remove(id);
            ctx.teardown("shutting down").await;
            return Err(SessionError::ShuttingDown);
        }

        let supervisor = tokio::spawn(supervise(
            ctx,
            events,
            stop_rx,
            Arc::clone(&self.registry),
        ));
        self.registry.attach_supervisor(id, supervisor);

        info!(connection = %id, active = self.registry.len(), "Connection established");
        Ok(answer)
    }

    /// Tear down every connection and refuse new offers.
    #[instrument(name = "session_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let connections = self.registry.drain();
        info!(count = connections.len(), "Shutting down sessions");

        for connection in &connections {
            connection.signal_stop();
        }
        for connection in connections {
            connection.join().await;
        }
        info!("All sessions stopped");
    }
}

/// Everything owned by one connection.
struct ConnectionContext {
    id: ConnectionId,
    peer: Arc<dyn PeerConnection>,
    pool: DetectorPool,
    config: Arc<RelayConfig>,
    audio: AudioSink,
    tracks_stop: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<StreamStats>)>,
    wired: HashSet<String>,
    terminal: Option<ConnectionState>,
}

impl ConnectionContext {
    fn new(peer: Arc<dyn PeerConnection>, pool: DetectorPool, config: Arc<RelayConfig>) -> Self {
        let id = peer.id();
        let (tracks_stop, _) = watch::channel(false);
        Self {
            id,
            peer,
            pool,
            config,
            audio: AudioSink::new(id),
            tracks_stop,
            tasks: Vec::new(),
            wired: HashSet::new(),
            terminal: None,
        }
    }

    /// Answer `offer`, wiring the tracks it announces before the answer is
    /// created so the answer covers the outbound tracks.
    async fn negotiate(
        &mut self,
        offer: SessionDescription,
        events: &mut mpsc::UnboundedReceiver<PeerEvent>,
    ) -> SessionResult<SessionDescription> {
        self.peer.set_remote_description(offer).await?;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
        }

        let answer = self.peer.create_answer().await?;
        self.peer.set_local_description(answer).await?;
        self.peer.local_description().ok_or_else(|| {
            SessionError::Transport(TransportError::InvalidState(
                "local description missing after negotiation".into(),
            ))
        })
    }

    /// Apply one event. Returns the state if it is terminal.
    fn handle_event(&mut self, event: PeerEvent) -> Option<ConnectionState> {
        match event {
            PeerEvent::StateChanged(state) => {
                info!(connection = %self.id, state = %state, "Connection state changed");
                if state.is_terminal() {
                    self.terminal = Some(state);
                    return Some(state);
                }
            }
            PeerEvent::TrackReceived(RemoteTrack::Audio(track)) => {
                self.audio.attach(track);
            }
            PeerEvent::TrackReceived(RemoteTrack::Video(track)) => {
                self.wire_video(track);
            }
        }
        None
    }

    /// Start a processor for an inbound video track, answering it with an
    /// outbound track of the same id.
    fn wire_video(&mut self, track: RemoteVideoTrack) {
        let track_id = track.id().to_string();
        if !self.wired.insert(track_id.clone()) {
            warn!(connection = %self.id, track = %track_id, "Video track announced twice, ignoring");
            return;
        }

        let output = match self.peer.add_track(&track_id) {
            Ok(output) => output,
            Err(e) => {
                warn!(connection = %self.id, track = %track_id, "Cannot add outbound track: {}", e);
                return;
            }
        };

        let sink = JsonFileSink::new(self.config.metrics_path(&self.id.to_string(), &track_id));
        debug!(
            connection = %self.id,
            track = %track_id,
            metrics = %sink.path().display(),
            "Starting stream processor"
        );

        let processor = StreamProcessor::new(track, self.pool.clone(), sink, &self.config);
        let handle = tokio::spawn(processor.run(output, self.tracks_stop.subscribe()));
        self.tasks.push((track_id, handle));
    }

    /// Stop every task of the connection and close it.
    async fn teardown(self, reason: &str) {
        info!(connection = %self.id, reason, "Tearing down connection");

        self.tracks_stop.send_replace(true);
        for (track, task) in self.tasks {
            match task.await {
                Ok(stats) => debug!(
                    connection = %self.id,
                    %track,
                    admitted = stats.admitted,
                    failed = stats.failed,
                    "Stream processor joined"
                ),
                Err(e) => warn!(connection = %self.id, %track, "Stream processor task failed: {}", e),
            }
        }

        self.audio.stop().await;

        if let Err(e) = self.peer.close().await {
            warn!(connection = %self.id, "Error closing connection: {}", e);
        }
        info!(connection = %self.id, "Connection torn down");
    }
}

/// Follow a connection's events until it ends, then tear it down and
/// deregister it.
async fn supervise(
    mut ctx: ConnectionContext,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
    mut stop: watch::Receiver<bool>,
    registry: Arc<ConnectionRegistry>,
) {
    let id = ctx.id;
    debug!(connection = %id, "Supervisor started");

    let reason: String = match ctx.terminal {
        Some(state) => state.to_string(),
        None => loop {
            tokio::select! {
                _ = stop.changed() => break "shutdown".to_string(),
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(state) = ctx.handle_event(event) {
                            break state.to_string();
                        }
                    }
                    None => break "event stream ended".to_string(),
                },
            }
        },
    };

    ctx.teardown(&reason).await;
    registry.remove(id);
}
