//! Active connection tracking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_transport::{ConnectionId, PeerConnection};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{SessionError, SessionResult};

/// A connection owned by the registry.
pub struct RegisteredConnection {
    /// The peer connection.
    pub peer: Arc<dyn PeerConnection>,

    /// When the connection was registered.
    pub created_at: Instant,

    stop: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl RegisteredConnection {
    /// Ask the connection's supervisor to tear it down.
    pub fn signal_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Wait for the supervisor to finish, if one was attached.
    pub async fn join(mut self) {
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                warn!(connection = %self.peer.id(), "Supervisor task failed: {}", e);
            }
        }
    }
}

/// The set of active connections, keyed by id.
///
/// Entries are added once negotiation succeeds and removed when the
/// connection reaches a terminal state. All mutation goes through one lock.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, RegisteredConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. `stop` is signalled to request teardown.
    pub fn insert(
        &self,
        peer: Arc<dyn PeerConnection>,
        stop: watch::Sender<bool>,
    ) -> SessionResult<()> {
        let id = peer.id();
        let mut connections = self.connections.lock();
        if connections.contains_key(&id) {
            return Err(SessionError::DuplicateConnection(id));
        }

        connections.insert(
            id,
            RegisteredConnection {
                peer,
                created_at: Instant::now(),
                stop,
                supervisor: None,
            },
        );
        debug!(connection = %id, active = connections.len(), "Connection registered");
        Ok(())
    }

    /// Attach the supervisor task of a registered connection.
    ///
    /// Returns false if the connection is no longer registered; the handle is
    /// dropped and the task keeps running detached.
    pub fn attach_supervisor(&self, id: ConnectionId, handle: JoinHandle<()>) -> bool {
        match self.connections.lock().get_mut(&id) {
            Some(entry) => {
                entry.supervisor = Some(handle);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: ConnectionId) -> Option<RegisteredConnection> {
        let mut connections = self.connections.lock();
        let removed = connections.remove(&id);
        if removed.is_some() {
            debug!(connection = %id, active = connections.len(), "Connection removed");
        }
        removed
    }

    /// Remove and return every connection.
    pub fn drain(&self) -> Vec<RegisteredConnection> {
        self.connections.lock().drain().map(|(_, c)| c).collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Ids of every registered connection, sorted.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}
