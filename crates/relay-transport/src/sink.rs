//! Audio sink that consumes and discards inbound audio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{ConnectionId, RemoteAudioTrack};

/// Drains every attached audio track so the remote sender never stalls.
///
/// Each attached track is read by its own task until the track ends or the
/// sink is stopped.
pub struct AudioSink {
    connection: ConnectionId,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    consumed: Arc<AtomicU64>,
}

impl AudioSink {
    pub fn new(connection: ConnectionId) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            connection,
            stop_tx,
            tasks: Vec::new(),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start draining `track`.
    pub fn attach(&mut self, mut track: RemoteAudioTrack) {
        let mut stop_rx = self.stop_tx.subscribe();
        let consumed = Arc::clone(&self.consumed);
        let connection = self.connection;
        debug!(%connection, track = %track.id(), "Audio track attached to sink");

        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    chunk = track.recv() => match chunk {
                        Some(_) => {
                            consumed.fetch_add(1, Ordering::Relaxed);
                        }
                        None => break,
                    },
                }
            }
            debug!(%connection, track = %track.id(), "Audio track drained");
        }));
    }

    /// Number of attached tracks.
    pub fn track_count(&self) -> usize {
        self.tasks.len()
    }

    /// Total chunks discarded so far.
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Stop all drain tasks and wait for them to finish.
    pub async fn stop(self) {
        self.stop_tx.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(connection = %self.connection, "Audio drain task failed: {}", e);
            }
        }
        debug!(
            connection = %self.connection,
            consumed = self.consumed.load(Ordering::Relaxed),
            "Audio sink stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::AudioChunk;

    #[tokio::test]
    async fn test_sink_drains_and_stops() {
        let mut sink = AudioSink::new(ConnectionId::new(7));
        let (tx, track) = RemoteAudioTrack::channel("mic");
        sink.attach(track);
        assert_eq!(sink.track_count(), 1);

        for pts in 0..3 {
            tx.send(AudioChunk {
                pts,
                data: Bytes::from_static(&[0; 4]),
            })
            .await
            .unwrap();
        }
        while sink.consumed() < 3 {
            tokio::task::yield_now().await;
        }

        sink.stop().await;
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_stop_without_tracks() {
        AudioSink::new(ConnectionId::new(1)).stop().await;
    }
}
