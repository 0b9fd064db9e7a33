//! Relay configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DEFAULT_DETECTOR_WORKERS, DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_TARGET_FPS};

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target_fps must be at least 1")]
    ZeroTargetFps,

    #[error("flush_interval_secs must be at least 1")]
    ZeroFlushInterval,

    #[error("detector_workers must be at least 1")]
    ZeroDetectorWorkers,
}

/// Pipeline settings shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Frames processed per second on each inbound video track.
    pub target_fps: u32,

    /// Seconds between metrics flushes.
    pub flush_interval_secs: u64,

    /// Directory receiving one metrics file per video track.
    pub metrics_dir: PathBuf,

    /// Maximum concurrent detector invocations across all streams.
    pub detector_workers: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            metrics_dir: PathBuf::from("metrics"),
            detector_workers: DEFAULT_DETECTOR_WORKERS,
        }
    }
}

impl RelayConfig {
    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_fps == 0 {
            return Err(ConfigError::ZeroTargetFps);
        }
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.detector_workers == 0 {
            return Err(ConfigError::ZeroDetectorWorkers);
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Metrics file for one track of one connection.
    ///
    /// Track ids repeat across connections; the connection id keeps the
    /// files apart. Characters outside `[A-Za-z0-9_-]` are replaced so ids
    /// cannot escape the metrics directory.
    pub fn metrics_path(&self, connection_id: &str, track_id: &str) -> PathBuf {
        let connection = sanitize(connection_id);
        let track = sanitize(track_id);
        self.metrics_dir.join(format!("metrics_{connection}_{track}.json"))
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
