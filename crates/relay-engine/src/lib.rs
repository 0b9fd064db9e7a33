//! Stream engine for vision-relay.
//!
//! This crate turns inbound peer video into annotated outbound video: the
//! [`FrameGate`] paces each track, the [`StreamProcessor`] runs admitted
//! frames through the detector pool and overlay, the [`MetricsRecorder`]
//! persists per-frame records on an interval, and the [`SessionManager`]
//! owns every connection's lifecycle.

mod error;
mod gate;
mod metrics;
mod processor;
mod registry;
mod session;

use std::time::Duration;

pub use error::{MetricsError, ProcessError, SessionError};
pub use gate::{FrameGate, StreamState};
pub use metrics::{JsonFileSink, MetricsRecorder, MetricsSink};
pub use processor::{StreamProcessor, StreamStats};
pub use registry::{ConnectionRegistry, RegisteredConnection};
pub use session::SessionManager;

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Interval between periodic stream stats log lines.
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// After the first few frames, per-frame debug logging is emitted for every
/// `FRAME_LOG_SAMPLE`th frame only.
pub const FRAME_LOG_SAMPLE: u64 = 100;
