//! Shared types for vision-relay.
//!
//! This crate defines the data model passed between the transport, the
//! detector, the overlay renderer and the stream engine: frames and their
//! timing metadata, detections, per-frame metrics, connection states and the
//! session descriptors exchanged during negotiation.

mod config;
mod detection;
mod frame;
mod sdp;
mod state;

pub use config::{ConfigError, RelayConfig};
pub use detection::{Detection, FrameMetric};
pub use frame::{Frame, PixelFormat, TimeBase};
pub use sdp::{SdpType, SessionDescription};
pub use state::ConnectionState;

/// Default number of frames processed per second on each video track.
pub const DEFAULT_TARGET_FPS: u32 = 15;

/// Default interval between metrics flushes, in seconds.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Default number of concurrent detector invocations.
pub const DEFAULT_DETECTOR_WORKERS: usize = 2;
