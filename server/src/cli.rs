//! Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use relay_detector::DetectorConfig;
use relay_ipc::{
    RelayConfig, DEFAULT_DETECTOR_WORKERS, DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_TARGET_FPS,
};

/// Relays peer video back with object detections drawn on it.
#[derive(Debug, Parser)]
#[command(name = "vision-relay", version, about)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "RELAY_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// HTTP port for signalling.
    #[arg(long, env = "RELAY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Frames processed per second on each video track.
    #[arg(long, env = "TARGET_FPS", default_value_t = DEFAULT_TARGET_FPS)]
    pub target_fps: u32,

    /// Directory for per-track metrics files.
    #[arg(long, env = "METRICS_DIR", default_value = "metrics")]
    pub metrics_dir: PathBuf,

    /// Seconds between metrics flushes.
    #[arg(long, env = "METRICS_FLUSH_SECS", default_value_t = DEFAULT_FLUSH_INTERVAL_SECS)]
    pub flush_interval_secs: u64,

    /// Maximum concurrent detector invocations.
    #[arg(long, env = "DETECTOR_WORKERS", default_value_t = DEFAULT_DETECTOR_WORKERS)]
    pub detector_workers: usize,

    /// YOLO ONNX model. Without one, frames are relayed with no detections.
    #[arg(long = "model", env = "MODEL_PATH")]
    pub model: Option<PathBuf>,

    /// Minimum detection confidence.
    #[arg(long, env = "CONF_THRESHOLD", default_value_t = 0.25)]
    pub conf_threshold: f32,

    /// IoU threshold for non-maximum suppression.
    #[arg(long, env = "IOU_THRESHOLD", default_value_t = 0.45)]
    pub iou_threshold: f32,
}

impl Cli {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            target_fps: self.target_fps,
            flush_interval_secs: self.flush_interval_secs,
            metrics_dir: self.metrics_dir.clone(),
            detector_workers: self.detector_workers,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            model_path: self.model.clone(),
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            ..Default::default()
        }
    }
}
