//! Object detection for vision-relay.
//!
//! This crate defines the [`Detector`] interface consumed by the stream
//! engine, the available backends, and [`DetectorPool`], which runs
//! detectors off the async runtime with bounded concurrency.

mod error;
mod labels;
mod null;
mod pool;
#[cfg(feature = "onnx")]
mod yolo;

pub use error::DetectorError;
pub use labels::{label_for, COCO_LABELS};
pub use null::NullDetector;
pub use pool::{DetectorPool, InferenceOutput};
#[cfg(feature = "onnx")]
pub use yolo::YoloOnnxDetector;

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

/// Result type for detector operations.
pub type DetectorResult<T> = Result<T, DetectorError>;

/// A detection in pixel coordinates of the image it was produced from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Left edge.
    pub x1: f32,

    /// Top edge.
    pub y1: f32,

    /// Right edge.
    pub x2: f32,

    /// Bottom edge.
    pub y2: f32,

    /// Confidence in [0, 1].
    pub confidence: f32,

    /// Index into the model's class list.
    pub class_index: usize,

    /// Human-readable class label.
    pub label: String,
}

impl RawDetection {
    /// Returns true if every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2, self.confidence]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &RawDetection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.width() * self.height() + other.width() * other.height() - inter;
        inter / union
    }
}

/// Trait for object detectors.
///
/// Implementations are synchronous and may be slow; callers on the async
/// runtime must go through [`DetectorPool`]. `detect` can be called from
/// several worker threads at once.
pub trait Detector: Send + Sync {
    /// Run detection on an RGB image.
    fn detect(&self, image: &RgbImage) -> DetectorResult<Vec<RawDetection>>;

    /// Detector name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Detector backend configuration.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// ONNX model path. `None` selects the null detector.
    pub model_path: Option<PathBuf>,

    /// Square model input size in pixels.
    pub input_size: u32,

    /// Minimum confidence kept.
    pub conf_threshold: f32,

    /// IoU above which overlapping boxes of the same class are suppressed.
    pub iou_threshold: f32,

    /// Maximum detections returned per image.
    pub max_detections: usize,

    /// Intra-op threads per inference.
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
            intra_threads: 4,
        }
    }
}

/// Create the detector selected by `config`.
#[cfg(feature = "onnx")]
pub fn create_detector(config: &DetectorConfig) -> DetectorResult<Arc<dyn Detector>> {
    match config.model_path {
        Some(_) => {
            let detector = YoloOnnxDetector::load(config.clone())?;
            tracing::info!("Using ONNX YOLO detector");
            Ok(Arc::new(detector))
        }
        None => {
            tracing::warn!("No model configured, frames will pass through without detections");
            Ok(Arc::new(NullDetector))
        }
    }
}

/// Create the detector selected by `config` (ONNX support not compiled in).
#[cfg(not(feature = "onnx"))]
pub fn create_detector(config: &DetectorConfig) -> DetectorResult<Arc<dyn Detector>> {
    match config.model_path {
        Some(ref path) => Err(DetectorError::NotSupported(format!(
            "cannot load {}: built without the `onnx` feature",
            path.display()
        ))),
        None => {
            tracing::warn!("No model configured, frames will pass through without detections");
            Ok(Arc::new(NullDetector))
        }
    }
}

/// Greedy per-class non-maximum suppression.
///
/// Keeps the highest-confidence box of each overlapping cluster and returns
/// at most `max` detections sorted by descending confidence.
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_index == candidate.class_index && k.iou(&candidate) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
