//! Pass-through detector.

use image::RgbImage;

use crate::{Detector, DetectorResult, RawDetection};

/// Detector that never finds anything.
///
/// Used when no model is configured so the rest of the pipeline (pacing,
/// overlay, metrics) still runs end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _image: &RgbImage) -> DetectorResult<Vec<RawDetection>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
