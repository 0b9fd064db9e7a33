//! Bounded inference pool.

use std::sync::Arc;

use image::RgbImage;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::{Detector, DetectorError, DetectorResult, RawDetection};

/// Result of one pooled inference: the input image handed back together with
/// the validated detections.
#[derive(Debug)]
pub struct InferenceOutput {
    pub image: RgbImage,
    pub detections: Vec<RawDetection>,
}

/// Runs a shared [`Detector`] on the blocking thread pool.
///
/// At most `workers` inferences run at once across every clone of the pool;
/// further callers wait for a permit. A permit is held by the worker thread
/// until inference returns, even if the awaiting task has been dropped, so
/// abandoned calls still count against the bound.
#[derive(Clone)]
pub struct DetectorPool {
    detector: Arc<dyn Detector>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl DetectorPool {
    /// Create a pool running at most `workers` concurrent inferences.
    pub fn new(detector: Arc<dyn Detector>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            detector,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Maximum concurrent inferences.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Name of the wrapped detector.
    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Run detection on `image` off the async runtime.
    pub async fn detect(&self, image: RgbImage) -> DetectorResult<InferenceOutput> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DetectorError::PoolClosed)?;

        let detector = Arc::clone(&self.detector);
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = detector.detect(&image);
            (image, result)
        });

        let (image, result) = handle
            .await
            .map_err(|e| DetectorError::WorkerPanicked(e.to_string()))?;
        let detections = result?;

        if let Some(bad) = detections.iter().find(|d| !d.is_finite()) {
            return Err(DetectorError::MalformedOutput(format!(
                "non-finite box for class {} ({})",
                bad.class_index, bad.label
            )));
        }

        trace!(count = detections.len(), "Inference complete");
        Ok(InferenceOutput { image, detections })
    }

    /// Stop accepting work. Pending and future calls fail with
    /// [`DetectorError::PoolClosed`]; running inferences finish.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct SlowDetector {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Detector for SlowDetector {
        fn detect(&self, _image: &RgbImage) -> DetectorResult<Vec<RawDetection>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct FixedDetector(Vec<RawDetection>);

    impl Detector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> DetectorResult<Vec<RawDetection>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&self, _image: &RgbImage) -> DetectorResult<Vec<RawDetection>> {
            panic!("model exploded");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    fn raw(x1: f32) -> RawDetection {
        RawDetection {
            x1,
            y1: 0.0,
            x2: 4.0,
            y2: 4.0,
            confidence: 0.9,
            class_index: 0,
            label: "person".into(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_concurrency() {
        let detector = Arc::new(SlowDetector {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = DetectorPool::new(detector.clone(), 2);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.detect(RgbImage::new(4, 4)).await.map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(detector.peak.load(Ordering::SeqCst) <= 2);
        assert!(detector.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_pool_returns_image_and_detections() {
        let pool = DetectorPool::new(Arc::new(FixedDetector(vec![raw(1.0)])), 1);
        let out = pool.detect(RgbImage::new(8, 6)).await.unwrap();
        assert_eq!(out.image.dimensions(), (8, 6));
        assert_eq!(out.detections, vec![raw(1.0)]);
        assert_eq!(pool.detector_name(), "fixed");
    }

    #[tokio::test]
    async fn test_pool_rejects_non_finite_output() {
        let pool = DetectorPool::new(Arc::new(FixedDetector(vec![raw(f32::NAN)])), 1);
        let err = pool.detect(RgbImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, DetectorError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_pool_contains_worker_panics() {
        let pool = DetectorPool::new(Arc::new(PanickingDetector), 1);
        let err = pool.detect(RgbImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, DetectorError::WorkerPanicked(_)));

        // The permit was released; the pool is still usable.
        let err = pool.detect(RgbImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, DetectorError::WorkerPanicked(_)));
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_work() {
        let pool = DetectorPool::new(Arc::new(FixedDetector(Vec::new())), 1);
        pool.close();
        let err = pool.detect(RgbImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, DetectorError::PoolClosed));
    }
}
