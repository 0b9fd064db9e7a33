//! Per-frame metrics buffering and persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use relay_ipc::FrameMetric;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{MetricsError, MetricsResult};

/// Destination of flushed metric batches.
#[async_trait]
pub trait MetricsSink: Send {
    /// Persist `batch`, replacing whatever the previous flush wrote.
    async fn write_batch(&mut self, batch: &[FrameMetric]) -> MetricsResult<()>;
}

/// Writes each batch as a JSON array to a single file.
///
/// The file is written through a temporary sibling and renamed into place,
/// so readers see either the previous batch or the new one.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MetricsSink for JsonFileSink {
    async fn write_batch(&mut self, batch: &[FrameMetric]) -> MetricsResult<()> {
        let json = serde_json::to_vec_pretty(batch)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(MetricsError::Io(e));
        }

        debug!(path = %self.path.display(), records = batch.len(), "Metrics batch written");
        Ok(())
    }
}

/// Accumulates metrics for one stream and flushes them on an interval.
///
/// A flush hands the whole batch to the sink; only when the sink succeeds is
/// the batch cleared and the interval restarted. A failed flush keeps every
/// record for the next attempt.
pub struct MetricsRecorder<S> {
    sink: S,
    batch: Vec<FrameMetric>,
    batch_start: Instant,
    flush_interval: Duration,
    flushes: u64,
}

impl<S: MetricsSink> MetricsRecorder<S> {
    pub fn new(sink: S, flush_interval: Duration, now: Instant) -> Self {
        Self {
            sink,
            batch: Vec::new(),
            batch_start: now,
            flush_interval,
            flushes: 0,
        }
    }

    /// Append a record to the current batch.
    pub fn record(&mut self, metric: FrameMetric) {
        self.batch.push(metric);
    }

    /// Records waiting for the next flush, in recording order.
    pub fn batch(&self) -> &[FrameMetric] {
        &self.batch
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn batch_start(&self) -> Instant {
        self.batch_start
    }

    /// Successful flushes so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Flush if the interval has elapsed since the batch started.
    ///
    /// Returns whether the interval boundary was reached. An empty batch at
    /// the boundary restarts the interval without touching the sink.
    pub async fn maybe_flush(&mut self, now: Instant) -> MetricsResult<bool> {
        if now.saturating_duration_since(self.batch_start) < self.flush_interval {
            return Ok(false);
        }
        if self.batch.is_empty() {
            self.batch_start = now;
            return Ok(true);
        }
        self.flush(now).await?;
        Ok(true)
    }

    /// Flush any retained records regardless of the interval.
    pub async fn flush_remaining(&mut self, now: Instant) -> MetricsResult<bool> {
        if self.batch.is_empty() {
            return Ok(false);
        }
        self.flush(now).await?;
        Ok(true)
    }

    async fn flush(&mut self, now: Instant) -> MetricsResult<()> {
        self.sink.write_batch(&self.batch).await?;

        self.flushes += 1;
        info!(records = self.batch.len(), flush = self.flushes, "Metrics flushed");
        self.batch.clear();
        self.batch_start = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use relay_ipc::Detection;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<FrameMetric>>>>,
        fail: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        async fn write_batch(&mut self, batch: &[FrameMetric]) -> MetricsResult<()> {
            if *self.fail.lock() {
                return Err(MetricsError::Sink("disk full".into()));
            }
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    fn metric(frame_id: u64) -> FrameMetric {
        FrameMetric {
            frame_id,
            capture_ts: frame_id as i64 * 100,
            recv_ts: 1_700_000_000_000 + frame_id as i64,
            inference_ts: 1_700_000_000_005 + frame_id as i64,
            detections: vec![Detection::new("person", 0.9, 0.1, 0.1, 0.4, 0.8)],
        }
    }

    fn temp_metrics_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("relay-engine-{}-{}", name, std::process::id()))
            .join("metrics_cam.json")
    }

    #[tokio::test]
    async fn test_record_preserves_order() {
        let mut recorder =
            MetricsRecorder::new(RecordingSink::default(), Duration::from_secs(30), Instant::now());
        for id in 1..=5 {
            recorder.record(metric(id));
        }
        let ids: Vec<u64> = recorder.batch().iter().map(|m| m.frame_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_flush_only_at_boundary() {
        let sink = RecordingSink::default();
        let start = Instant::now();
        let mut recorder = MetricsRecorder::new(sink.clone(), Duration::from_secs(30), start);

        recorder.record(metric(1));
        assert!(!recorder.maybe_flush(start + Duration::from_secs(29)).await.unwrap());
        assert_eq!(recorder.len(), 1);

        let boundary = start + Duration::from_secs(30);
        assert!(recorder.maybe_flush(boundary).await.unwrap());
        assert!(recorder.is_empty());
        assert_eq!(recorder.batch_start(), boundary);
        assert_eq!(sink.batches.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_retains_batch() {
        let sink = RecordingSink::default();
        let start = Instant::now();
        let mut recorder = MetricsRecorder::new(sink.clone(), Duration::from_secs(1), start);
        recorder.record(metric(1));
        recorder.record(metric(2));

        *sink.fail.lock() = true;
        let err = recorder.maybe_flush(start + Duration::from_secs(1)).await;
        assert!(matches!(err, Err(MetricsError::Sink(_))));
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.batch_start(), start);

        *sink.fail.lock() = false;
        recorder.record(metric(3));
        assert!(recorder.maybe_flush(start + Duration::from_secs(2)).await.unwrap());
        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[tokio::test]
    async fn test_empty_boundary_restarts_interval() {
        let sink = RecordingSink::default();
        let start = Instant::now();
        let mut recorder = MetricsRecorder::new(sink.clone(), Duration::from_secs(1), start);

        let later = start + Duration::from_secs(5);
        assert!(recorder.maybe_flush(later).await.unwrap());
        assert_eq!(recorder.batch_start(), later);
        assert!(sink.batches.lock().is_empty());
        assert!(!recorder.flush_remaining(later).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_file_holds_only_latest_batch() {
        // 30 s interval, 65 s of frames at 10 fps.
        let path = temp_metrics_path("latest");
        let start = Instant::now();
        let mut recorder =
            MetricsRecorder::new(JsonFileSink::new(&path), Duration::from_secs(30), start);

        let mut flush_sizes = Vec::new();
        for k in 0..650u64 {
            let pending = recorder.len() + 1;
            recorder.record(metric(k + 1));
            let now = start + Duration::from_millis(k * 100);
            if recorder.maybe_flush(now).await.unwrap() {
                flush_sizes.push(pending);
            }
        }

        assert_eq!(recorder.flush_count(), 2);
        assert_eq!(flush_sizes, vec![301, 300]);

        let written: Vec<FrameMetric> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 300);
        assert_eq!(written.first().unwrap().frame_id, 302);
        assert_eq!(written.last().unwrap().frame_id, 601);
        assert_eq!(written[0], metric(302));
        assert_eq!(recorder.len(), 49);

        assert!(recorder.flush_remaining(start + Duration::from_secs(65)).await.unwrap());
        let written: Vec<FrameMetric> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 49);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_json_sink_reports_io_errors() {
        let blocker = temp_metrics_path("blocked");
        let dir = blocker.parent().unwrap().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        // A directory where the file should go makes the rename fail.
        std::fs::create_dir_all(&blocker).unwrap();

        let mut sink = JsonFileSink::new(&blocker);
        let err = sink.write_batch(&[metric(1)]).await.unwrap_err();
        assert!(matches!(err, MetricsError::Io(_)));
        assert!(!sink.temp_path().exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
