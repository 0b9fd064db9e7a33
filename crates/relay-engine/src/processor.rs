//! Per-track stream processing.

use std::time::{SystemTime, UNIX_EPOCH};

use relay_detector::{DetectorPool, InferenceOutput};
use relay_ipc::{Detection, Frame, FrameMetric, RelayConfig};
use relay_overlay::{to_rgb_image, OverlayRenderer};
use relay_transport::{LocalVideoTrack, RemoteVideoTrack};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::gate::{FrameGate, StreamState};
use crate::metrics::{MetricsRecorder, MetricsSink};
use crate::{ProcessError, FRAME_LOG_SAMPLE, STATS_LOG_INTERVAL};

/// Counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames pulled from the inbound track.
    pub received: u64,

    /// Frames admitted by the gate.
    pub admitted: u64,

    /// Frames rejected by the gate.
    pub dropped: u64,

    /// Admitted frames that failed conversion, detection or rendering.
    pub failed: u64,

    /// Output frames accepted by the outbound track.
    pub forwarded: u64,

    /// Output frames the outbound track had no room for.
    pub congested: u64,
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Turns one inbound video track into annotated output frames.
///
/// Each call to [`process_next`](Self::process_next) pulls frames until the
/// gate admits one, runs it through the detector pool and the overlay, and
/// records its metrics. Only one frame is in flight at a time.
pub struct StreamProcessor<S> {
    source: RemoteVideoTrack,
    gate: FrameGate,
    state: StreamState,
    pool: DetectorPool,
    renderer: OverlayRenderer,
    recorder: MetricsRecorder<S>,
    stats: StreamStats,
}

impl<S: MetricsSink> StreamProcessor<S> {
    pub fn new(source: RemoteVideoTrack, pool: DetectorPool, sink: S, config: &RelayConfig) -> Self {
        Self {
            source,
            gate: FrameGate::new(config.target_fps),
            state: StreamState::new(config.target_fps),
            pool,
            renderer: OverlayRenderer::new(),
            recorder: MetricsRecorder::new(sink, config.flush_interval(), Instant::now()),
            stats: StreamStats::default(),
        }
    }

    pub fn track_id(&self) -> &str {
        self.source.id()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn recorder(&self) -> &MetricsRecorder<S> {
        &self.recorder
    }

    /// Produce the next output frame.
    ///
    /// Returns `Ok(None)` when the inbound track has ended. An error means
    /// the admitted frame was lost; the processor stays usable.
    pub async fn process_next(&mut self) -> Result<Option<Frame>, ProcessError> {
        let frame = loop {
            let Some(frame) = self.source.recv().await else {
                return Ok(None);
            };
            self.stats.received += 1;

            if self.gate.admit(Instant::now(), &mut self.state) {
                self.stats.admitted += 1;
                break frame;
            }
            self.stats.dropped += 1;
            trace!(track = %self.source.id(), pts = frame.pts, "Frame dropped by gate");
        };

        let frame_id = self.state.frame_count();
        let recv_ts = unix_millis();
        if frame_id <= 5 || frame_id % FRAME_LOG_SAMPLE == 0 {
            debug!(
                track = %self.source.id(),
                frame_id,
                pts = frame.pts,
                size = %format!("{}x{}", frame.width, frame.height),
                format = frame.format.name(),
                "Frame admitted"
            );
        }

        match self.process_admitted(&frame, frame_id, recv_ts).await {
            Ok(output) => Ok(Some(output)),
            Err(e) => {
                self.stats.failed += 1;
                Err(e)
            }
        }
    }

    async fn process_admitted(
        &mut self,
        frame: &Frame,
        frame_id: u64,
        recv_ts: i64,
    ) -> Result<Frame, ProcessError> {
        let image = to_rgb_image(frame)?;
        let InferenceOutput { image, detections } = self.pool.detect(image).await?;
        let inference_ts = unix_millis();

        let detections: Vec<Detection> = detections
            .into_iter()
            .map(|d| {
                Detection::from_pixels(
                    d.label,
                    d.confidence,
                    d.x1,
                    d.y1,
                    d.x2,
                    d.y2,
                    frame.width,
                    frame.height,
                )
            })
            .collect();

        let output = self.renderer.render(frame, image, &detections)?;

        self.recorder.record(FrameMetric {
            frame_id,
            capture_ts: frame.capture_ts_ms(),
            recv_ts,
            inference_ts,
            detections,
        });
        if let Err(e) = self.recorder.maybe_flush(Instant::now()).await {
            warn!(
                track = %self.source.id(),
                retained = self.recorder.len(),
                "Metrics flush failed, retrying at next boundary: {}", e
            );
        }

        Ok(output)
    }

    /// Process the track until it ends, the outbound track goes away, or
    /// `shutdown` is signalled. Retained metrics are flushed before
    /// returning.
    pub async fn run(
        mut self,
        output: LocalVideoTrack,
        mut shutdown: watch::Receiver<bool>,
    ) -> StreamStats {
        let track = self.source.id().to_string();
        info!(
            %track,
            target_fps = self.state.target_fps(),
            detector = self.pool.detector_name(),
            "Stream processor started"
        );

        let start_time = Instant::now();
        let mut last_log_time = start_time;

        loop {
            if *shutdown.borrow_and_update() {
                debug!(%track, "Shutdown signalled");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(%track, "Shutdown signalled");
                    break;
                }
                next = self.process_next() => next,
            };

            match next {
                Ok(Some(frame)) => match output.write_frame(frame) {
                    Ok(true) => self.stats.forwarded += 1,
                    Ok(false) => self.stats.congested += 1,
                    Err(_) => {
                        info!(%track, "Outbound track closed, stopping");
                        break;
                    }
                },
                Ok(None) => {
                    info!(%track, "Inbound track ended");
                    break;
                }
                Err(e) => {
                    warn!(%track, frame_id = self.state.frame_count(), "Frame failed: {}", e);
                }
            }

            if last_log_time.elapsed() >= STATS_LOG_INTERVAL {
                let s = self.stats;
                info!(
                    "Stream stats [{}]: received={}, admitted={}, dropped={}, failed={}, forwarded={}, uptime={:.1}s",
                    track,
                    s.received,
                    s.admitted,
                    s.dropped,
                    s.failed,
                    s.forwarded,
                    start_time.elapsed().as_secs_f32()
                );
                last_log_time = Instant::now();
            }
        }

        if let Err(e) = self.recorder.flush_remaining(Instant::now()).await {
            warn!(%track, lost = self.recorder.len(), "Final metrics flush failed: {}", e);
        }

        let s = self.stats;
        info!(
            "Stream processor stopped [{}]: total received={}, admitted={}, dropped={}, failed={}, forwarded={}, congested={}",
            track, s.received, s.admitted, s.dropped, s.failed, s.forwarded, s.congested
        );
        s
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use image::RgbImage;
    use parking_lot::Mutex;
    use relay_detector::{Detector, DetectorError, DetectorResult, RawDetection};
    use relay_ipc::{PixelFormat, TimeBase};
    use tokio::sync::mpsc;

    use super::*;
    use crate::MetricsResult;

    /// Finds one box per frame and fails on the listed calls (1-based).
    struct ScriptedDetector {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    impl ScriptedDetector {
        fn failing_on(fail_on: Vec<usize>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_on,
            })
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&self, image: &RgbImage) -> DetectorResult<Vec<RawDetection>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(DetectorError::Inference(format!("call {call}")));
            }
            Ok(vec![RawDetection {
                x1: 0.0,
                y1: 0.0,
                x2: image.width() as f32 / 2.0,
                y2: image.height() as f32 * 2.0,
                confidence: 0.8,
                class_index: 2,
                label: "car".into(),
            }])
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<FrameMetric>>>>,
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        async fn write_batch(&mut self, batch: &[FrameMetric]) -> MetricsResult<()> {
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    fn frame(pts: i64) -> Frame {
        Frame::new(
            8,
            6,
            PixelFormat::Rgb24,
            Bytes::from(vec![10u8; 8 * 6 * 3]),
            pts,
            TimeBase::VIDEO_90KHZ,
        )
    }

    fn config(target_fps: u32, flush_interval_secs: u64) -> RelayConfig {
        RelayConfig {
            target_fps,
            flush_interval_secs,
            ..Default::default()
        }
    }

    fn processor(
        detector: Arc<ScriptedDetector>,
        config: &RelayConfig,
    ) -> (mpsc::Sender<Frame>, StreamProcessor<RecordingSink>, RecordingSink) {
        let (tx, track) = RemoteVideoTrack::channel("cam");
        let sink = RecordingSink::default();
        let pool = DetectorPool::new(detector, 1);
        (tx, StreamProcessor::new(track, pool, sink.clone(), config), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_keeps_timing_and_records_metric() {
        let (tx, mut proc, _sink) = processor(ScriptedDetector::failing_on(vec![]), &config(10, 30));

        tx.send(frame(180_000)).await.unwrap();
        let out = proc.process_next().await.unwrap().unwrap();

        assert_eq!(out.pts, 180_000);
        assert_eq!(out.time_base, TimeBase::VIDEO_90KHZ);
        assert_eq!(out.format, PixelFormat::Rgb24);
        assert_eq!((out.width, out.height), (8, 6));

        let metric = &proc.recorder().batch()[0];
        assert_eq!(metric.frame_id, 1);
        assert_eq!(metric.capture_ts, 2_000);
        assert!(metric.inference_ts >= metric.recv_ts);
        let det = &metric.detections[0];
        assert_eq!(det.label(), "car");
        assert_eq!((det.xmin(), det.xmax(), det.ymax()), (0.0, 0.5, 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_failure_skips_only_that_frame() {
        let (tx, mut proc, _sink) = processor(ScriptedDetector::failing_on(vec![5]), &config(10, 30));

        let mut outputs = 0;
        for i in 1..=10 {
            tx.send(frame(i * 9_000)).await.unwrap();
            tokio::time::advance(Duration::from_millis(100)).await;
            match proc.process_next().await {
                Ok(Some(_)) => outputs += 1,
                Ok(None) => panic!("track ended early"),
                Err(ProcessError::Detector(_)) => assert_eq!(i, 5),
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        assert_eq!(outputs, 9);
        assert_eq!(proc.state().frame_count(), 10);
        assert_eq!(proc.stats().failed, 1);
        let ids: Vec<u64> = proc.recorder().batch().iter().map(|m| m.frame_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_frames_are_dropped_entirely() {
        let (tx, mut proc, _sink) = processor(ScriptedDetector::failing_on(vec![]), &config(10, 30));

        tx.send(frame(1)).await.unwrap();
        assert!(proc.process_next().await.unwrap().is_some());

        // Both arrive within the same interval and the track then ends.
        tx.send(frame(2)).await.unwrap();
        tx.send(frame(3)).await.unwrap();
        drop(tx);
        assert!(proc.process_next().await.unwrap().is_none());

        let stats = proc.stats();
        assert_eq!((stats.received, stats.admitted, stats.dropped), (3, 1, 2));
        assert_eq!(proc.recorder().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_fails_before_detection() {
        let detector = ScriptedDetector::failing_on(vec![]);
        let (tx, mut proc, _sink) = processor(detector.clone(), &config(10, 30));

        let mut bad = frame(1);
        bad.data = Bytes::from_static(&[0, 1, 2]);
        tx.send(bad).await.unwrap();

        assert!(matches!(proc.process_next().await, Err(ProcessError::Overlay(_))));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert!(proc.recorder().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_flush_on_interval() {
        let (tx, mut proc, sink) = processor(ScriptedDetector::failing_on(vec![]), &config(10, 1));

        for i in 1..=15 {
            tx.send(frame(i)).await.unwrap();
            tokio::time::advance(Duration::from_millis(100)).await;
            proc.process_next().await.unwrap().unwrap();
        }

        let batches = sink.batches.lock().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(proc.recorder().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_forwards_and_flushes_on_end() {
        let (tx, proc, sink) = processor(ScriptedDetector::failing_on(vec![]), &config(10, 30));
        let (output, mut out_rx) = LocalVideoTrack::channel("cam");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(frame(42)).await.unwrap();
        drop(tx);
        let stats = proc.run(output, shutdown_rx).await;

        assert_eq!(stats.forwarded, 1);
        assert_eq!(out_rx.recv().await.unwrap().pts, 42);
        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].frame_id, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_tx, proc, sink) = processor(ScriptedDetector::failing_on(vec![]), &config(10, 30));
        let (output, _out_rx) = LocalVideoTrack::channel("cam");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(proc.run(output, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats, StreamStats::default());
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_outbound_closes() {
        let (tx, proc, _sink) = processor(ScriptedDetector::failing_on(vec![]), &config(10, 30));
        let (output, out_rx) = LocalVideoTrack::channel("cam");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(out_rx);

        tx.send(frame(1)).await.unwrap();
        let stats = proc.run(output, shutdown_rx).await;
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.forwarded, 0);
        assert!(tx.is_closed());
    }
}
