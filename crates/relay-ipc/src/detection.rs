//! Detections and per-frame metric records.

use serde::{Deserialize, Serialize};

/// One detected object with a box normalized to the frame size.
///
/// Coordinates are always within `[0, 1]` with `xmin <= xmax` and
/// `ymin <= ymax`, and the score is within `[0, 1]`. The constructors enforce
/// this; deserialized values go through the same normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectionRecord")]
pub struct Detection {
    label: String,
    score: f32,
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
}

/// Wire shape of a detection, normalized on the way in.
#[derive(Deserialize)]
struct DetectionRecord {
    label: String,
    score: f32,
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
}

impl From<DetectionRecord> for Detection {
    fn from(r: DetectionRecord) -> Self {
        Detection::new(r.label, r.score, r.xmin, r.ymin, r.xmax, r.ymax)
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

impl Detection {
    /// Create a detection from normalized coordinates.
    ///
    /// Out-of-range values are clamped and swapped corners are reordered.
    pub fn new(
        label: impl Into<String>,
        score: f32,
        xmin: f32,
        ymin: f32,
        xmax: f32,
        ymax: f32,
    ) -> Self {
        let (x0, x1) = (unit(xmin), unit(xmax));
        let (y0, y1) = (unit(ymin), unit(ymax));
        Self {
            label: label.into(),
            score: unit(score),
            xmin: x0.min(x1),
            ymin: y0.min(y1),
            xmax: x0.max(x1),
            ymax: y0.max(y1),
        }
    }

    /// Create a detection from a box in pixel coordinates of a
    /// `width` x `height` frame.
    #[allow(clippy::too_many_arguments)]
    pub fn from_pixels(
        label: impl Into<String>,
        score: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self::new(label, score, x1 / w, y1 / h, x2 / w, y2 / h)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmax
    }

    pub fn ymax(&self) -> f32 {
        self.ymax
    }

    /// Box corners scaled to a `width` x `height` frame, as
    /// `(x1, y1, x2, y2)` pixel coordinates.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let w = width as f32;
        let h = height as f32;
        (self.xmin * w, self.ymin * h, self.xmax * w, self.ymax * h)
    }
}

/// Timing and detection record for one accepted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetric {
    /// Sequence number within the stream, starting at 1.
    pub frame_id: u64,

    /// Media-clock capture time in milliseconds (`pts * time_base`).
    pub capture_ts: i64,

    /// Wall-clock time the frame was accepted, Unix milliseconds.
    pub recv_ts: i64,

    /// Wall-clock time detection completed, Unix milliseconds.
    pub inference_ts: i64,

    /// Detections in detector order.
    pub detections: Vec<Detection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_normalized(d: &Detection) {
        assert!(0.0 <= d.xmin() && d.xmin() <= d.xmax() && d.xmax() <= 1.0);
        assert!(0.0 <= d.ymin() && d.ymin() <= d.ymax() && d.ymax() <= 1.0);
        assert!(0.0 <= d.score() && d.score() <= 1.0);
    }

    #[test]
    fn test_new_clamps_and_orders() {
        let d = Detection::new("person", 1.7, 0.9, -0.2, 0.1, 1.4);
        assert_normalized(&d);
        assert_eq!(d.xmin(), 0.1);
        assert_eq!(d.xmax(), 0.9);
        assert_eq!(d.ymin(), 0.0);
        assert_eq!(d.ymax(), 1.0);
        assert_eq!(d.score(), 1.0);
    }

    #[test]
    fn test_nan_is_treated_as_zero() {
        let d = Detection::new("cat", f32::NAN, f32::NAN, 0.5, 0.4, f32::NAN);
        assert_normalized(&d);
        assert_eq!(d.score(), 0.0);
    }

    #[test]
    fn test_from_pixels() {
        let d = Detection::from_pixels("dog", 0.8, 160.0, 120.0, 480.0, 600.0, 640, 480);
        assert_normalized(&d);
        assert_eq!(d.xmin(), 0.25);
        assert_eq!(d.ymin(), 0.25);
        assert_eq!(d.xmax(), 0.75);
        assert_eq!(d.ymax(), 1.0);

        let (x1, y1, x2, y2) = d.to_pixels(640, 480);
        assert_eq!((x1, y1, x2, y2), (160.0, 120.0, 480.0, 480.0));
    }

    #[test]
    fn test_metric_json_field_names() {
        let metric = FrameMetric {
            frame_id: 1,
            capture_ts: 33,
            recv_ts: 1_700_000_000_000,
            inference_ts: 1_700_000_000_020,
            detections: vec![Detection::new("person", 0.9, 0.1, 0.2, 0.3, 0.4)],
        };
        let value = serde_json::to_value(&metric).unwrap();
        assert_eq!(value["frame_id"], 1);
        assert_eq!(value["capture_ts"], 33);
        assert_eq!(value["detections"][0]["label"], "person");
        assert!(value["detections"][0]["score"].is_number());
        assert!(value["detections"][0]["xmax"].is_number());
    }

    #[test]
    fn test_deserialize_normalizes_out_of_range_boxes() {
        let json = r#"{"label":"car","score":2.0,"xmin":0.8,"ymin":0.1,"xmax":0.2,"ymax":3.0}"#;
        let d: Detection = serde_json::from_str(json).unwrap();
        assert_normalized(&d);
        assert_eq!(d.xmin(), 0.2);
        assert_eq!(d.xmax(), 0.8);
    }

    #[test]
    fn test_batch_roundtrip_preserves_order() {
        let batch: Vec<FrameMetric> = (1..=3)
            .map(|i| FrameMetric {
                frame_id: i,
                capture_ts: i as i64 * 66,
                recv_ts: 1_000 + i as i64,
                inference_ts: 1_010 + i as i64,
                detections: vec![Detection::new("cup", 0.55, 0.125, 0.25, 0.5, 0.75)],
            })
            .collect();
        let json = serde_json::to_string(&batch).unwrap();
        let parsed: Vec<FrameMetric> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, batch);
    }
}
