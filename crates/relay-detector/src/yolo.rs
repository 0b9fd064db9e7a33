//! YOLO detector running an ONNX model through ONNX Runtime.

use image::{imageops::FilterType, RgbImage};
use ndarray::{s, ArrayViewD, Axis, IxDyn};
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    label_for, non_max_suppression, Detector, DetectorConfig, DetectorError, DetectorResult,
    RawDetection,
};

/// YOLOv8-style detector.
///
/// Expects a single `[1, 3, S, S]` float input in RGB order scaled to
/// `[0, 1]` and a `[1, 4 + classes, candidates]` output where the first four
/// rows are box centre/size in input pixels.
pub struct YoloOnnxDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
}

impl YoloOnnxDetector {
    /// Load the model at `config.model_path`.
    pub fn load(config: DetectorConfig) -> DetectorResult<Self> {
        let path = config
            .model_path
            .clone()
            .ok_or_else(|| DetectorError::ModelNotFound("no model path configured".into()))?;
        if !path.exists() {
            return Err(DetectorError::ModelNotFound(path.display().to_string()));
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(config.intra_threads))
            .and_then(|b| b.commit_from_file(&path))
            .map_err(|e| DetectorError::Initialization(e.to_string()))?;

        info!(
            model = %path.display(),
            input_size = config.input_size,
            "YOLO model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    fn input_tensor(&self, image: &RgbImage) -> DetectorResult<Tensor<f32>> {
        let size = self.config.input_size;
        let n = size as usize;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let plane = n * n;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let idx = y as usize * n + x as usize;
            data[idx] = pixel[0] as f32 / 255.0;
            data[plane + idx] = pixel[1] as f32 / 255.0;
            data[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }

        let shape = vec![1i64, 3, n as i64, n as i64];
        Tensor::from_array((shape, data)).map_err(|e| DetectorError::InvalidInput(e.to_string()))
    }
}

impl Detector for YoloOnnxDetector {
    fn detect(&self, image: &RgbImage) -> DetectorResult<Vec<RawDetection>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::InvalidInput("empty image".into()));
        }

        let input = self.input_tensor(image)?;
        let size = self.config.input_size as f32;
        let sx = image.width() as f32 / size;
        let sy = image.height() as f32 / size;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::MalformedOutput(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 3 || dims[1] < 5 {
            return Err(DetectorError::MalformedOutput(format!(
                "unexpected output shape {dims:?}"
            )));
        }
        let array = ArrayViewD::from_shape(IxDyn(&dims), data)
            .map_err(|e| DetectorError::MalformedOutput(e.to_string()))?;
        let view = array.index_axis(Axis(0), 0);

        let mut candidates = Vec::new();
        for i in 0..dims[2] {
            let scores = view.slice(s![4.., i]);
            let Some((class_index, &score)) = scores
                .indexed_iter()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
            else {
                continue;
            };
            if score <= self.config.conf_threshold {
                continue;
            }

            let cx = view[[0, i]];
            let cy = view[[1, i]];
            let w = view[[2, i]];
            let h = view[[3, i]];
            candidates.push(RawDetection {
                x1: (cx - w / 2.0) * sx,
                y1: (cy - h / 2.0) * sy,
                x2: (cx + w / 2.0) * sx,
                y2: (cy + h / 2.0) * sy,
                confidence: score,
                class_index,
                label: label_for(class_index).to_string(),
            });
        }

        let kept = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.max_detections,
        );
        debug!(count = kept.len(), "YOLO detections");
        Ok(kept)
    }

    fn name(&self) -> &'static str {
        "yolo-onnx"
    }
}
