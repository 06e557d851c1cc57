/// YOLO face locator using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, NMS post-processing and
/// landmark-based alignment through the domain's `FaceAligner`.
use std::path::Path;

use crate::detection::domain::face_aligner::FaceAligner;
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::face_locator::{Detection, FaceLocator};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{self, ModelLoadError};

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Number of keypoints per detection (5 landmarks × 3 values each: x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

pub struct OnnxYoloLocator {
    session: ort::session::Session,
    aligner: FaceAligner,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloLocator {
    /// Load a YOLO-face ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        aligner: FaceAligner,
        confidence: f64,
    ) -> Result<Self, ModelLoadError> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let (session, mode) = onnx_session::load_session(model_path, threads)?;
        log::info!(
            "Loaded face model {} ({mode:?} mode)",
            model_path.display()
        );
        let input_size = onnx_session::static_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            aligner,
            confidence,
            input_size,
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }

        // [1, features, detections] (transposed) or [1, detections, features]
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw = Vec::new();
        for i in 0..num_dets {
            let row: Vec<f32> = if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            };
            if let Some(det) = parse_row(&row, self.confidence, scale, pad_x, pad_y) {
                raw.push(det);
            }
        }
        Ok(raw)
    }
}

impl FaceLocator for OnnxYoloLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let mut raw = self.infer(frame)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .filter_map(|d| {
                let bbox = BoundingBox::from_xyxy(d.x1, d.y1, d.x2, d.y2)
                    .clamp_to(frame.width(), frame.height());
                if bbox.is_empty() {
                    return None;
                }
                let landmarks = d.keypoints.map(FaceLandmarks::new);
                let crop = self.aligner.align(frame, &bbox, landmarks.as_ref());
                Some(Detection { bbox, crop })
            })
            .collect())
    }
}

/// Decodes one output row `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`
/// back into original frame coordinates.
fn parse_row(row: &[f32], confidence: f64, scale: f64, pad_x: u32, pad_y: u32) -> Option<RawDetection> {
    if row.len() < 5 {
        return None;
    }
    let conf = row[4] as f64;
    if conf < confidence {
        return None;
    }

    let unpad = |v: f32, pad: u32| (v as f64 - pad as f64) / scale;
    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);

    let keypoints = (row.len() >= 5 + NUM_KEYPOINT_VALUES).then(|| {
        let mut pts = [(0.0f64, 0.0f64); 5];
        for (k, pt) in pts.iter_mut().enumerate() {
            let base = 5 + k * 3;
            // Hidden keypoints stay at (0, 0), which FaceLandmarks treats as invisible.
            if row[base + 2] as f64 >= KEYPOINT_CONF_THRESH {
                *pt = (unpad(row[base], pad_x), unpad(row[base + 1], pad_y));
            }
        }
        pts
    });

    Some(RawDetection {
        x1: unpad(cx - w / 2.0, pad_x),
        y1: unpad(cy - h / 2.0, pad_y),
        x2: unpad(cx + w / 2.0, pad_x),
        y2: unpad(cy + h / 2.0, pad_y),
        confidence: conf,
        keypoints,
    })
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded with 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    keypoints: Option<[(f64, f64); 5]>,
}

impl RawDetection {
    fn iou(&self, other: &RawDetection) -> f64 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (self.x2 - self.x1) * (self.y2 - self.y1);
        let area_b = (other.x2 - other.x1) * (other.y2 - other.y1);
        inter / (area_a + area_b - inter)
    }
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
///
/// The surviving order is the detection order handed to the slot table.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| k.iou(det) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}
