/// YOLO face/landmark model run through ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, output parsing and the
/// neighbor-grouping post-process shared by the face and eye detectors.
use std::path::Path;

use crate::detection::domain::detector::DetectorTuning;
use crate::shared::frame::Frame;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// IoU above which two candidates describe the same object.
const GROUP_IOU_THRESH: f64 = 0.45;

/// Candidates count as neighbors when their sizes differ by at most this
/// many pyramid steps of the tuning's scale factor.
const NEIGHBOR_SCALE_STEPS: i32 = 3;

/// Number of keypoint values per detection (5 landmarks × x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

pub const LEFT_EYE: usize = 0;
pub const RIGHT_EYE: usize = 1;

/// One box proposed by the model, in the coordinates of the frame that was
/// passed to [`YoloModel::infer`].
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
    /// Landmarks in model order: left eye, right eye, nose, mouth corners.
    pub keypoints: [Option<(f64, f64)>; 5],
}

impl Candidate {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    fn bbox(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

pub struct YoloModel {
    session: ort::session::Session,
    input_size: u32,
}

impl YoloModel {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn load(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            input_size,
        })
    }

    /// Runs the model and returns every candidate scoring at least `confidence`.
    pub fn infer(
        &mut self,
        frame: &Frame,
        confidence: f64,
    ) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();

        // [1, features, detections] (transposed) or [1, detections, features]
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let unletterbox = |v: f32, pad: u32| (v as f64 - pad as f64) / scale;

        let mut candidates = Vec::new();
        for i in 0..num_dets {
            let at = |f: usize| {
                if transposed {
                    data[f * num_dets + i]
                } else {
                    data[i * num_feats + f]
                }
            };

            // row format: [cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]
            if num_feats < 5 {
                break;
            }
            let conf = at(4) as f64;
            if conf < confidence {
                continue;
            }

            let (cx, cy, w, h) = (at(0), at(1), at(2), at(3));
            let mut keypoints = [None; 5];
            if num_feats >= 5 + NUM_KEYPOINT_VALUES {
                for (k, slot) in keypoints.iter_mut().enumerate() {
                    if at(5 + k * 3 + 2) as f64 >= KEYPOINT_CONF_THRESH {
                        *slot = Some((
                            unletterbox(at(5 + k * 3), pad_x),
                            unletterbox(at(5 + k * 3 + 1), pad_y),
                        ));
                    }
                }
            }

            candidates.push(Candidate {
                x1: unletterbox(cx - w / 2.0, pad_x),
                y1: unletterbox(cy - h / 2.0, pad_y),
                x2: unletterbox(cx + w / 2.0, pad_x),
                y2: unletterbox(cy + h / 2.0, pad_y),
                confidence: conf,
                keypoints,
            });
        }

        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Single-channel frames are replicated into all three input planes.
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

    // Padding is 114/255 gray, the YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let last_channel = frame.channels() as usize - 1;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c.min(last_channel)]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Greedy grouping: the highest-scoring candidate of each overlapping
/// cluster survives if the cluster is large enough and the box is not too
/// small.
///
/// A suppressed candidate counts toward its winner's neighbors only when
/// their sizes are within `scale_factor ^ NEIGHBOR_SCALE_STEPS` of each
/// other.
pub fn group_candidates(mut cands: Vec<Candidate>, tuning: &DetectorTuning) -> Vec<Candidate> {
    cands.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let max_ratio = tuning.scale_factor.powi(NEIGHBOR_SCALE_STEPS);
    let min_size = tuning.min_size as f64;
    let mut keep = Vec::new();
    let mut suppressed = vec![false; cands.len()];

    for i in 0..cands.len() {
        if suppressed[i] {
            continue;
        }
        let mut neighbors = 0u32;
        for j in (i + 1)..cands.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&cands[i].bbox(), &cands[j].bbox()) > GROUP_IOU_THRESH {
                suppressed[j] = true;
                if size_ratio(&cands[i], &cands[j]) <= max_ratio {
                    neighbors += 1;
                }
            }
        }
        let big_enough = cands[i].width() >= min_size && cands[i].height() >= min_size;
        if neighbors >= tuning.min_neighbors && big_enough {
            keep.push(cands[i].clone());
        }
    }
    keep
}

fn size_ratio(a: &Candidate, b: &Candidate) -> f64 {
    let side_a = a.width().max(a.height());
    let side_b = b.width().max(b.height());
    if side_a <= 0.0 || side_b <= 0.0 {
        return f64::INFINITY;
    }
    side_a.max(side_b) / side_a.min(side_b)
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
pub(crate) fn candidate(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Candidate {
    Candidate {
        x1,
        y1,
        x2,
        y2,
        confidence,
        keypoints: [None; 5],
    }
}
