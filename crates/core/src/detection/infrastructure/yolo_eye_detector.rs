use std::path::Path;

use crate::detection::domain::detector::{Detector, DetectorTuning};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::yolo_model::{group_candidates, Candidate, YoloModel, LEFT_EYE, RIGHT_EYE};

/// Eye box side as a fraction of the face box width.
const EYE_BOX_RATIO: f64 = 0.3;

/// Eye detector that locates eyes through the face model's landmarks.
///
/// Meant to be scoped to a face: the model runs on the face crop, the
/// strongest face it finds there donates its two eye landmarks, and each
/// landmark becomes a square box proportional to that face.
pub struct YoloEyeDetector {
    model: YoloModel,
    tuning: DetectorTuning,
}

impl YoloEyeDetector {
    pub fn new(model_path: &Path, tuning: DetectorTuning) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            model: YoloModel::load(model_path)?,
            tuning,
        })
    }
}

impl Detector for YoloEyeDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        scope: Option<&Region>,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let cropped;
        let input = match scope {
            Some(region) => {
                cropped = frame.crop(region);
                &cropped
            }
            None => frame,
        };

        // Eye-level size limits apply to the eye boxes, not to the face
        // that carries the landmarks.
        let face_tuning = DetectorTuning {
            min_size: 0,
            ..self.tuning.clone()
        };
        let candidates = self.model.infer(input, self.tuning.confidence)?;
        let best = group_candidates(candidates, &face_tuning).into_iter().next();

        Ok(best
            .map(|face| eye_regions(&face, input.width(), input.height(), self.tuning.min_size))
            .unwrap_or_default())
    }
}

/// Builds eye boxes around the visible eye landmarks of `face`.
fn eye_regions(face: &Candidate, width: u32, height: u32, min_size: u32) -> Vec<Region> {
    let half = face.width() * EYE_BOX_RATIO / 2.0;
    if half * 2.0 < min_size as f64 {
        return Vec::new();
    }
    [LEFT_EYE, RIGHT_EYE]
        .iter()
        .filter_map(|&k| face.keypoints[k])
        .filter_map(|(cx, cy)| Region::clamp_bounds(cx - half, cy - half, cx + half, cy + half, width, height))
        .collect()
}
