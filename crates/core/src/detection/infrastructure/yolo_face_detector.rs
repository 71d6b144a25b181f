use std::path::Path;

use crate::detection::domain::detector::{Detector, DetectorTuning};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::yolo_model::{group_candidates, YoloModel};

/// Face detector backed by the YOLO face model.
pub struct YoloFaceDetector {
    model: YoloModel,
    tuning: DetectorTuning,
}

impl YoloFaceDetector {
    pub fn new(model_path: &Path, tuning: DetectorTuning) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            model: YoloModel::load(model_path)?,
            tuning,
        })
    }
}

impl Detector for YoloFaceDetector {
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

        let candidates = self.model.infer(input, self.tuning.confidence)?;
        Ok(group_candidates(candidates, &self.tuning)
            .into_iter()
            .filter_map(|c| Region::clamp_bounds(c.x1, c.y1, c.x2, c.y2, input.width(), input.height()))
            .collect())
    }
}
