use serde::{Deserialize, Serialize};

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for region detection on a normalized frame.
///
/// With `scope` set, detection is restricted to that sub-frame and the
/// returned regions are relative to the scope's origin; the caller
/// translates them. An empty result means nothing was found. Result order
/// is unspecified.
///
/// Implementations may cache buffers between calls, hence `&mut self`.
pub trait Detector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        scope: Option<&Region>,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}

/// Construction-time tuning shared by every detector kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorTuning {
    /// Pyramid step between neighboring detection scales (> 1.0).
    pub scale_factor: f64,
    /// Overlapping candidates required to confirm a detection.
    pub min_neighbors: u32,
    /// Smallest accepted side length, in pixels.
    pub min_size: u32,
    /// Candidate score threshold (0.0-1.0).
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl DetectorTuning {
    pub const fn new(scale_factor: f64, min_neighbors: u32, min_size: u32) -> Self {
        Self {
            scale_factor,
            min_neighbors,
            min_size,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn faces() -> Self {
        Self::new(1.1, 5, 30)
    }

    pub fn eyes() -> Self {
        Self::new(1.1, 10, 15)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.scale_factor > 1.0) {
            return Err(format!(
                "scale factor must be greater than 1.0, got {}",
                self.scale_factor
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            ));
        }
        Ok(())
    }
}

pub const DEFAULT_CONFIDENCE: f64 = 0.25;

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_role_defaults() {
        let faces = DetectorTuning::faces();
        assert_eq!(faces.min_neighbors, 5);
        assert_eq!(faces.min_size, 30);
        let eyes = DetectorTuning::eyes();
        assert_eq!(eyes.min_neighbors, 10);
        assert_eq!(eyes.min_size, 15);
    }

    #[rstest]
    #[case::unit_scale(DetectorTuning::new(1.0, 5, 30))]
    #[case::nan_scale(DetectorTuning::new(f64::NAN, 5, 30))]
    #[case::confidence(DetectorTuning { confidence: 1.5, ..DetectorTuning::faces() })]
    fn test_validate_rejects(#[case] tuning: DetectorTuning) {
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(DetectorTuning::faces().validate().is_ok());
        assert!(DetectorTuning::eyes().validate().is_ok());
    }
}
