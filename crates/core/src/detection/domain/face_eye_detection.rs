use crate::shared::frame::Frame;

use super::detection::Detection;
use super::detector::Detector;

/// Runs the fixed two-level search: faces across the whole frame, then eyes
/// inside each face.
///
/// Faces are clipped to the frame and eyes to their face, so every region
/// in the result satisfies the frame-bounds invariant regardless of what
/// the detectors returned. Eyes stay relative to their face.
pub fn detect_faces_and_eyes(
    faces: &mut dyn Detector,
    eyes: &mut dyn Detector,
    gray: &Frame,
) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
    let mut detections = Vec::new();
    for raw_face in faces.detect(gray, None)? {
        let Some(face) = raw_face.clamp_to(gray.width(), gray.height()) else {
            log::debug!("Discarding face outside frame: {raw_face:?}");
            continue;
        };
        let found = eyes
            .detect(gray, Some(&face))?
            .into_iter()
            .filter_map(|eye| eye.clamp_to(face.width, face.height))
            .collect();
        detections.push(Detection::new(face, found));
    }
    Ok(detections)
}
