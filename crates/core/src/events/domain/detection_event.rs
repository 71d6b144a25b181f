use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};

use crate::detection::domain::detection::Detection;
use crate::shared::clock::format_timestamp;
use crate::shared::region::Region;

/// What to record for a face in which no eye was found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedFacePolicy {
    /// Only (face, eye) pairs are recorded.
    #[default]
    Skip,
    /// A face without eyes still produces one face-only record.
    FaceOnly,
}

/// One detected face, optionally paired with one of its eyes, at the
/// instant the frame was captured.
///
/// The eye is stored in full-frame coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub face: Region,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye: Option<Region>,
}

impl DetectionEvent {
    pub fn new(timestamp: NaiveDateTime, face: Region, eye: Option<Region>) -> Self {
        Self {
            timestamp,
            face,
            eye,
        }
    }

    /// Flattens one tick's detections into log records, all sharing
    /// `timestamp`.
    pub fn from_detections(
        detections: &[Detection],
        timestamp: NaiveDateTime,
        policy: UnmatchedFacePolicy,
    ) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        for detection in detections {
            if detection.eyes.is_empty() {
                if policy == UnmatchedFacePolicy::FaceOnly {
                    events.push(Self::new(timestamp, detection.face, None));
                }
                continue;
            }
            events.extend(
                detection
                    .eyes_in_frame()
                    .map(|eye| Self::new(timestamp, detection.face, Some(eye))),
            );
        }
        events
    }
}

/// Text log line: `YYYY-MM-DD HH:MM:SS, Face: (x, y, w, h), Eye: (x, y, w, h)`.
impl fmt::Display for DetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let face = &self.face;
        write!(
            f,
            "{}, Face: ({}, {}, {}, {})",
            format_timestamp(&self.timestamp),
            face.x,
            face.y,
            face.width,
            face.height
        )?;
        if let Some(eye) = &self.eye {
            write!(
                f,
                ", Eye: ({}, {}, {}, {})",
                eye.x, eye.y, eye.width, eye.height
            )?;
        }
        Ok(())
    }
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    fn two_eyed() -> Detection {
        Detection::new(
            Region::new(100, 50, 80, 80),
            vec![Region::new(10, 20, 15, 10), Region::new(50, 20, 15, 10)],
        )
    }

    #[test]
    fn test_one_event_per_face_eye_pair() {
        let events =
            DetectionEvent::from_detections(&[two_eyed()], ts(), UnmatchedFacePolicy::Skip);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.face == Region::new(100, 50, 80, 80)));
        assert_eq!(events[0].eye, Some(Region::new(110, 70, 15, 10)));
        assert_eq!(events[1].eye, Some(Region::new(150, 70, 15, 10)));
    }

    #[rstest]
    #[case(UnmatchedFacePolicy::Skip, 0)]
    #[case(UnmatchedFacePolicy::FaceOnly, 1)]
    fn test_face_without_eyes(#[case] policy: UnmatchedFacePolicy, #[case] expected: usize) {
        let lonely = Detection::new(Region::new(0, 0, 40, 40), vec![]);
        let events = DetectionEvent::from_detections(&[lonely], ts(), policy);
        assert_eq!(events.len(), expected);
        assert!(events.iter().all(|e| e.eye.is_none()));
    }

    #[test]
    fn test_face_only_policy_keeps_pairs_for_eyed_faces() {
        let events =
            DetectionEvent::from_detections(&[two_eyed()], ts(), UnmatchedFacePolicy::FaceOnly);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.eye.is_some()));
    }

    #[test]
    fn test_no_detections_no_events() {
        assert!(DetectionEvent::from_detections(&[], ts(), UnmatchedFacePolicy::FaceOnly).is_empty());
    }

    #[test]
    fn test_text_line_with_eye() {
        let event = DetectionEvent::new(
            ts(),
            Region::new(1, 2, 3, 4),
            Some(Region::new(5, 6, 7, 8)),
        );
        assert_eq!(
            event.to_string(),
            "2024-01-02 03:04:05, Face: (1, 2, 3, 4), Eye: (5, 6, 7, 8)"
        );
    }

    #[test]
    fn test_text_line_face_only() {
        let event = DetectionEvent::new(ts(), Region::new(1, 2, 3, 4), None);
        assert_eq!(event.to_string(), "2024-01-02 03:04:05, Face: (1, 2, 3, 4)");
    }

    #[test]
    fn test_json_uses_log_timestamp_format() {
        let event = DetectionEvent::new(ts(), Region::new(1, 2, 3, 4), None);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["timestamp"], "2024-01-02 03:04:05");
        assert_eq!(value["face"]["width"], 3);
        assert!(value.get("eye").is_none());
    }

    #[test]
    fn test_policy_parses_from_snake_case() {
        let policy: UnmatchedFacePolicy = serde_json::from_str("\"face_only\"").unwrap();
        assert_eq!(policy, UnmatchedFacePolicy::FaceOnly);
    }
}
