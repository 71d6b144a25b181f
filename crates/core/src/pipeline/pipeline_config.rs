use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::domain::detector::DetectorTuning;
use crate::events::domain::detection_event::UnmatchedFacePolicy;
use crate::events::domain::event_log::LogFormat;
use crate::shared::constants::{
    DEFAULT_FPS, DEFAULT_FRAME_TIMEOUT_MS, DEFAULT_HEIGHT, DEFAULT_LOG_PATH, DEFAULT_VIDEO_PATH,
    DEFAULT_WIDTH,
};
use crate::shared::video_metadata::VideoMetadata;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a run needs to know up front. Fixed for the lifetime of a
/// pipeline.
///
/// Missing keys in a JSON config fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fps: u32,
    pub video_path: PathBuf,
    pub log_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub face_tuning: DetectorTuning,
    pub eye_tuning: DetectorTuning,
    pub unmatched_face_policy: UnmatchedFacePolicy,
    pub log_format: LogFormat,
    #[serde(rename = "frame_timeout_ms", with = "millis")]
    pub frame_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            video_path: PathBuf::from(DEFAULT_VIDEO_PATH),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            face_tuning: DetectorTuning::faces(),
            eye_tuning: DetectorTuning::eyes(),
            unmatched_face_policy: UnmatchedFacePolicy::default(),
            log_format: LogFormat::default(),
            frame_timeout: Duration::from_millis(DEFAULT_FRAME_TIMEOUT_MS),
        }
    }
}

impl PipelineConfig {
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(invalid("fps", "must be positive".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid(
                "resolution",
                format!("{}x{} has an empty side", self.width, self.height),
            ));
        }
        // YUV 4:2:0 encoding needs even dimensions.
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(invalid(
                "resolution",
                format!("{}x{} must have even sides", self.width, self.height),
            ));
        }
        if self.video_path.as_os_str().is_empty() {
            return Err(invalid("video_path", "must not be empty".into()));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(invalid("log_path", "must not be empty".into()));
        }
        if self.video_path == self.log_path {
            return Err(invalid(
                "log_path",
                "must differ from video_path".into(),
            ));
        }
        self.face_tuning
            .validate()
            .map_err(|reason| invalid("face_tuning", reason))?;
        self.eye_tuning
            .validate()
            .map_err(|reason| invalid("eye_tuning", reason))?;
        if self.frame_timeout.is_zero() {
            return Err(invalid("frame_timeout", "must be positive".into()));
        }
        Ok(())
    }

    /// Stream format requested from the source and enforced on the sink.
    pub fn stream_metadata(&self) -> VideoMetadata {
        VideoMetadata::new(self.width, self.height, self.fps as f64)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
