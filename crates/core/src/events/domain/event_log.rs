use std::path::Path;

use serde::{Deserialize, Serialize};

use super::detection_event::DetectionEvent;

/// Durable, append-only record of detection events.
pub trait EventLog: Send {
    /// Creates or truncates the log at `path`.
    fn open(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>>;

    fn append(&mut self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error>>;

    /// Pushes buffered records to the sink. Called once per tick.
    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

/// On-disk record layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One human-readable line per event.
    #[default]
    Text,
    /// One JSON object per line.
    JsonLines,
}
