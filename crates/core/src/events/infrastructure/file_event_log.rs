use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::events::domain::detection_event::DetectionEvent;
use crate::events::domain::event_log::{EventLog, LogFormat};

/// Writes detection events to a newline-delimited file.
pub struct FileEventLog {
    format: LogFormat,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl FileEventLog {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            path: None,
            writer: None,
            written: 0,
        }
    }

    /// Events appended since the last `open`.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Default for FileEventLog {
    fn default() -> Self {
        Self::new(LogFormat::Text)
    }
}

impl EventLog for FileEventLog {
    fn open(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        self.writer = Some(BufWriter::new(file));
        self.path = Some(path.to_path_buf());
        self.written = 0;
        log::debug!("Event log opened at {}", path.display());
        Ok(())
    }

    fn append(&mut self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error>> {
        let writer = self.writer.as_mut().ok_or("FileEventLog: not opened")?;
        match self.format {
            LogFormat::Text => writeln!(writer, "{event}")?,
            LogFormat::JsonLines => {
                serde_json::to_writer(&mut *writer, event)?;
                writer.write_all(b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            if let Some(path) = self.path.take() {
                log::debug!("Event log closed: {} events in {}", self.written, path.display());
            }
        }
        Ok(())
    }
}
