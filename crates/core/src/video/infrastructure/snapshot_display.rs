use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::video::domain::display::{Display, PreviewControl};

/// Headless live preview: keeps the latest annotated frame on disk as an
/// image any viewer can watch.
///
/// The image is rewritten every `every` ticks through a temporary file, so
/// a viewer never reads a half-written picture. When `stop_file` is set and
/// that file appears, the preview asks the pipeline to stop.
pub struct SnapshotDisplay {
    path: PathBuf,
    every: usize,
    stop_file: Option<PathBuf>,
    shown: usize,
}

impl SnapshotDisplay {
    pub fn new(path: &Path, every: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            every: every.max(1),
            stop_file: None,
            shown: 0,
        }
    }

    pub fn with_stop_file(mut self, stop_file: &Path) -> Self {
        self.stop_file = Some(stop_file.to_path_buf());
        self
    }

    fn save(&self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let format = image::ImageFormat::from_path(&self.path)?;
        let staging = self.path.with_extension("part");

        if frame.is_gray() {
            let img = frame
                .to_gray_image()
                .ok_or("Failed to create image from frame data")?;
            img.save_with_format(&staging, format)?;
        } else {
            let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or("Failed to create image from frame data")?;
            img.save_with_format(&staging, format)?;
        }
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl Display for SnapshotDisplay {
    fn show(&mut self, frame: &Frame) -> Result<PreviewControl, Box<dyn std::error::Error>> {
        if self.shown % self.every == 0 {
            self.save(frame)?;
        }
        self.shown += 1;

        match &self.stop_file {
            Some(stop) if stop.exists() => {
                log::info!("Stop requested through {}", stop.display());
                Ok(PreviewControl::Stop)
            }
            _ => Ok(PreviewControl::Continue),
        }
    }
}
