use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Encodes annotated frames to a video file at a fixed rate and resolution,
/// so the pipeline does not depend on a specific codec library.
pub trait VideoSink: Send {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Frames whose size differs from the opened resolution are rejected.
    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Finalizes the container. Frames written before a failed close may
    /// still be unreadable.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
