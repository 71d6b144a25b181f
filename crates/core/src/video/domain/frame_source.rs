use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// A live stream of frames, typically a camera device.
pub trait FrameSource: Send {
    /// Acquires the device, asking for the format in `requested`. Returns
    /// the format frames will actually arrive in.
    fn open(&mut self, requested: &VideoMetadata)
        -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Blocks until the next frame arrives. `Ok(None)` marks the end of the
    /// stream; a device that stops delivering is an error, not an end.
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

/// Returned by [`FrameSource::next_frame`] when no frame arrived in time.
#[derive(Debug, thiserror::Error)]
#[error("no frame received within {waited:?}")]
pub struct FrameTimeout {
    pub waited: Duration,
}
