/// Stream format negotiated by a frame source or requested from a sink.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Human-readable origin of the stream (device path, file name).
    pub source: Option<String>,
}

impl VideoMetadata {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            codec: String::new(),
            source: None,
        }
    }

    /// Frame rate rounded to a whole number, falling back to `fallback`
    /// when the stream reports none.
    pub fn fps_or(&self, fallback: i32) -> i32 {
        let fps = self.fps.round() as i32;
        if fps <= 0 {
            fallback
        } else {
            fps
        }
    }
}
