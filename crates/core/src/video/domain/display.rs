use crate::shared::frame::Frame;

/// Answer of a preview after showing a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewControl {
    Continue,
    /// The viewer asked to end the run.
    Stop,
}

/// Live preview of annotated frames.
pub trait Display: Send {
    fn show(&mut self, frame: &Frame) -> Result<PreviewControl, Box<dyn std::error::Error>>;
}

/// Headless preview that shows nothing.
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _frame: &Frame) -> Result<PreviewControl, Box<dyn std::error::Error>> {
        Ok(PreviewControl::Continue)
    }
}
