pub mod display;
pub mod frame_source;
pub mod video_sink;
