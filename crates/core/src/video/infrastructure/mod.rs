pub mod ffmpeg_camera_source;
pub mod ffmpeg_writer;
pub mod snapshot_display;
