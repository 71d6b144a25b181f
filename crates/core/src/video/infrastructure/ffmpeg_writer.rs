use std::path::{Path, PathBuf};

use crate::shared::frame::{Frame, GRAY_CHANNELS, RGB_CHANNELS};
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_sink::VideoSink;

/// Fallback when the requested rate rounds to zero.
const FALLBACK_FPS: i32 = 20;

/// Encodes frames to MPEG-4 Part 2 via ffmpeg-next.
///
/// The container follows the output extension (`.avi`, `.mp4`, ...). The
/// header is written at `open` and the trailer at `close`, so a run that
/// never writes a frame still leaves a playable, empty file.
pub struct FfmpegWriter {
    output_path: Option<PathBuf>,
    octx: Option<ffmpeg_next::format::context::Output>,
    encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    fps: i32,
    frame_count: usize,
}

// Safety: FfmpegWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self {
            output_path: None,
            octx: None,
            encoder: None,
            scaler: None,
            width: 0,
            height: 0,
            fps: FALLBACK_FPS,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn drain_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(encoder), Some(octx)) = (self.encoder.as_mut(), self.octx.as_mut()) else {
            return Err("FfmpegWriter: not opened".into());
        };
        let ost_time_base = octx.stream(0).ok_or("FfmpegWriter: missing stream")?.time_base();

        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, self.fps), ost_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink for FfmpegWriter {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        if metadata.width == 0 || metadata.height == 0 {
            return Err(format!(
                "FfmpegWriter: invalid resolution {}x{}",
                metadata.width, metadata.height
            )
            .into());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        self.width = metadata.width;
        self.height = metadata.height;
        self.fps = metadata.fps_or(FALLBACK_FPS);

        let mut octx = ffmpeg_next::format::output(path)?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;

        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        encoder_ctx.set_width(self.width);
        encoder_ctx.set_height(self.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, self.fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(self.fps, 1)));

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);

        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
            ffmpeg_next::format::Pixel::YUV420P,
            self.width,
            self.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        self.octx = Some(octx);
        self.encoder = Some(encoder);
        self.scaler = Some(scaler);
        self.output_path = Some(path.to_path_buf());
        self.frame_count = 0;

        log::debug!(
            "Video sink opened at {} ({}x{} @ {} fps)",
            path.display(),
            self.width,
            self.height,
            self.fps
        );
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if self.encoder.is_none() {
            return Err("FfmpegWriter: not opened".into());
        }
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(format!(
                "FfmpegWriter: frame {} is {}x{}, stream is {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )
            .into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );
        fill_rgb_plane(&mut rgb_frame, frame)?;

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .as_mut()
            .ok_or("FfmpegWriter: not opened")?
            .run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.frame_count as i64));

        self.encoder
            .as_mut()
            .ok_or("FfmpegWriter: not opened")?
            .send_frame(&yuv_frame)?;
        self.drain_packets()?;

        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.send_eof()?;
            self.drain_packets()?;
            if let Some(octx) = self.octx.as_mut() {
                octx.write_trailer()?;
            }
            if let Some(path) = self.output_path.take() {
                log::debug!(
                    "Video sink closed: {} frames in {}",
                    self.frame_count,
                    path.display()
                );
            }
        }

        self.octx = None;
        self.encoder = None;
        self.scaler = None;

        Ok(())
    }
}

/// Copies a tightly packed frame into an ffmpeg RGB24 plane, respecting the
/// plane's row stride. Grayscale frames are replicated into all channels.
fn fill_rgb_plane(
    dst: &mut ffmpeg_next::util::frame::video::Video,
    frame: &Frame,
) -> Result<(), Box<dyn std::error::Error>> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let stride = dst.stride(0);
    let plane = dst.data_mut(0);
    let src = frame.data();

    match frame.channels() {
        RGB_CHANNELS => {
            for row in 0..h {
                let s = row * w * 3;
                let d = row * stride;
                plane[d..d + w * 3].copy_from_slice(&src[s..s + w * 3]);
            }
        }
        GRAY_CHANNELS => {
            for row in 0..h {
                let d = row * stride;
                for (col, &v) in src[row * w..(row + 1) * w].iter().enumerate() {
                    plane[d + col * 3..d + col * 3 + 3].fill(v);
                }
            }
        }
        other => {
            return Err(format!("FfmpegWriter: unsupported channel count {other}").into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::domain::frame_source::FrameSource;
    use crate::video::infrastructure::ffmpeg_camera_source::{CameraSettings, FfmpegCameraSource};

    fn solid_frame(index: usize, w: u32, h: u32, value: u8) -> Frame {
        let data = vec![value; (w * h * 3) as usize];
        Frame::new(data, w, h, 3, index)
    }

    fn count_decoded_frames(path: &Path) -> usize {
        let mut source = FfmpegCameraSource::new(CameraSettings::file(path));
        source.open(&VideoMetadata::new(160, 120, 20.0)).unwrap();
        let mut count = 0;
        while let Some(_frame) = source.next_frame().unwrap() {
            count += 1;
        }
        source.close().unwrap();
        count
    }

    #[test]
    fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        for i in 0..3 {
            writer.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        writer.close().unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(writer.frame_count(), 3);
    }

    #[test]
    fn test_written_video_has_fixed_resolution_and_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        writer.write(&solid_frame(0, 160, 120, 128)).unwrap();
        writer.close().unwrap();

        ffmpeg_next::init().unwrap();
        let ictx = ffmpeg_next::format::input(&path).unwrap();
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .unwrap();
        let rate = stream.rate();
        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(stream.parameters()).unwrap();
        let decoder = codec_ctx.decoder().video().unwrap();
        assert_eq!(decoder.width(), 160);
        assert_eq!(decoder.height(), 120);
        assert_eq!(rate.numerator() / rate.denominator().max(1), 20);
    }

    #[test]
    fn test_zero_frame_run_is_valid_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        writer.close().unwrap();

        ffmpeg_next::init().unwrap();
        let ictx = ffmpeg_next::format::input(&path).unwrap();
        assert!(ictx.streams().best(ffmpeg_next::media::Type::Video).is_some());
    }

    #[test]
    fn test_wrong_size_frame_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        assert!(writer.write(&solid_frame(0, 80, 60, 0)).is_err());
        assert_eq!(writer.frame_count(), 0);
        writer.close().unwrap();
    }

    #[test]
    fn test_gray_frame_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        writer
            .write(&Frame::new(vec![90; 160 * 120], 160, 120, 1, 0))
            .unwrap();
        writer.close().unwrap();
        assert_eq!(writer.frame_count(), 1);
    }

    #[test]
    fn test_open_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos/nested/out.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        writer.close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_without_open_returns_error() {
        let mut writer = FfmpegWriter::new();
        assert!(writer.write(&solid_frame(0, 160, 120, 128)).is_err());
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        writer.write(&solid_frame(0, 160, 120, 128)).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_roundtrip_preserves_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.avi");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &VideoMetadata::new(160, 120, 20.0)).unwrap();
        for i in 0..10 {
            writer.write(&solid_frame(i, 160, 120, (i * 20) as u8)).unwrap();
        }
        writer.close().unwrap();

        assert_eq!(count_decoded_frames(&path), 10);
    }
}
