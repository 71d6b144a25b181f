use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::shared::constants::{
    DEFAULT_CAMERA_DEVICE, DEFAULT_CAMERA_FORMAT, DEFAULT_FPS, DEFAULT_FRAME_TIMEOUT_MS,
};
use crate::shared::frame::{Frame, RGB_CHANNELS};
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, FrameTimeout};

/// Frames buffered between the capture thread and the pipeline.
const CAPTURE_QUEUE: usize = 2;

/// Where and how to capture.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    /// libavdevice input format (`v4l2`, `avfoundation`, `dshow`). `None`
    /// opens `device` as a regular media file or URL.
    pub input_format: Option<String>,
    pub device: String,
    /// Longest wait for the device to open or for a single frame.
    pub timeout: Duration,
}

impl CameraSettings {
    pub fn camera(input_format: &str, device: &str) -> Self {
        Self {
            input_format: Some(input_format.to_string()),
            device: device.to_string(),
            timeout: Duration::from_millis(DEFAULT_FRAME_TIMEOUT_MS),
        }
    }

    /// Replays a recorded file as if it were a camera.
    pub fn file(path: &Path) -> Self {
        Self {
            input_format: None,
            device: path.to_string_lossy().into_owned(),
            timeout: Duration::from_millis(DEFAULT_FRAME_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Live devices drop frames the pipeline is too slow to take; files
    /// deliver every frame.
    fn is_live(&self) -> bool {
        self.input_format.is_some()
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self::camera(DEFAULT_CAMERA_FORMAT, DEFAULT_CAMERA_DEVICE)
    }
}

enum Captured {
    Frame(Frame),
    End,
    Failed(String),
}

/// Captures frames via ffmpeg-next (libavdevice) on a dedicated thread.
///
/// Decoded frames are scaled to the requested resolution in RGB24 and handed
/// over a bounded channel, so [`FrameSource::next_frame`] can give up after
/// the configured timeout instead of blocking on a stalled device.
pub struct FfmpegCameraSource {
    settings: CameraSettings,
    frames: Option<Receiver<Captured>>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    /// Disconnects when the capture thread returns.
    finished: Option<Receiver<()>>,
    /// Set once a frame wait timed out; the thread is then likely blocked
    /// inside the driver.
    stalled: bool,
    ended: bool,
}

impl FfmpegCameraSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            frames: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            handle: None,
            finished: None,
            stalled: false,
            ended: false,
        }
    }

    /// Stops the capture thread. Joins it if it exits within the frame
    /// timeout, otherwise detaches it; a thread blocked in a device read
    /// exits on its own once the read returns and it sees `cancelled`.
    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        // Dropping the receiver unblocks a capture thread stuck in `send`.
        self.frames = None;
        let finished = self.finished.take();
        let Some(handle) = self.handle.take() else {
            return;
        };

        let exited = !self.stalled
            && finished.is_some_and(|done| {
                matches!(
                    done.recv_timeout(self.settings.timeout),
                    Err(RecvTimeoutError::Disconnected)
                )
            });
        if !exited {
            log::warn!(
                "Capture thread for {} is not responding; detaching it",
                self.settings.device
            );
            return;
        }
        if handle.join().is_err() {
            log::warn!("Capture thread for {} panicked", self.settings.device);
        }
    }
}

impl FrameSource for FfmpegCameraSource {
    fn open(
        &mut self,
        requested: &VideoMetadata,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        self.shutdown();
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.stalled = false;
        self.ended = false;

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(CAPTURE_QUEUE);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let settings = self.settings.clone();
        let requested = requested.clone();
        let cancelled = Arc::clone(&self.cancelled);

        let handle = std::thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || {
                let _done = done_tx;
                capture(settings, requested, ready_tx, frame_tx, cancelled)
            })?;
        self.handle = Some(handle);
        self.finished = Some(done_rx);

        let metadata = match ready_rx.recv_timeout(self.settings.timeout) {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(message)) => {
                self.shutdown();
                return Err(message.into());
            }
            Err(_) => {
                self.stalled = true;
                self.shutdown();
                return Err(format!(
                    "camera {} did not open within {:?}",
                    self.settings.device, self.settings.timeout
                )
                .into());
            }
        };

        self.frames = Some(frame_rx);
        log::info!(
            "Capturing from {} at {}x{} @ {:.1} fps",
            self.settings.device,
            metadata.width,
            metadata.height,
            metadata.fps
        );
        Ok(metadata)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.ended {
            return Ok(None);
        }
        let frames = self.frames.as_ref().ok_or("FfmpegCameraSource: not opened")?;
        match frames.recv_timeout(self.settings.timeout) {
            Ok(Captured::Frame(frame)) => Ok(Some(frame)),
            Ok(Captured::End) => {
                self.ended = true;
                Ok(None)
            }
            Ok(Captured::Failed(message)) => Err(message.into()),
            Err(RecvTimeoutError::Timeout) => {
                self.stalled = true;
                Err(Box::new(FrameTimeout {
                    waited: self.settings.timeout,
                }))
            }
            Err(RecvTimeoutError::Disconnected) => Err("capture thread stopped".into()),
        }
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Capture thread body. All ffmpeg state lives on this thread.
fn capture(
    settings: CameraSettings,
    requested: VideoMetadata,
    ready_tx: Sender<Result<VideoMetadata, String>>,
    frame_tx: Sender<Captured>,
    cancelled: Arc<AtomicBool>,
) {
    let (mut ictx, mut decoder, stream_index, metadata) = match open_input(&settings, &requested)
    {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("cannot open {}: {e}", settings.device)));
            return;
        }
    };
    if ready_tx.send(Ok(metadata.clone())).is_err() {
        return;
    }

    let mut converter = RgbConverter::new(metadata.width, metadata.height);
    let live = settings.is_live();
    let hand_over = |captured: Captured| deliver(&frame_tx, captured, live);

    loop {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut ictx) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => break,
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            Err(e) => {
                let _ = frame_tx.send(Captured::Failed(format!("read failed: {e}")));
                return;
            }
        }
        if packet.stream() != stream_index {
            continue;
        }
        if let Err(e) = decoder.send_packet(&packet) {
            log::debug!("Dropping undecodable packet: {e}");
            continue;
        }
        if !drain_decoder(&mut decoder, &mut converter, &hand_over) {
            return;
        }
    }

    let _ = decoder.send_eof();
    if drain_decoder(&mut decoder, &mut converter, &hand_over) {
        let _ = frame_tx.send(Captured::End);
    }
}

/// Hands one message to the pipeline. Returns `false` once the pipeline
/// side has gone away.
///
/// Live frames are dropped while the queue is full; failures and the end
/// marker always wait for room.
fn deliver(tx: &Sender<Captured>, captured: Captured, live: bool) -> bool {
    match captured {
        Captured::Frame(_) if live => match tx.try_send(captured) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        },
        other => tx.send(other).is_ok(),
    }
}

type OpenedInput = (
    ffmpeg_next::format::context::Input,
    ffmpeg_next::decoder::Video,
    usize,
    VideoMetadata,
);

fn open_input(
    settings: &CameraSettings,
    requested: &VideoMetadata,
) -> Result<OpenedInput, Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;

    let ictx = match &settings.input_format {
        Some(name) => {
            ffmpeg_next::device::register_all();
            let format = ffmpeg_next::device::input::video()
                .find(|f| f.name().split(',').any(|n| n == name))
                .ok_or_else(|| format!("capture format '{name}' is not available"))?;
            let mut options = ffmpeg_next::Dictionary::new();
            options.set(
                "video_size",
                &format!("{}x{}", requested.width, requested.height),
            );
            options.set(
                "framerate",
                &requested.fps_or(DEFAULT_FPS as i32).to_string(),
            );
            ffmpeg_next::format::open_with(&settings.device, &format, options)?
            .input()
        }
        None => ffmpeg_next::format::input(&settings.device)?,
    };

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No video stream found")?;
    let stream_index = stream.index();
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;

    let rate = stream.rate();
    let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
        rate.numerator() as f64 / rate.denominator() as f64
    } else {
        requested.fps
    };

    let metadata = VideoMetadata {
        width: requested.width,
        height: requested.height,
        fps,
        codec: decoder
            .codec()
            .map(|c| c.name().to_string())
            .unwrap_or_default(),
        source: Some(settings.device.clone()),
    };

    Ok((ictx, decoder, stream_index, metadata))
}

/// Returns `false` once the pipeline side has gone away.
fn drain_decoder(
    decoder: &mut ffmpeg_next::decoder::Video,
    converter: &mut RgbConverter,
    deliver: &impl Fn(Captured) -> bool,
) -> bool {
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let captured = match converter.convert(&decoded) {
            Ok(frame) => Captured::Frame(frame),
            Err(e) => Captured::Failed(format!("pixel conversion failed: {e}")),
        };
        if !deliver(captured) {
            return false;
        }
    }
    true
}

/// Scales decoded frames of any pixel format and size to packed RGB24 at
/// the output resolution. The scaler is rebuilt when the input changes.
struct RgbConverter {
    width: u32,
    height: u32,
    scaler: Option<(ffmpeg_next::software::scaling::Context, ffmpeg_next::format::Pixel, u32, u32)>,
    next_index: usize,
}

impl RgbConverter {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scaler: None,
            next_index: 0,
        }
    }

    fn convert(
        &mut self,
        decoded: &ffmpeg_next::util::frame::video::Video,
    ) -> Result<Frame, ffmpeg_next::Error> {
        let input = (decoded.format(), decoded.width(), decoded.height());
        let stale = !matches!(&self.scaler, Some((_, f, w, h)) if (*f, *w, *h) == input);
        if stale {
            let context = ffmpeg_next::software::scaling::Context::get(
                input.0,
                input.1,
                input.2,
                ffmpeg_next::format::Pixel::RGB24,
                self.width,
                self.height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((context, input.0, input.1, input.2));
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler.run(decoded, &mut rgb)?;
        }

        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, RGB_CHANNELS, self.next_index);
        self.next_index += 1;
        Ok(frame)
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping the padding ffmpeg may add at the end of each row.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::domain::video_sink::VideoSink;
    use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;

    fn record(path: &Path, frames: usize, w: u32, h: u32) {
        let mut writer = FfmpegWriter::new();
        writer.open(path, &VideoMetadata::new(w, h, 20.0)).unwrap();
        for i in 0..frames {
            let value = ((i * 40) % 256) as u8;
            writer
                .write(&Frame::new(vec![value; (w * h * 3) as usize], w, h, 3, i))
                .unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_file_source_delivers_every_frame_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        record(&path, 5, 160, 120);

        let mut source = FfmpegCameraSource::new(CameraSettings::file(&path));
        let meta = source.open(&VideoMetadata::new(160, 120, 20.0)).unwrap();
        assert_eq!((meta.width, meta.height), (160, 120));
        assert_eq!(meta.source.as_deref(), Some(&*path.to_string_lossy()));

        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.channels(), 3);
            indices.push(frame.index());
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(source.next_frame().unwrap().is_none());
        source.close().unwrap();
    }

    #[test]
    fn test_frames_scaled_to_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        record(&path, 2, 160, 120);

        let mut source = FfmpegCameraSource::new(CameraSettings::file(&path));
        let meta = source.open(&VideoMetadata::new(80, 64, 20.0)).unwrap();
        assert_eq!((meta.width, meta.height), (80, 64));

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (80, 64));
        assert_eq!(frame.data().len(), 80 * 64 * 3);
        source.close().unwrap();
    }

    #[test]
    fn test_open_missing_file_fails() {
        let mut source =
            FfmpegCameraSource::new(CameraSettings::file(Path::new("/nonexistent/clip.avi")));
        assert!(source.open(&VideoMetadata::new(160, 120, 20.0)).is_err());
    }

    #[test]
    fn test_unknown_capture_format_fails() {
        let mut source = FfmpegCameraSource::new(CameraSettings::camera("no-such-grabber", "x"));
        let err = source
            .open(&VideoMetadata::new(160, 120, 20.0))
            .unwrap_err();
        assert!(err.to_string().contains("no-such-grabber"));
    }

    #[test]
    fn test_next_frame_before_open_is_error() {
        let mut source = FfmpegCameraSource::new(CameraSettings::default());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_close_mid_stream_stops_capture_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        record(&path, 10, 160, 120);

        let mut source = FfmpegCameraSource::new(CameraSettings::file(&path));
        source.open(&VideoMetadata::new(160, 120, 20.0)).unwrap();
        source.next_frame().unwrap();
        source.close().unwrap();
        assert!(source.handle.is_none());
        source.close().unwrap();
    }

    /// Serves a short Y4M clip through a FIFO, then keeps the write end
    /// open without writing, so the reader blocks like a frozen camera.
    #[cfg(unix)]
    fn frozen_feed(
        dir: &Path,
        frames: usize,
    ) -> (std::path::PathBuf, Sender<()>, std::thread::JoinHandle<()>) {
        use std::io::Write;

        let fifo = dir.join("feed.y4m");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success());

        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let path = fifo.clone();
        let writer = std::thread::spawn(move || {
            let mut pipe = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            let header = b"YUV4MPEG2 W16 H16 F20:1 Ip A1:1 C420jpeg\n";
            pipe.write_all(header).unwrap();
            for _ in 0..frames {
                pipe.write_all(b"FRAME\n").unwrap();
                pipe.write_all(&[128u8; 16 * 16 * 3 / 2]).unwrap();
            }
            pipe.flush().unwrap();
            let _ = release_rx.recv();
        });
        (fifo, release_tx, writer)
    }

    #[cfg(unix)]
    #[test]
    fn test_frozen_source_times_out_and_closes_promptly() {
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let (fifo, release, writer) = frozen_feed(dir.path(), 3);
        let timeout = Duration::from_secs(2);

        let mut source =
            FfmpegCameraSource::new(CameraSettings::file(&fifo).with_timeout(timeout));
        source.open(&VideoMetadata::new(16, 16, 20.0)).unwrap();

        let (error, waited) = loop {
            let started = Instant::now();
            match source.next_frame() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("frozen feed must not look like end of stream"),
                Err(e) => break (e, started.elapsed()),
            }
        };
        let timed_out = error.downcast_ref::<FrameTimeout>().unwrap();
        assert_eq!(timed_out.waited, timeout);
        assert!(waited >= timeout - Duration::from_millis(50));
        assert!(waited < timeout + Duration::from_secs(2), "waited {waited:?}");

        let started = Instant::now();
        source.close().unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "close blocked for {:?}",
            started.elapsed()
        );
        assert!(source.handle.is_none());

        // Closing the pipe lets the detached capture thread finish.
        release.send(()).unwrap();
        writer.join().unwrap();
    }

    fn blank(index: usize) -> Captured {
        Captured::Frame(Frame::new(vec![0; 12], 2, 2, 3, index))
    }

    #[test]
    fn test_live_queue_drops_frames_but_not_failures() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        assert!(deliver(&tx, blank(0), true));
        assert!(deliver(&tx, blank(1), true));
        assert_eq!(rx.len(), 1, "second frame dropped on a full queue");

        let sender =
            std::thread::spawn(move || deliver(&tx, Captured::Failed("gone".into()), true));
        assert!(matches!(rx.recv().unwrap(), Captured::Frame(f) if f.index() == 0));
        assert!(matches!(rx.recv().unwrap(), Captured::Failed(m) if m == "gone"));
        assert!(sender.join().unwrap());
    }

    #[test]
    fn test_deliver_reports_closed_pipeline() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        assert!(!deliver(&tx, blank(0), true));
        assert!(!deliver(&tx, Captured::End, false));
    }

    #[test]
    fn test_settings_timeout_override() {
        let settings = CameraSettings::default().with_timeout(Duration::from_millis(250));
        assert_eq!(settings.timeout, Duration::from_millis(250));
        assert!(settings.is_live());
        assert!(!CameraSettings::file(Path::new("a.avi")).is_live());
    }
}
