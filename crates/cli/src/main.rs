use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;

use facewatch_core::detection::domain::detector::Detector;
use facewatch_core::detection::infrastructure::model_resolver::{self, ModelSpec};
use facewatch_core::detection::infrastructure::yolo_eye_detector::YoloEyeDetector;
use facewatch_core::detection::infrastructure::yolo_face_detector::YoloFaceDetector;
use facewatch_core::events::domain::detection_event::UnmatchedFacePolicy;
use facewatch_core::events::domain::event_log::LogFormat;
use facewatch_core::events::infrastructure::file_event_log::FileEventLog;
use facewatch_core::pipeline::pipeline_config::PipelineConfig;
use facewatch_core::pipeline::pipeline_error::PipelineError;
use facewatch_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facewatch_core::pipeline::pipeline_loop::{PipelineComponents, PipelineLoop};
use facewatch_core::pipeline::stop_signal::StopSignal;
use facewatch_core::shared::constants::{
    DEFAULT_CAMERA_DEVICE, DEFAULT_CAMERA_FORMAT, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use facewatch_core::video::domain::display::{Display, NullDisplay};
use facewatch_core::video::infrastructure::ffmpeg_camera_source::{
    CameraSettings, FfmpegCameraSource,
};
use facewatch_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use facewatch_core::video::infrastructure::snapshot_display::SnapshotDisplay;

/// Live face and eye annotation: records an annotated video and a log of
/// every detection until stopped with Ctrl-C.
#[derive(Parser)]
#[command(name = "facewatch", version)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output video file (default: videos/output.avi).
    #[arg(long)]
    video: Option<PathBuf>,

    /// Detection log file (default: detected_faces_eyes.txt).
    #[arg(long)]
    log: Option<PathBuf>,

    /// Detection log format: text or json-lines.
    #[arg(long)]
    log_format: Option<String>,

    /// Also log faces in which no eye was found.
    #[arg(long)]
    log_faces_without_eyes: bool,

    /// Frame rate of the recorded video (default: 20).
    #[arg(long)]
    fps: Option<u32>,

    /// Capture and output width (default: 640).
    #[arg(long)]
    width: Option<u32>,

    /// Capture and output height (default: 480).
    #[arg(long)]
    height: Option<u32>,

    /// Detection confidence threshold (0.0-1.0) for faces and eyes.
    #[arg(long)]
    confidence: Option<f64>,

    /// Seconds to wait for a frame before treating the camera as failed.
    #[arg(long)]
    frame_timeout: Option<f64>,

    /// Capture device.
    #[arg(long, default_value = DEFAULT_CAMERA_DEVICE)]
    device: String,

    /// libavdevice capture format.
    #[arg(long, default_value = DEFAULT_CAMERA_FORMAT)]
    camera_format: String,

    /// Replay a recorded video instead of capturing from a camera.
    #[arg(long, conflicts_with_all = ["device", "camera_format"])]
    input: Option<PathBuf>,

    /// Face model file (downloaded to the cache when omitted).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Keep the latest annotated frame at this image path.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Rewrite the preview image every N frames.
    #[arg(long, default_value = "5")]
    preview_every: usize,

    /// Stop the run when this file appears.
    #[arg(long)]
    stop_file: Option<PathBuf>,

    /// Log progress every N frames.
    #[arg(long, default_value = "100")]
    progress_every: usize,
}

/// Why the process is exiting unsuccessfully.
enum Failure {
    /// Bad flags or configuration.
    Usage(String),
    /// Something needed before the pipeline could start was unavailable.
    Setup(Box<dyn std::error::Error>),
    Pipeline(PipelineError),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Usage(_) => 1,
            Failure::Setup(_) => 2,
            Failure::Pipeline(e) => e.exit_code(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Usage(message) => write!(f, "{message}"),
            Failure::Setup(e) => write!(f, "{e}"),
            Failure::Pipeline(e) => write!(f, "{e}"),
        }
    }
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(failure) = run(cli) {
        eprintln!("Error: {failure}");
        process::exit(failure.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), Failure> {
    let config = build_config(&cli)?;

    let stop = StopSignal::new();
    let handler_signal = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("Stop requested, finishing current frame");
        handler_signal.request();
    })
    .map_err(|e| Failure::Setup(Box::new(e)))?;

    let (face_detector, eye_detector) = build_detectors(&cli, &config).map_err(Failure::Setup)?;

    let settings = match &cli.input {
        Some(path) => CameraSettings::file(path),
        None => CameraSettings::camera(&cli.camera_format, &cli.device),
    }
    .with_timeout(config.frame_timeout);

    let components = PipelineComponents {
        source: Box::new(FfmpegCameraSource::new(settings)),
        event_log: Box::new(FileEventLog::new(config.log_format)),
        sink: Box::new(FfmpegWriter::new()),
        display: build_display(&cli),
        face_detector,
        eye_detector,
    };

    let mut pipeline = PipelineLoop::new(config, components)
        .with_logger(Box::new(StdoutPipelineLogger::new(cli.progress_every)))
        .with_stop_signal(stop);

    let summary = pipeline.run().map_err(Failure::Pipeline)?;
    log::info!(
        "Done: {} frames recorded, {} detections logged ({:?})",
        summary.frames_written,
        summary.events_logged,
        summary.stop_reason
    );
    Ok(())
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, Failure> {
    let mut config = match &cli.config {
        Some(path) => {
            PipelineConfig::load_json(path).map_err(|e| Failure::Usage(e.to_string()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(video) = &cli.video {
        config.video_path = video.clone();
    }
    if let Some(log) = &cli.log {
        config.log_path = log.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = parse_log_format(format)?;
    }
    if cli.log_faces_without_eyes {
        config.unmatched_face_policy = UnmatchedFacePolicy::FaceOnly;
    }
    if let Some(fps) = cli.fps {
        config.fps = fps;
    }
    if let Some(width) = cli.width {
        config.width = width;
    }
    if let Some(height) = cli.height {
        config.height = height;
    }
    if let Some(confidence) = cli.confidence {
        config.face_tuning.confidence = confidence;
        config.eye_tuning.confidence = confidence;
    }
    if let Some(secs) = cli.frame_timeout {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(Failure::Usage(format!(
                "Frame timeout must be a positive number of seconds, got {secs}"
            )));
        }
        config.frame_timeout = Duration::from_secs_f64(secs);
    }
    if cli.progress_every == 0 {
        return Err(Failure::Usage("--progress-every must be at least 1".into()));
    }

    config
        .validate()
        .map_err(|e| Failure::Usage(e.to_string()))?;
    Ok(config)
}

fn parse_log_format(format: &str) -> Result<LogFormat, Failure> {
    match format {
        "text" => Ok(LogFormat::Text),
        "json-lines" | "jsonl" => Ok(LogFormat::JsonLines),
        other => Err(Failure::Usage(format!(
            "Log format must be 'text' or 'json-lines', got '{other}'"
        ))),
    }
}

type DetectorPair = (Box<dyn Detector>, Box<dyn Detector>);

fn build_detectors(
    cli: &Cli,
    config: &PipelineConfig,
) -> Result<DetectorPair, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let spec = ModelSpec {
        name: YOLO_MODEL_NAME,
        url: YOLO_MODEL_URL,
    };
    let cache_dir = model_resolver::model_cache_dir()?;
    let model_path = model_resolver::resolve(
        &spec,
        cli.model.as_deref(),
        &cache_dir,
        Some(Box::new(download_progress)),
    )?;

    let faces = YoloFaceDetector::new(&model_path, config.face_tuning.clone())?;
    let eyes = YoloEyeDetector::new(&model_path, config.eye_tuning.clone())?;
    Ok((Box::new(faces), Box::new(eyes)))
}

fn build_display(cli: &Cli) -> Box<dyn Display> {
    match &cli.preview {
        Some(path) => {
            let display = SnapshotDisplay::new(path, cli.preview_every);
            match &cli.stop_file {
                Some(stop_file) => Box::new(display.with_stop_file(stop_file)),
                None => Box::new(display),
            }
        }
        None => {
            if cli.stop_file.is_some() {
                log::warn!("--stop-file has no effect without --preview");
            }
            Box::new(NullDisplay)
        }
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
