pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const DEFAULT_FPS: u32 = 20;
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

pub const DEFAULT_VIDEO_PATH: &str = "videos/output.avi";
pub const DEFAULT_LOG_PATH: &str = "detected_faces_eyes.txt";

/// How long a single frame read may block before the source counts as dead.
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 5000;

#[cfg(target_os = "linux")]
pub const DEFAULT_CAMERA_FORMAT: &str = "v4l2";
#[cfg(target_os = "linux")]
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

#[cfg(target_os = "macos")]
pub const DEFAULT_CAMERA_FORMAT: &str = "avfoundation";
#[cfg(target_os = "macos")]
pub const DEFAULT_CAMERA_DEVICE: &str = "0";

#[cfg(target_os = "windows")]
pub const DEFAULT_CAMERA_FORMAT: &str = "dshow";
#[cfg(target_os = "windows")]
pub const DEFAULT_CAMERA_DEVICE: &str = "video=Integrated Camera";

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const DEFAULT_CAMERA_FORMAT: &str = "v4l2";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
