pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const DEFAULT_SOURCE: &str = "/dev/video0";

/// Slot table capacity: faces beyond this index are never classified.
pub const DEFAULT_MAX_FACES: usize = 5;

/// One running worker per face slot. Zero is accepted as an explicit
/// opt-in to unbounded dispatch.
pub const DEFAULT_MAX_CONCURRENT: usize = DEFAULT_MAX_FACES;

pub const DEFAULT_DISPLAY_WIDTH: u32 = 1024;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 574;

/// Side length of the aligned face crop handed to the classifier.
pub const DEFAULT_CROP_SIZE: u32 = 256;

/// Exit-key poll timeout; also the minimum period of the render loop.
pub const DEFAULT_KEY_POLL_MS: u64 = 20;

/// Frames discarded while a camera adjusts exposure in single-shot mode.
pub const CAMERA_WARMUP_FRAMES: usize = 30;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
