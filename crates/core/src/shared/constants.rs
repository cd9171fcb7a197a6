/// File name looked up in the model cache when no explicit path is given.
pub const BLAZEFACE_MODEL_NAME: &str = "blazeface.onnx";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Inter-frame delay for video playback when the container reports no rate.
pub const DEFAULT_VIDEO_DELAY_MS: u64 = 33;

/// How long a paused controller blocks on the command channel per iteration.
pub const PAUSE_POLL_MS: u64 = 50;

/// Capture size requested from camera devices.
pub const WEBCAM_CAPTURE_SIZE: (u32, u32) = (640, 480);

/// Frame rate of the webcam recording written alongside the live view.
pub const WEBCAM_RECORD_FPS: f64 = 20.0;

/// Length of the FPS measurement window in seconds.
pub const FPS_WINDOW_SECS: f64 = 1.0;

/// JPEG quality used for frames pushed over realtime channels.
pub const STREAM_JPEG_QUALITY: u8 = 90;

pub const SCREENSHOT_PREFIX: &str = "screenshot";
