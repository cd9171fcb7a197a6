use std::path::{Path, PathBuf};

use crate::shared::constants::WEBCAM_CAPTURE_SIZE;
use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;
use crate::video::domain::frame_reader::FrameReader;
use crate::video::infrastructure::ffmpeg_reader::StreamDecoder;

/// libavdevice demuxers that can capture from a camera.
const CAPTURE_FORMATS: &[&str] = &["v4l2", "video4linux2", "avfoundation", "dshow"];

/// Captures frames from a local camera through libavdevice.
///
/// `read_frame` blocks until the device delivers the next frame.
pub struct WebcamReader {
    stream: Option<StreamDecoder>,
    capture_size: (u32, u32),
}

// Safety: WebcamReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for WebcamReader {}

impl WebcamReader {
    pub fn new() -> Self {
        Self {
            stream: None,
            capture_size: WEBCAM_CAPTURE_SIZE,
        }
    }

    pub fn with_capture_size(mut self, width: u32, height: u32) -> Self {
        self.capture_size = (width, height);
        self
    }
}

impl Default for WebcamReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Device locator for a numeric camera id on this platform.
pub fn device_path(camera_id: u32) -> PathBuf {
    if cfg!(target_os = "linux") {
        PathBuf::from(format!("/dev/video{camera_id}"))
    } else if cfg!(target_os = "windows") {
        PathBuf::from(format!("video={camera_id}"))
    } else {
        PathBuf::from(camera_id.to_string())
    }
}

fn is_capture_format(name: &str) -> bool {
    name.split(',').any(|n| CAPTURE_FORMATS.contains(&n.trim()))
}

impl FrameReader for WebcamReader {
    fn open(&mut self, path: &Path) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| is_capture_format(f.name()))
            .ok_or("no camera capture backend available in this ffmpeg build")?;

        let mut options = ffmpeg_next::Dictionary::new();
        let (w, h) = self.capture_size;
        options.set("video_size", &format!("{w}x{h}"));

        let ictx = match ffmpeg_next::format::open_with(
            path,
            &ffmpeg_next::format::Format::Input(format),
            options,
        )? {
            ffmpeg_next::format::context::Context::Input(ictx) => ictx,
            ffmpeg_next::format::context::Context::Output(_) => {
                return Err("camera device opened as an output".into())
            }
        };

        let (stream, mut info) = StreamDecoder::new(ictx)?;
        info.total_frames = None;
        info.source_path = Some(path.to_path_buf());
        log::info!(
            "Camera {} opened at {}x{}",
            path.display(),
            info.width,
            info.height
        );
        self.stream = Some(stream);
        Ok(info)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        self.stream
            .as_mut()
            .ok_or("WebcamReader: not opened")?
            .next_frame()
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
