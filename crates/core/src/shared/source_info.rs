use std::path::PathBuf;

/// What a frame reader learned about its source when it was opened.
///
/// `fps` and `total_frames` are `None` when the source cannot report them
/// (live devices, containers without a frame count).
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub total_frames: Option<usize>,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl SourceInfo {
    /// Info for a single decoded still image.
    pub fn still(width: u32, height: u32, source_path: Option<PathBuf>) -> Self {
        Self {
            width,
            height,
            fps: None,
            total_frames: Some(1),
            codec: String::new(),
            source_path,
        }
    }

    /// Frame rate usable for pacing: `None` for missing, zero or non-finite rates.
    pub fn frame_rate(&self) -> Option<f64> {
        self.fps.filter(|fps| fps.is_finite() && *fps > 0.0)
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
