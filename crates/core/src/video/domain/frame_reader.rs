use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;

/// Pulls frames one at a time from a camera, video container or image file.
///
/// Implementations handle I/O details (devices, codecs, containers) while the
/// pipeline works with the abstract `Frame` and `SourceInfo` types.
pub trait FrameReader: Send {
    /// Opens the source and reports what is known about it.
    fn open(&mut self, path: &Path) -> Result<SourceInfo, Box<dyn std::error::Error>>;

    /// Returns the next frame in acquisition order, or `None` once exhausted.
    ///
    /// An `Err` covers one unit of input; callers may keep reading afterwards.
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases any resources held by the reader. Safe to call repeatedly.
    fn close(&mut self);
}
