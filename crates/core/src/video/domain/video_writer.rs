use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;

/// Abstracts video encoding so the pipeline can record output without
/// depending on a specific codec library.
pub trait VideoWriter: Send {
    /// `info` supplies the output geometry and frame rate.
    fn open(&mut self, path: &Path, info: &SourceInfo) -> Result<(), Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes buffered packets and finalizes the container.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
