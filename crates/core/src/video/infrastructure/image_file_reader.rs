use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;
use crate::video::domain::frame_reader::FrameReader;
use crate::video::infrastructure::ffmpeg_reader::StreamDecoder;

/// Adapts a single image file to the [`FrameReader`] interface.
///
/// The image is decoded eagerly in `open`, so an unreadable file fails before
/// any frame is requested. `read_frame` hands it out once and then reports
/// end of stream.
///
/// Uses ffmpeg for decoding, which is significantly faster than the pure-Rust
/// `image` crate for large images (e.g. 4032x3024 JPEG).
pub struct ImageFileReader {
    frame: Option<Frame>,
    opened: bool,
}

impl ImageFileReader {
    pub fn new() -> Self {
        Self {
            frame: None,
            opened: false,
        }
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader for ImageFileReader {
    fn open(&mut self, path: &Path) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let ictx = ffmpeg_next::format::input(path)?;
        let (mut stream, _) = StreamDecoder::new(ictx)?;
        let frame = stream
            .next_frame()?
            .ok_or_else(|| format!("no image data in {}", path.display()))?;

        let info = SourceInfo::still(frame.width(), frame.height(), Some(path.to_path_buf()));
        self.frame = Some(frame);
        self.opened = true;
        Ok(info)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if !self.opened {
            return Err("ImageFileReader: not opened".into());
        }
        Ok(self.frame.take())
    }

    fn close(&mut self) {
        self.frame = None;
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_test_image(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("test.png");
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_open_returns_still_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let mut reader = ImageFileReader::new();
        let info = reader.open(&path).unwrap();
        assert_eq!(info.resolution(), (100, 80));
        assert_eq!(info.frame_rate(), None);
        assert_eq!(info.total_frames, Some(1));
        assert_eq!(info.source_path, Some(path));
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let mut reader = ImageFileReader::new();
        assert!(reader.open(Path::new("/nonexistent/test.png")).is_err());
    }

    #[test]
    fn test_open_corrupt_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG not really").unwrap();
        assert!(ImageFileReader::new().open(&path).is_err());
    }

    #[test]
    fn test_yields_frame_once_then_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let mut reader = ImageFileReader::new();
        reader.open(&path).unwrap();

        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame.index(), 0);
        assert!(reader.read_frame().unwrap().is_none());
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_is_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let mut reader = ImageFileReader::new();
        reader.open(&path).unwrap();

        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.pixel(0, 0), Some([50, 100, 200]));
    }

    #[test]
    fn test_read_without_open_returns_error() {
        let mut reader = ImageFileReader::new();
        assert!(reader.read_frame().is_err());
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let mut reader = ImageFileReader::new();
        reader.open(&path).unwrap();
        reader.close();
        reader.close();
    }
}
