use std::path::{Path, PathBuf};

use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;
use crate::video::domain::frame_reader::FrameReader;

/// Consecutive undecodable frames after which a video is treated as exhausted.
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 32;

/// An opened reader plus the bookkeeping every source variant shares.
pub struct OpenedReader {
    reader: Box<dyn FrameReader>,
    info: SourceInfo,
    next_index: usize,
    consecutive_errors: usize,
    exhausted: bool,
    closed: bool,
}

impl OpenedReader {
    fn open(mut reader: Box<dyn FrameReader>, path: &Path) -> Result<Self, PipelineError> {
        let info = reader
            .open(path)
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {e}", path.display())))?;
        Ok(Self {
            reader,
            info,
            next_index: 0,
            consecutive_errors: 0,
            exhausted: false,
            closed: false,
        })
    }

    fn stamp(&mut self, frame: Frame) -> Frame {
        let frame = frame.with_index(self.next_index);
        self.next_index += 1;
        self.consecutive_errors = 0;
        frame
    }

    fn close(&mut self) {
        if !self.closed {
            self.reader.close();
            self.closed = true;
            self.exhausted = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Webcam,
    Video,
    Image,
}

/// Where frames come from. The variant fixes end-of-stream and error
/// semantics; the wrapped reader does the actual decoding.
pub enum FrameSource {
    /// Live device: never ends normally, any read failure is fatal.
    Webcam(OpenedReader),
    /// File playback: ends when exhausted, bad frames are skipped.
    Video(OpenedReader),
    /// One still image, yielded exactly once.
    Image(OpenedReader),
}

impl FrameSource {
    pub fn webcam(reader: Box<dyn FrameReader>, device: &Path) -> Result<Self, PipelineError> {
        let mut opened = OpenedReader::open(reader, device)?;
        opened.info.total_frames = None;
        Ok(FrameSource::Webcam(opened))
    }

    pub fn video(reader: Box<dyn FrameReader>, path: &Path) -> Result<Self, PipelineError> {
        let opened = OpenedReader::open(reader, path)?;
        log::info!(
            "Video: {}x{}, {} fps, {} frames",
            opened.info.width,
            opened.info.height,
            opened
                .info
                .frame_rate()
                .map_or("unknown".to_string(), |f| format!("{f:.2}")),
            opened
                .info
                .total_frames
                .map_or("unknown".to_string(), |n| n.to_string())
        );
        Ok(FrameSource::Video(opened))
    }

    pub fn image(reader: Box<dyn FrameReader>, path: &Path) -> Result<Self, PipelineError> {
        let mut opened = OpenedReader::open(reader, path)?;
        opened.info.total_frames = Some(1);
        Ok(FrameSource::Image(opened))
    }

    fn inner(&self) -> &OpenedReader {
        match self {
            FrameSource::Webcam(r) | FrameSource::Video(r) | FrameSource::Image(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut OpenedReader {
        match self {
            FrameSource::Webcam(r) | FrameSource::Video(r) | FrameSource::Image(r) => r,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            FrameSource::Webcam(_) => SourceKind::Webcam,
            FrameSource::Video(_) => SourceKind::Video,
            FrameSource::Image(_) => SourceKind::Image,
        }
    }

    pub fn info(&self) -> &SourceInfo {
        &self.inner().info
    }

    pub fn source_path(&self) -> Option<&PathBuf> {
        self.inner().info.source_path.as_ref()
    }

    /// Next frame, or `Ok(None)` at end of stream.
    pub fn next(&mut self) -> Result<Option<Frame>, PipelineError> {
        let kind = self.kind();
        let src = self.inner_mut();
        if src.exhausted {
            return Ok(None);
        }
        match kind {
            SourceKind::Webcam => match src.reader.read_frame() {
                Ok(Some(frame)) => Ok(Some(src.stamp(frame))),
                Ok(None) => {
                    src.exhausted = true;
                    Err(PipelineError::Capture("camera stream ended".into()))
                }
                Err(e) => {
                    src.exhausted = true;
                    Err(PipelineError::Capture(e.to_string()))
                }
            },
            SourceKind::Video => match src.reader.read_frame() {
                Ok(Some(frame)) => Ok(Some(src.stamp(frame))),
                Ok(None) => {
                    src.exhausted = true;
                    Ok(None)
                }
                Err(e) => {
                    src.consecutive_errors += 1;
                    // The failed unit still occupies a slot in the stream.
                    src.next_index += 1;
                    if src.consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        log::warn!(
                            "Giving up after {} consecutive undecodable frames",
                            src.consecutive_errors
                        );
                        src.exhausted = true;
                    }
                    Err(PipelineError::Decode(e.to_string()))
                }
            },
            SourceKind::Image => {
                src.exhausted = true;
                match src.reader.read_frame() {
                    Ok(Some(frame)) => Ok(Some(src.stamp(frame))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(PipelineError::Decode(e.to_string())),
                }
            }
        }
    }

    pub fn native_frame_rate(&self) -> Option<f64> {
        match self {
            FrameSource::Image(_) => None,
            FrameSource::Webcam(r) | FrameSource::Video(r) => r.info.frame_rate(),
        }
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        let info = self.info();
        (info.width > 0 && info.height > 0).then(|| info.resolution())
    }

    pub fn total_frame_count(&self) -> Option<usize> {
        match self {
            FrameSource::Webcam(_) => None,
            FrameSource::Video(r) => r.info.total_frames.filter(|&n| n > 0),
            FrameSource::Image(_) => Some(1),
        }
    }

    /// Playback position after `frames_read` frames, clamped to `[0, 1]`.
    /// `None` when the total is unknown.
    pub fn progress_fraction(&self, frames_read: usize) -> Option<f64> {
        let total = self.total_frame_count()?;
        Some((frames_read as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// Releases the underlying reader. Safe to call more than once.
    pub fn close(&mut self) {
        self.inner_mut().close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    type ReadResult = Result<Option<Frame>, String>;

    struct ScriptedReader {
        script: VecDeque<ReadResult>,
        info: SourceInfo,
        fail_open: bool,
        closes: Arc<Mutex<usize>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<ReadResult>, total: Option<usize>) -> Self {
            Self {
                script: script.into(),
                info: SourceInfo {
                    width: 4,
                    height: 2,
                    fps: Some(25.0),
                    total_frames: total,
                    codec: "stub".into(),
                    source_path: None,
                },
                fail_open: false,
                closes: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl FrameReader for ScriptedReader {
        fn open(&mut self, path: &Path) -> Result<SourceInfo, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("no such file".into());
            }
            let mut info = self.info.clone();
            info.source_path = Some(path.to_path_buf());
            Ok(info)
        }

        fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            match self.script.pop_front() {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(msg)) => Err(msg.into()),
                None => Ok(None),
            }
        }

        fn close(&mut self) {
            *self.closes.lock().unwrap() += 1;
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0; 4 * 2 * 3], 4, 2, 3, index)
    }

    // --- Open ---

    #[test]
    fn test_open_failure_is_source_unavailable() {
        let mut reader = ScriptedReader::new(vec![], None);
        reader.fail_open = true;
        let err = FrameSource::video(Box::new(reader), Path::new("missing.mp4"))
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::SourceUnavailable("missing.mp4: no such file".into()));
        assert!(err.is_fatal());
    }

    // --- Image ---

    #[test]
    fn test_image_yields_once_then_end_of_stream() {
        let reader = ScriptedReader::new(vec![Ok(Some(frame(7))), Ok(Some(frame(8)))], None);
        let mut source = FrameSource::image(Box::new(reader), Path::new("a.png")).unwrap();

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.index(), 0);
        for _ in 0..3 {
            assert_eq!(source.next().unwrap(), None);
        }
        assert_eq!(source.total_frame_count(), Some(1));
        assert_eq!(source.native_frame_rate(), None);
    }

    // --- Video ---

    #[test]
    fn test_video_decode_error_is_recoverable() {
        let reader = ScriptedReader::new(
            vec![Ok(Some(frame(0))), Err("corrupt".into()), Ok(Some(frame(2)))],
            Some(3),
        );
        let mut source = FrameSource::video(Box::new(reader), Path::new("v.avi")).unwrap();

        assert_eq!(source.next().unwrap().unwrap().index(), 0);
        let err = source.next().unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
        assert!(!err.is_fatal());
        assert_eq!(source.next().unwrap().unwrap().index(), 2);
        assert_eq!(source.next().unwrap(), None);
        assert_eq!(source.next().unwrap(), None);
    }

    #[test]
    fn test_video_gives_up_after_repeated_errors() {
        let script = (0..MAX_CONSECUTIVE_DECODE_ERRORS + 5)
            .map(|_| Err("broken".to_string()))
            .collect();
        let reader = ScriptedReader::new(script, None);
        let mut source = FrameSource::video(Box::new(reader), Path::new("v.avi")).unwrap();

        for _ in 0..MAX_CONSECUTIVE_DECODE_ERRORS {
            assert!(source.next().is_err());
        }
        assert_eq!(source.next().unwrap(), None);
    }

    #[test]
    fn test_progress_fraction_monotonic_and_reaches_one() {
        let reader = ScriptedReader::new(vec![], Some(4));
        let source = FrameSource::video(Box::new(reader), Path::new("v.avi")).unwrap();

        let fractions: Vec<f64> = (0..=6)
            .map(|n| source.progress_fraction(n).unwrap())
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(fractions[2], 0.5);
        assert_relative_eq!(fractions[4], 1.0);
        assert_relative_eq!(fractions[6], 1.0);
    }

    #[test]
    fn test_progress_unknown_without_total() {
        let reader = ScriptedReader::new(vec![], None);
        let source = FrameSource::video(Box::new(reader), Path::new("v.avi")).unwrap();
        assert_eq!(source.progress_fraction(3), None);
        assert_eq!(source.native_frame_rate(), Some(25.0));
        assert_eq!(source.resolution(), Some((4, 2)));
    }

    // --- Webcam ---

    #[test]
    fn test_webcam_failure_is_fatal_capture_error() {
        let reader = ScriptedReader::new(vec![Ok(Some(frame(0))), Err("unplugged".into())], Some(9));
        let mut source = FrameSource::webcam(Box::new(reader), Path::new("/dev/video0")).unwrap();

        assert_eq!(source.total_frame_count(), None);
        assert!(source.next().unwrap().is_some());
        let err = source.next().unwrap_err();
        assert_eq!(err, PipelineError::Capture("unplugged".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_webcam_end_of_stream_is_capture_error() {
        let reader = ScriptedReader::new(vec![], None);
        let mut source = FrameSource::webcam(Box::new(reader), Path::new("0")).unwrap();
        assert_eq!(source.next().unwrap_err().kind(), "CaptureError");
    }

    // --- Close ---

    #[test]
    fn test_close_releases_reader_once() {
        let reader = ScriptedReader::new(vec![Ok(Some(frame(0)))], None);
        let closes = reader.closes.clone();
        let mut source = FrameSource::video(Box::new(reader), Path::new("v.avi")).unwrap();

        source.close();
        source.close();
        assert!(source.is_closed());
        assert_eq!(*closes.lock().unwrap(), 1);
        assert_eq!(source.next().unwrap(), None);
    }
}
