use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::pipeline::control::ControlCommand;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::source_info::SourceInfo;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_writer::VideoWriter;
use crate::video::infrastructure::image_codec;

/// An interactive window (or anything else that shows frames and can be
/// poked by a user). Not `Send`: windowing backends are tied to the thread
/// that created them.
pub trait DisplaySurface {
    fn show(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Commands raised since the last poll (key presses, window closed).
    fn poll_commands(&mut self) -> Vec<ControlCommand>;

    fn close(&mut self);
}

/// Message pushed by a [`FrameSink::SocketPush`] sink.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedFrame {
    pub frame_index: usize,
    pub image: String,
}

/// Records annotated frames to a video file opened on the first frame.
pub struct VideoFileSink {
    writer: Box<dyn VideoWriter>,
    path: PathBuf,
    fps: Option<f64>,
    opened: bool,
}

impl VideoFileSink {
    /// `fps` of `None` lets the writer pick its fallback rate.
    pub fn new(writer: Box<dyn VideoWriter>, path: PathBuf, fps: Option<f64>) -> Self {
        Self {
            writer,
            path,
            fps,
            opened: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn consume(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if !self.opened {
            let info = SourceInfo {
                width: frame.width(),
                height: frame.height(),
                fps: self.fps,
                total_frames: None,
                codec: String::new(),
                source_path: Some(self.path.clone()),
            };
            self.writer.open(&self.path, &info)?;
            self.opened = true;
            log::info!("Recording to {}", self.path.display());
        }
        self.writer.write(frame)
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        self.writer.close()?;
        log::info!("Output saved to: {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageTarget {
    /// Every frame overwrites the same file.
    Fixed(PathBuf),
    /// `<dir>/<prefix>_<n>.<extension>`, `n` counting up from 0.
    Sequence {
        dir: PathBuf,
        prefix: String,
        extension: String,
        next: usize,
    },
}

impl ImageTarget {
    pub fn sequence(dir: impl Into<PathBuf>, prefix: &str, extension: &str) -> Self {
        ImageTarget::Sequence {
            dir: dir.into(),
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            next: 0,
        }
    }

    fn current_path(&self) -> PathBuf {
        match self {
            ImageTarget::Fixed(path) => path.clone(),
            ImageTarget::Sequence {
                dir,
                prefix,
                extension,
                next,
            } => dir.join(format!("{prefix}_{next}.{extension}")),
        }
    }

    fn advance(&mut self) {
        if let ImageTarget::Sequence { next, .. } = self {
            *next += 1;
        }
    }
}

/// Writes still images, either to one path or as a numbered sequence.
pub struct ImageFileSink {
    writer: Box<dyn ImageWriter>,
    target: ImageTarget,
    last_written: Option<PathBuf>,
}

impl ImageFileSink {
    pub fn new(writer: Box<dyn ImageWriter>, target: ImageTarget) -> Self {
        Self {
            writer,
            target,
            last_written: None,
        }
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }

    /// Writes one frame to the current target and advances the sequence.
    pub(crate) fn consume(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let path = self.target.current_path();
        self.writer.write(&path, frame)?;
        self.target.advance();
        log::info!("Saved image: {}", path.display());
        self.last_written = Some(path);
        Ok(())
    }
}

/// Where annotated frames go. A controller may fan out to several.
pub enum FrameSink {
    Display(Box<dyn DisplaySurface>),
    SocketPush {
        sender: Sender<String>,
        jpeg_quality: u8,
    },
    VideoFile(VideoFileSink),
    ImageFile(ImageFileSink),
}

impl FrameSink {
    pub fn socket_push(sender: Sender<String>) -> Self {
        FrameSink::SocketPush {
            sender,
            jpeg_quality: crate::shared::constants::STREAM_JPEG_QUALITY,
        }
    }

    pub fn video_file(writer: Box<dyn VideoWriter>, path: PathBuf, fps: Option<f64>) -> Self {
        FrameSink::VideoFile(VideoFileSink::new(writer, path, fps))
    }

    pub fn image_file(writer: Box<dyn ImageWriter>, target: ImageTarget) -> Self {
        FrameSink::ImageFile(ImageFileSink::new(writer, target))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameSink::Display(_) => "display",
            FrameSink::SocketPush { .. } => "socket",
            FrameSink::VideoFile(_) => "video-file",
            FrameSink::ImageFile(_) => "image-file",
        }
    }

    fn error(&self, message: impl ToString) -> PipelineError {
        PipelineError::Sink {
            sink: self.name().to_string(),
            message: message.to_string(),
        }
    }

    pub fn consume(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let result: Result<(), Box<dyn std::error::Error>> = match self {
            FrameSink::Display(surface) => surface.show(frame),
            FrameSink::SocketPush {
                sender,
                jpeg_quality,
            } => image_codec::frame_to_data_uri(frame, *jpeg_quality).and_then(|image| {
                let message = serde_json::to_string(&PushedFrame {
                    frame_index: frame.index(),
                    image,
                })?;
                sender
                    .send(message)
                    .map_err(|_| "receiver disconnected".into())
            }),
            FrameSink::VideoFile(sink) => sink.consume(frame),
            FrameSink::ImageFile(sink) => sink.consume(frame),
        };
        result.map_err(|e| self.error(e))
    }

    /// Commands raised by interactive sinks; empty for every other kind.
    pub fn poll_commands(&mut self) -> Vec<ControlCommand> {
        match self {
            FrameSink::Display(surface) => surface.poll_commands(),
            _ => Vec::new(),
        }
    }

    pub fn close(&mut self) -> Result<(), PipelineError> {
        let result = match self {
            FrameSink::Display(surface) => {
                surface.close();
                Ok(())
            }
            FrameSink::SocketPush { .. } | FrameSink::ImageFile(_) => Ok(()),
            FrameSink::VideoFile(sink) => sink.close(),
        };
        result.map_err(|e| self.error(e))
    }
}
