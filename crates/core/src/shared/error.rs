use thiserror::Error;

/// Failures surfaced by the detection pipeline.
///
/// Per-frame errors (`Decode`, `Detection`, `Sink`, `InvalidParameter`) are
/// recoverable; `SourceUnavailable` and `Capture` end the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable(_) | PipelineError::Capture(_)
        )
    }

    /// Stable identifier used in realtime error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidParameter(_) => "InvalidParameter",
            PipelineError::SourceUnavailable(_) => "SourceUnavailable",
            PipelineError::Decode(_) => "DecodeError",
            PipelineError::Capture(_) => "CaptureError",
            PipelineError::Detection(_) => "DetectionFailed",
            PipelineError::Sink { .. } => "SinkError",
        }
    }
}
