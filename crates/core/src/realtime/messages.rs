use serde::{Deserialize, Serialize};

use crate::detection::domain::detection_params::ParamsUpdate;
use crate::shared::error::PipelineError;
use crate::shared::rect::Rect;

/// One inbound realtime message: a parameter update, a frame, or both.
/// Parameters are applied before the frame is processed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(flatten)]
    pub params: ParamsUpdate,
    /// Base64 image, optionally with a `data:...;base64,` prefix.
    #[serde(default)]
    pub frame: Option<String>,
}

/// Result for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResponse {
    pub faces_count: usize,
    pub faces: Vec<Rect>,
    pub detection_time_ms: f64,
}

impl DetectionResponse {
    pub fn new(faces: Vec<Rect>, detection_time_ms: f64) -> Self {
        Self {
            faces_count: faces.len(),
            faces,
            detection_time_ms: round2(detection_time_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Detection(DetectionResponse),
    Error(ErrorResponse),
}

impl OutboundMessage {
    pub fn error(err: &PipelineError) -> Self {
        OutboundMessage::Error(err.into())
    }

    pub fn to_json(&self) -> String {
        // Every field is a plain number, string or sequence of them.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"error":"failed to encode response: {e}","kind":"InternalError"}}"#)
        })
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
