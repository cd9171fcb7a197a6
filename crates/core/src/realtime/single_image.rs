use std::time::Instant;

use serde::Serialize;

use crate::detection::domain::detection_params::{DetectionParams, ParamsUpdate};
use crate::detection::domain::detector::Detector;
use crate::realtime::messages::round2;
use crate::shared::constants::STREAM_JPEG_QUALITY;
use crate::shared::error::PipelineError;
use crate::shared::rect::Rect;
use crate::video::infrastructure::image_codec;

/// Encoded image as received from a client.
#[derive(Debug, Clone, Copy)]
pub enum ImagePayload<'a> {
    /// Raw file bytes (JPEG, PNG, ...).
    Bytes(&'a [u8]),
    /// Base64 text, optionally with a data-URI prefix.
    Base64(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleImageResult {
    pub faces_count: usize,
    pub faces: Vec<Rect>,
    pub detection_time_ms: f64,
    /// Annotated copy as a JPEG data URI.
    pub annotated_image: String,
    pub original_size: ImageSize,
}

/// One-shot detection on an uploaded image.
///
/// `overrides` apply to a copy of `defaults`; nothing persists between calls.
pub fn detect_image(
    detector: &Detector,
    payload: ImagePayload<'_>,
    overrides: &ParamsUpdate,
    defaults: &DetectionParams,
) -> Result<SingleImageResult, PipelineError> {
    let mut params = *defaults;
    params.update(overrides)?;

    let frame = match payload {
        ImagePayload::Bytes(bytes) => image_codec::decode_bytes(bytes),
        ImagePayload::Base64(text) => image_codec::decode_payload(text),
    }
    .map_err(|e| PipelineError::Decode(format!("could not decode image: {e}")))?;

    let started = Instant::now();
    let faces = detector.detect(&frame, &params)?;
    let detection_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    let annotated = detector.annotate(&frame, &faces);
    let annotated_image = image_codec::frame_to_data_uri(&annotated, STREAM_JPEG_QUALITY)
        .map_err(|e| PipelineError::Decode(format!("could not encode result: {e}")))?;

    Ok(SingleImageResult {
        faces_count: faces.len(),
        faces,
        detection_time_ms: round2(detection_time_ms),
        annotated_image,
        original_size: ImageSize {
            width: frame.width(),
            height: frame.height(),
        },
    })
}
