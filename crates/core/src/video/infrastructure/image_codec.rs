//! In-memory image encoding for frames that travel as text: JPEG bytes
//! wrapped in base64 data URIs, and the reverse for inbound payloads.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};

use crate::shared::frame::Frame;

pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let img = frame
        .to_image()
        .ok_or("Failed to create image from frame data")?;
    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode_image(&img)?;
    Ok(out)
}

pub fn to_data_uri(jpeg: &[u8]) -> String {
    format!(
        "{JPEG_DATA_URI_PREFIX}{}",
        general_purpose::STANDARD.encode(jpeg)
    )
}

/// JPEG-encodes `frame` and wraps it as a data URI.
pub fn frame_to_data_uri(
    frame: &Frame,
    quality: u8,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(to_data_uri(&encode_jpeg(frame, quality)?))
}

/// Decodes a base64 image payload, with or without a `data:...;base64,`
/// prefix. Everything up to the first comma is treated as the prefix.
pub fn decode_payload(payload: &str) -> Result<Frame, Box<dyn std::error::Error>> {
    let encoded = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
    decode_bytes(&bytes)
}

/// Decodes an encoded image (JPEG, PNG, ...) into an RGB frame.
pub fn decode_bytes(bytes: &[u8]) -> Result<Frame, Box<dyn std::error::Error>> {
    if bytes.is_empty() {
        return Err("empty image payload".into());
    }
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(Frame::from_image(img.to_rgb8(), 0))
}
