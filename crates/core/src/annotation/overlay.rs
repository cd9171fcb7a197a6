use serde::{Deserialize, Serialize};

use crate::annotation::bitmap_font;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Colors and geometry for everything drawn on top of a frame. Colors are RGB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayStyle {
    pub box_color: [u8; 3],
    pub box_thickness: u32,
    pub text_color: [u8; 3],
    /// Left end of the text baseline.
    pub text_origin: (i32, i32),
    pub text_scale: u32,
    pub progress_track: [u8; 3],
    pub progress_fill: [u8; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: [0, 255, 0],
            box_thickness: 2,
            text_color: [255, 255, 0],
            text_origin: (10, 30),
            text_scale: 3,
            progress_track: [100, 100, 100],
            progress_fill: [0, 255, 0],
        }
    }
}

/// One independent draw pass. Passes only interact through z-order.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Boxes(Vec<Rect>),
    /// Face count and measured throughput.
    Stats { faces: usize, fps: f64 },
    /// Playback position in `[0, 1]`.
    Progress(f64),
    Caption(String),
}

/// Draws every overlay in order onto a copy of `frame`.
pub fn compose(frame: &Frame, overlays: &[Overlay], style: &OverlayStyle) -> Frame {
    let mut out = frame.clone();
    for overlay in overlays {
        match overlay {
            Overlay::Boxes(rects) => draw_boxes(&mut out, rects, style),
            Overlay::Stats { faces, fps } => {
                draw_caption(&mut out, &stats_text(*faces, *fps), style)
            }
            Overlay::Progress(fraction) => draw_progress(&mut out, *fraction, style),
            Overlay::Caption(text) => draw_caption(&mut out, text, style),
        }
    }
    out
}

pub fn stats_text(faces: usize, fps: f64) -> String {
    format!("Faces: {faces} | FPS: {fps:.1}")
}

pub fn image_caption(faces: usize, detection_ms: f64) -> String {
    format!("Detected: {faces} face(s) | Time: {detection_ms:.1}ms")
}

pub fn draw_boxes(frame: &mut Frame, rects: &[Rect], style: &OverlayStyle) {
    let t = style.box_thickness.max(1) as i64;
    let color = style.box_color;
    for r in rects {
        let (x0, y0) = (r.x as i64, r.y as i64);
        let (x1, y1) = (r.right() as i64, r.bottom() as i64);
        frame.fill_box(x0, y0, x1, (y0 + t).min(y1), color);
        frame.fill_box(x0, (y1 - t).max(y0), x1, y1, color);
        frame.fill_box(x0, y0, (x0 + t).min(x1), y1, color);
        frame.fill_box((x1 - t).max(x0), y0, x1, y1, color);
    }
}

pub fn draw_progress(frame: &mut Frame, fraction: f64, style: &OverlayStyle) {
    let width = frame.width() as f64;
    let height = frame.height() as i64;
    let bar_width = (width * 0.8) as i64;
    let bar_start = (width * 0.1) as i64;
    let (y0, y1) = (height - 20, height - 10);
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };

    frame.fill_box(bar_start, y0, bar_start + bar_width, y1, style.progress_track);
    let filled = (bar_width as f64 * fraction) as i64;
    frame.fill_box(bar_start, y0, bar_start + filled, y1, style.progress_fill);
}

fn draw_caption(frame: &mut Frame, text: &str, style: &OverlayStyle) {
    let (x, baseline) = style.text_origin;
    let top = baseline as i64 - bitmap_font::text_height(style.text_scale) as i64;
    bitmap_font::draw_text(
        frame,
        x as i64,
        top,
        text,
        style.text_color,
        style.text_scale,
    );
}
