//! BlazeFace-backed [`FaceClassifier`] using ONNX Runtime via `ort`.
//!
//! BlazeFace sees a fixed 128x128 input, so scale coverage comes from scanning
//! a pyramid of square windows: the first level spans the short side of the
//! frame and each next level shrinks by the scale factor. Every window that
//! fires contributes one candidate, and overlapping candidates are merged by
//! [`group_rectangles`] using the min-neighbors threshold.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::face_classifier::FaceClassifier;
use crate::detection::domain::rect_grouper::group_rectangles;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Minimum sigmoid score for a box to become a candidate.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Per-window NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

const MAX_PYRAMID_LEVELS: usize = 8;

/// Windows smaller than this are upsampled too far to be useful.
const MIN_WINDOW_SIDE: u32 = 48;

pub struct OnnxBlazefaceClassifier {
    session: Mutex<ort::session::Session>,
    confidence: f32,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        log::info!("Loaded face detection model {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            confidence: DEFAULT_CONFIDENCE,
            anchors: generate_anchors(),
        })
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    fn detect_window(
        &self,
        session: &mut ort::session::Session,
        frame: &Frame,
        window: &Rect,
    ) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
        let input_tensor = preprocess(frame, window, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = session.run(ort::inputs![input_value])?;

        // regressors [1, 896, 16], classificators [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets =
            decode_boxes(reg_data, score_data, &self.anchors, self.confidence, window);
        Ok(nms(&mut raw_dets, NMS_IOU_THRESH)
            .iter()
            .map(RawDet::to_rect)
            .collect())
    }
}

impl FaceClassifier for OnnxBlazefaceClassifier {
    fn detect(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| "BlazeFace session lock poisoned")?;

        let mut candidates = Vec::new();
        for window in pyramid_windows(frame.width(), frame.height(), params) {
            candidates.extend(self.detect_window(&mut session, frame, &window)?);
        }
        drop(session);

        Ok(group_rectangles(&candidates, params.min_neighbors())
            .into_iter()
            .map(|r| r.clamped(frame.width(), frame.height()))
            .filter(|r| params.admits(r))
            .collect())
    }
}

fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Window pyramid
// ---------------------------------------------------------------------------

/// Square scan windows, largest first, each level overlapping by half a side.
fn pyramid_windows(width: u32, height: u32, params: &DetectionParams) -> Vec<Rect> {
    let (min_w, min_h) = params.min_size();
    let floor = MIN_WINDOW_SIDE.max(min_w.min(min_h).max(0) as u32);
    let mut windows = Vec::new();
    let mut side = width.min(height) as f64;

    for _ in 0..MAX_PYRAMID_LEVELS {
        let s = side.round() as u32;
        if s < floor || s == 0 {
            break;
        }
        let stride = (s / 2).max(1);
        for y in axis_positions(height, s, stride) {
            for x in axis_positions(width, s, stride) {
                windows.push(Rect::new(x as i32, y as i32, s as i32, s as i32));
            }
        }
        side /= params.scale_factor();
    }
    windows
}

/// Window origins along one axis; the last window is flush with the far edge.
fn axis_positions(length: u32, side: u32, stride: u32) -> Vec<u32> {
    if side > length {
        return Vec::new();
    }
    let last = length - side;
    let mut positions: Vec<u32> = (0..=last).step_by(stride as usize).collect();
    if positions.last() != Some(&last) {
        positions.push(last);
    }
    positions
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Sample `window` of `frame` into a `size x size` NCHW float32 tensor in [0,1].
fn preprocess(frame: &Frame, window: &Rect, size: u32) -> ndarray::Array4<f32> {
    let data = frame.data();
    let stride = frame.width() as usize * 3;
    let s = size as usize;
    let (wx, wy) = (window.x.max(0) as usize, window.y.max(0) as usize);
    let (ww, wh) = (window.width.max(1) as usize, window.height.max(1) as usize);
    let max_x = frame.width() as usize - 1;
    let max_y = frame.height() as usize - 1;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (wy + ((y as f64 + 0.5) * wh as f64 / s as f64) as usize).min(max_y);
        for x in 0..s {
            let src_x = (wx + ((x as f64 + 0.5) * ww as f64 / s as f64) as usize).min(max_x);
            let offset = src_y * stride + src_x * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = data[offset + c] as f32 / 255.0;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// 16x16 grid with 2 anchors per cell plus 8x8 grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}

// ---------------------------------------------------------------------------
// Decoding + NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

impl RawDet {
    fn to_rect(&self) -> Rect {
        Rect::new(
            self.x1.round() as i32,
            self.y1.round() as i32,
            (self.x2 - self.x1).round() as i32,
            (self.y2 - self.y1).round() as i32,
        )
    }
}

/// Converts anchor-relative regressions into frame coordinates inside `window`.
fn decode_boxes(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    window: &Rect,
) -> Vec<RawDet> {
    let (wx, wy) = (window.x as f32, window.y as f32);
    let (ww, wh) = (window.width as f32, window.height as f32);
    let num_anchors = anchors.len().min(NUM_ANCHORS);
    let mut dets = Vec::new();

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }
        let reg_offset = i * 16;
        if reg_offset + 4 > reg_data.len() {
            break;
        }

        let anchor = &anchors[i];
        let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

        let x1 = wx + ((cx - w / 2.0) * ww).max(0.0);
        let y1 = wy + ((cy - h / 2.0) * wh).max(0.0);
        let x2 = wx + ((cx + w / 2.0) * ww).min(ww);
        let y2 = wy + ((cy + h / 2.0) * wh).min(wh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        dets.push(RawDet {
            x1: x1 as f64,
            y1: y1 as f64,
            x2: x2 as f64,
            y2: y2 as f64,
            score: score as f64,
        });
    }
    dets
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
