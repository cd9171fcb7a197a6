use std::sync::Arc;

use crate::annotation::overlay::{self, Overlay, OverlayStyle};
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::face_classifier::FaceClassifier;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Wraps a [`FaceClassifier`] with frame validation, optional downscaling
/// and overlay rendering.
///
/// Cheap to clone; clones share the classifier.
#[derive(Clone)]
pub struct Detector {
    classifier: Arc<dyn FaceClassifier>,
    style: OverlayStyle,
    resize_factor: f64,
}

impl Detector {
    pub fn new(classifier: Arc<dyn FaceClassifier>) -> Self {
        Self {
            classifier,
            style: OverlayStyle::default(),
            resize_factor: 1.0,
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    /// Frames are shrunk by `factor` before classification when it lies in
    /// `(0, 1)`; any other value disables resizing.
    pub fn with_resize_factor(mut self, factor: f64) -> Self {
        self.resize_factor = if factor > 0.0 && factor < 1.0 {
            factor
        } else {
            1.0
        };
        self
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn resize_factor(&self) -> f64 {
        self.resize_factor
    }

    /// Locates faces in source-frame coordinates. Zero faces is a valid result.
    pub fn detect(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Rect>, PipelineError> {
        if !frame.is_well_formed() {
            return Err(PipelineError::Decode(format!(
                "malformed frame buffer: {}x{}x{} with {} bytes",
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.data().len()
            )));
        }

        if self.resize_factor >= 1.0 {
            return self.classify(frame, params);
        }

        let w = ((frame.width() as f64 * self.resize_factor).round() as u32).max(1);
        let h = ((frame.height() as f64 * self.resize_factor).round() as u32).max(1);
        let small = frame
            .resized(w, h)
            .ok_or_else(|| PipelineError::Decode("failed to resize frame".to_string()))?;
        let back = 1.0 / self.resize_factor;
        Ok(self
            .classify(&small, params)?
            .iter()
            .map(|r| r.scaled(back).clamped(frame.width(), frame.height()))
            .collect())
    }

    /// Returns a copy of `frame` with one rectangle drawn per detection.
    pub fn annotate(&self, frame: &Frame, rects: &[Rect]) -> Frame {
        overlay::compose(frame, &[Overlay::Boxes(rects.to_vec())], &self.style)
    }

    /// Returns a copy of `frame` with every overlay drawn in order.
    pub fn compose(&self, frame: &Frame, overlays: &[Overlay]) -> Frame {
        overlay::compose(frame, overlays, &self.style)
    }

    fn classify(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Rect>, PipelineError> {
        self.classifier
            .detect(frame, params)
            .map_err(|e| PipelineError::Detection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedClassifier {
        rects: Vec<Rect>,
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl FixedClassifier {
        fn new(rects: Vec<Rect>) -> Self {
            Self {
                rects,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl FaceClassifier for FixedClassifier {
        fn detect(
            &self,
            frame: &Frame,
            _params: &DetectionParams,
        ) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
            self.seen
                .lock()
                .unwrap()
                .push((frame.width(), frame.height()));
            Ok(self.rects.clone())
        }
    }

    struct FailingClassifier;

    impl FaceClassifier for FailingClassifier {
        fn detect(
            &self,
            _frame: &Frame,
            _params: &DetectionParams,
        ) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
            Err("session run failed".into())
        }
    }

    fn make_frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![128; (w * h * 3) as usize], w, h, 3, 0)
    }

    #[test]
    fn test_detect_passes_through_classifier_rects() {
        let rects = vec![Rect::new(10, 10, 40, 40)];
        let detector = Detector::new(Arc::new(FixedClassifier::new(rects.clone())));
        let found = detector
            .detect(&make_frame(100, 100), &DetectionParams::default())
            .unwrap();
        assert_eq!(found, rects);
    }

    #[test]
    fn test_detect_is_deterministic() {
        let detector = Detector::new(Arc::new(FixedClassifier::new(vec![Rect::new(
            1, 2, 3, 4,
        )])));
        let frame = make_frame(20, 20);
        let params = DetectionParams::default();
        assert_eq!(
            detector.detect(&frame, &params).unwrap(),
            detector.detect(&frame, &params).unwrap()
        );
    }

    #[test]
    fn test_zero_faces_is_ok() {
        let detector = Detector::new(Arc::new(FixedClassifier::new(Vec::new())));
        let found = detector
            .detect(&make_frame(10, 10), &DetectionParams::default())
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_malformed_frame_is_decode_error() {
        let detector = Detector::new(Arc::new(FixedClassifier::new(Vec::new())));
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        let err = detector
            .detect(&frame, &DetectionParams::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_classifier_failure_is_detection_error() {
        let detector = Detector::new(Arc::new(FailingClassifier));
        let err = detector
            .detect(&make_frame(10, 10), &DetectionParams::default())
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::Detection("session run failed".to_string())
        );
    }

    #[test]
    fn test_resize_factor_maps_rects_back() {
        let classifier = Arc::new(FixedClassifier::new(vec![Rect::new(10, 10, 20, 20)]));
        let detector = Detector::new(classifier.clone()).with_resize_factor(0.5);
        let found = detector
            .detect(&make_frame(200, 100), &DetectionParams::default())
            .unwrap();
        assert_eq!(found, vec![Rect::new(20, 20, 40, 40)]);
        assert_eq!(*classifier.seen.lock().unwrap(), vec![(100, 50)]);
    }

    #[test]
    fn test_out_of_range_resize_factor_is_ignored() {
        let detector =
            Detector::new(Arc::new(FixedClassifier::new(Vec::new()))).with_resize_factor(1.5);
        assert_eq!(detector.resize_factor(), 1.0);
    }

    #[test]
    fn test_annotate_returns_new_frame_same_geometry() {
        let detector = Detector::new(Arc::new(FixedClassifier::new(Vec::new())));
        let frame = make_frame(64, 48);
        let annotated = detector.annotate(&frame, &[Rect::new(4, 4, 20, 20)]);
        assert_eq!(annotated.width(), 64);
        assert_eq!(annotated.height(), 48);
        assert_ne!(annotated, frame);
        assert_eq!(annotated.pixel(4, 4), Some(detector.style().box_color));
        assert_eq!(frame.pixel(4, 4), Some([128, 128, 128]));
    }
}
