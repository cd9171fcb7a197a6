use std::time::Instant;

use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::detector::Detector;
use crate::realtime::messages::{DetectionResponse, InboundMessage, OutboundMessage};
use crate::shared::error::PipelineError;
use crate::video::infrastructure::image_codec;

/// Per-connection state for the realtime feed.
///
/// Parameters live only as long as the session; a new connection starts
/// from the defaults it was created with.
pub struct RealtimeSession {
    detector: Detector,
    params: DetectionParams,
    sequence: u64,
}

impl RealtimeSession {
    pub fn new(detector: Detector, params: DetectionParams) -> Self {
        Self {
            detector,
            params,
            sequence: 0,
        }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Number of inbound messages seen so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Handles one raw text message. Returns `None` when the message carried
    /// no frame and its parameters were accepted.
    pub fn handle_text(&mut self, text: &str) -> Option<OutboundMessage> {
        self.sequence += 1;
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(message) => self.handle(message),
            Err(e) => {
                let err = PipelineError::Decode(format!("malformed message: {e}"));
                log::warn!("Message {}: {err}", self.sequence);
                Some(OutboundMessage::error(&err))
            }
        }
    }

    pub fn handle(&mut self, message: InboundMessage) -> Option<OutboundMessage> {
        let update = message.params;
        if !update.is_empty() {
            if let Err(e) = self.params.update(&update) {
                log::warn!("Message {}: {e}", self.sequence);
                return Some(OutboundMessage::error(&e));
            }
            log::debug!("Message {}: parameters now {:?}", self.sequence, self.params);
        }

        let payload = message.frame?;
        Some(match self.process_frame(&payload) {
            Ok(response) => OutboundMessage::Detection(response),
            Err(e) => {
                log::warn!("Message {}: {e}", self.sequence);
                OutboundMessage::error(&e)
            }
        })
    }

    fn process_frame(&self, payload: &str) -> Result<DetectionResponse, PipelineError> {
        let frame = image_codec::decode_payload(payload)
            .map_err(|e| PipelineError::Decode(format!("could not decode frame: {e}")))?;
        let started = Instant::now();
        let faces = self.detector.detect(&frame, &self.params)?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(DetectionResponse::new(faces, elapsed_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_classifier::FaceClassifier;
    use crate::shared::frame::Frame;
    use crate::shared::rect::Rect;
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    /// One face per frame; remembers every scale factor it was called with.
    struct OneFace {
        scale_factors: Mutex<Vec<f64>>,
    }

    impl FaceClassifier for OneFace {
        fn detect(
            &self,
            _frame: &Frame,
            params: &DetectionParams,
        ) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
            self.scale_factors
                .lock()
                .unwrap()
                .push(params.scale_factor());
            Ok(vec![Rect::new(4, 4, 8, 8)])
        }
    }

    fn session() -> (RealtimeSession, Arc<OneFace>) {
        let classifier = Arc::new(OneFace {
            scale_factors: Mutex::new(Vec::new()),
        });
        let detector = Detector::new(classifier.clone());
        (
            RealtimeSession::new(detector, DetectionParams::default()),
            classifier,
        )
    }

    fn frame_payload() -> String {
        let frame = Frame::new(vec![120; 16 * 16 * 3], 16, 16, 3, 0);
        image_codec::frame_to_data_uri(&frame, 90).unwrap()
    }

    fn detection(out: Option<OutboundMessage>) -> DetectionResponse {
        match out {
            Some(OutboundMessage::Detection(d)) => d,
            other => panic!("expected detection, got {other:?}"),
        }
    }

    fn error_kind(out: Option<OutboundMessage>) -> String {
        match out {
            Some(OutboundMessage::Error(e)) => e.kind,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_params_apply_before_frame_and_persist() {
        let (mut session, classifier) = session();
        let first = format!(r#"{{"scaleFactor": 1.2, "frame": "{}"}}"#, frame_payload());
        let response = detection(session.handle_text(&first));
        assert_eq!(response.faces_count, 1);

        let second = format!(r#"{{"frame": "{}"}}"#, frame_payload());
        detection(session.handle_text(&second));

        assert_eq!(*classifier.scale_factors.lock().unwrap(), vec![1.2, 1.2]);
        assert_relative_eq!(session.params().scale_factor(), 1.2);
        assert_eq!(session.sequence(), 2);
    }

    #[test]
    fn test_params_only_message_has_no_response() {
        let (mut session, _) = session();
        assert!(session.handle_text(r#"{"min_neighbors": 2}"#).is_none());
        assert_eq!(session.params().min_neighbors(), 2);
    }

    #[test]
    fn test_malformed_frame_then_recovery() {
        let (mut session, _) = session();
        let kind = error_kind(session.handle_text(r#"{"frame": "data:image/jpeg;base64,!!!"}"#));
        assert_eq!(kind, "DecodeError");

        let ok = format!(r#"{{"frame": "{}"}}"#, frame_payload());
        assert_eq!(detection(session.handle_text(&ok)).faces_count, 1);
    }

    #[test]
    fn test_unparseable_json_is_decode_error() {
        let (mut session, _) = session();
        assert_eq!(error_kind(session.handle_text("not json")), "DecodeError");
        assert_eq!(
            error_kind(session.handle_text(r#"{"scaleFactor": "fast"}"#)),
            "DecodeError"
        );
    }

    #[test]
    fn test_invalid_params_reject_whole_message() {
        let (mut session, classifier) = session();
        let msg = format!(
            r#"{{"scaleFactor": 0.9, "minNeighbors": 1, "frame": "{}"}}"#,
            frame_payload()
        );
        assert_eq!(error_kind(session.handle_text(&msg)), "InvalidParameter");
        assert!(classifier.scale_factors.lock().unwrap().is_empty());
        assert_eq!(*session.params(), DetectionParams::default());
    }

    #[test]
    fn test_sessions_do_not_share_params() {
        let (mut a, _) = session();
        let (b, _) = session();
        a.handle_text(r#"{"scaleFactor": 1.5}"#);
        assert_relative_eq!(a.params().scale_factor(), 1.5);
        assert_relative_eq!(b.params().scale_factor(), 1.1);
    }
}
