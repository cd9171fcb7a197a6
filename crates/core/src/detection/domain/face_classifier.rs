use crate::detection::domain::detection_params::DetectionParams;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Opaque face localization capability.
///
/// Implementations must be deterministic for identical inputs and safe to
/// call from several sessions at once, hence `&self` and `Sync`.
pub trait FaceClassifier: Send + Sync {
    fn detect(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Rect>, Box<dyn std::error::Error>>;
}
