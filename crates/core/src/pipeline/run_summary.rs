use crate::shared::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// A quit command arrived.
    Quit,
    EndOfStream,
    /// The source failed in a way the run cannot recover from.
    SourceFailed(PipelineError),
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames_processed: usize,
    pub total_detections: usize,
    pub decode_errors: usize,
    pub detection_errors: usize,
    pub sink_errors: usize,
    pub stop_reason: StopReason,
}

impl RunSummary {
    pub fn new(stop_reason: StopReason) -> Self {
        Self {
            frames_processed: 0,
            total_detections: 0,
            decode_errors: 0,
            detection_errors: 0,
            sink_errors: 0,
            stop_reason,
        }
    }

    pub fn average_detections_per_frame(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.total_detections as f64 / self.frames_processed as f64
        }
    }

    pub fn log(&self) {
        log::info!("STATISTICS:");
        log::info!("  Frames processed: {}", self.frames_processed);
        log::info!("  Total faces detected: {}", self.total_detections);
        log::info!(
            "  Average faces per frame: {:.2}",
            self.average_detections_per_frame()
        );
        if self.decode_errors + self.detection_errors + self.sink_errors > 0 {
            log::info!(
                "  Errors: {} decode, {} detection, {} sink",
                self.decode_errors,
                self.detection_errors,
                self.sink_errors
            );
        }
    }
}
