use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::annotation::overlay::{self, Overlay};
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::detector::Detector;
use crate::pipeline::control::ControlCommand;
use crate::pipeline::fps_tracker::FpsTracker;
use crate::pipeline::frame_sink::{FrameSink, ImageFileSink};
use crate::pipeline::frame_source::{FrameSource, SourceKind};
use crate::pipeline::pipeline_logger::{stage, NullPipelineLogger, PipelineLogger};
use crate::pipeline::run_summary::{RunSummary, StopReason};
use crate::shared::constants::{DEFAULT_VIDEO_DELAY_MS, PAUSE_POLL_MS};
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Paused,
    /// Terminal.
    Stopped,
}

/// Drives one source through detection, overlays and every attached sink.
///
/// The loop is single-threaded and blocking: the next frame is only pulled
/// once the previous one has been dispatched. Commands arrive from the
/// optional command channel and from interactive sinks, and are applied at
/// the top of every iteration and while waiting between frames.
///
/// Shutdown releases the source and then closes the sinks in attach order,
/// exactly once, whether the run ended normally, by command, by a fatal
/// source error, or by the controller being dropped.
pub struct PipelineController {
    source: FrameSource,
    detector: Detector,
    params: DetectionParams,
    sinks: Vec<FrameSink>,
    screenshots: Option<ImageFileSink>,
    commands: Option<Receiver<ControlCommand>>,
    logger: Box<dyn PipelineLogger>,
    fallback_delay: Duration,
    linger: bool,
    state: ControllerState,
    released: bool,
    fps: FpsTracker,
    last_annotated: Option<Frame>,
    frames_read: usize,
    summary: RunSummary,
}

impl PipelineController {
    pub fn new(source: FrameSource, detector: Detector, params: DetectionParams) -> Self {
        Self {
            source,
            detector,
            params,
            sinks: Vec::new(),
            screenshots: None,
            commands: None,
            logger: Box::new(NullPipelineLogger),
            fallback_delay: Duration::from_millis(DEFAULT_VIDEO_DELAY_MS),
            linger: false,
            state: ControllerState::Running,
            released: false,
            fps: FpsTracker::new(),
            last_annotated: None,
            frames_read: 0,
            summary: RunSummary::new(StopReason::EndOfStream),
        }
    }

    pub fn with_sink(mut self, sink: FrameSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Target for the save-screenshot command.
    pub fn with_screenshots(mut self, sink: ImageFileSink) -> Self {
        self.screenshots = Some(sink);
        self
    }

    pub fn with_commands(mut self, commands: Receiver<ControlCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Inter-frame delay for video files that report no frame rate.
    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    /// Keep handling commands after the source is exhausted until a quit
    /// arrives, so a still image stays on screen.
    pub fn with_linger(mut self, linger: bool) -> Self {
        self.linger = linger;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    /// Runs until the source ends, a quit command arrives or the source
    /// fails fatally. Fatal source errors are returned after shutdown.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let interval = self.frame_interval();
        log::info!(
            "Starting {:?} pipeline{}",
            self.source.kind(),
            interval.map_or(String::new(), |d| format!(
                " at {:.1} ms per frame",
                d.as_secs_f64() * 1000.0
            ))
        );

        let mut last_dispatch: Option<Instant> = None;
        loop {
            self.drain_commands();
            match self.state {
                ControllerState::Stopped => break,
                ControllerState::Paused => {
                    self.wait_until(Instant::now() + Duration::from_millis(PAUSE_POLL_MS));
                    continue;
                }
                ControllerState::Running => {}
            }

            if let (Some(interval), Some(last)) = (interval, last_dispatch) {
                self.wait_until(last + interval);
                if self.state != ControllerState::Running {
                    continue;
                }
            }

            let started = Instant::now();
            let frame = match self.source.next() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("End of stream after {} frames", self.frames_read);
                    self.summary.stop_reason = StopReason::EndOfStream;
                    if self.linger && self.has_command_input() {
                        self.hold_until_quit();
                    }
                    break;
                }
                Err(e) if e.is_fatal() => {
                    log::error!("{e}");
                    self.summary.stop_reason = StopReason::SourceFailed(e.clone());
                    self.stop();
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Skipping frame: {e}");
                    self.summary.decode_errors += 1;
                    continue;
                }
            };
            self.logger.timing(stage::DECODE, elapsed_ms(started));
            self.frames_read += 1;

            self.process(frame);
            last_dispatch = Some(Instant::now());
        }

        self.stop();
        Ok(self.summary.clone())
    }

    /// Detects, annotates and dispatches one frame.
    fn process(&mut self, frame: Frame) {
        let started = Instant::now();
        let rects = match self.detector.detect(&frame, &self.params) {
            Ok(rects) => rects,
            Err(e) => {
                log::warn!("Frame {}: {e}", frame.index());
                self.summary.detection_errors += 1;
                return;
            }
        };
        let detect_ms = elapsed_ms(started);
        self.logger.timing(stage::DETECT, detect_ms);
        let fps = self.fps.tick();

        let started = Instant::now();
        let faces = rects.len();
        let kind = self.source.kind();
        // Skipped frames still occupy a slot, so progress follows the index.
        let position = frame.index() + 1;
        if kind == SourceKind::Image {
            log::info!("Detected {faces} face(s) in {detect_ms:.1}ms");
            for (i, r) in rects.iter().enumerate() {
                log::info!(
                    "  Face {}: x={}, y={}, width={}, height={}",
                    i + 1,
                    r.x,
                    r.y,
                    r.width,
                    r.height
                );
            }
        } else {
            log::debug!("Frame {}: {faces} face(s)", frame.index());
        }

        let mut overlays = vec![Overlay::Boxes(rects)];
        match kind {
            SourceKind::Image => {
                overlays.push(Overlay::Caption(overlay::image_caption(faces, detect_ms)));
            }
            SourceKind::Video | SourceKind::Webcam => {
                overlays.push(Overlay::Stats { faces, fps });
                if let Some(fraction) = self.source.progress_fraction(position) {
                    overlays.push(Overlay::Progress(fraction));
                }
            }
        }
        let annotated = self.detector.compose(&frame, &overlays);
        self.logger.timing(stage::ANNOTATE, elapsed_ms(started));

        let started = Instant::now();
        for sink in &mut self.sinks {
            if let Err(e) = sink.consume(&annotated) {
                log::warn!("{e}");
                self.summary.sink_errors += 1;
            }
        }
        self.logger.timing(stage::DISPATCH, elapsed_ms(started));

        self.summary.frames_processed += 1;
        self.summary.total_detections += faces;
        self.logger.metric("faces", faces as f64);
        self.logger
            .progress(position, self.source.total_frame_count());
        self.last_annotated = Some(annotated);
    }

    /// Delay between dispatches; only video files are paced.
    fn frame_interval(&self) -> Option<Duration> {
        if self.source.kind() != SourceKind::Video {
            return None;
        }
        Some(
            self.source
                .native_frame_rate()
                .map(|fps| Duration::from_secs_f64(1.0 / fps))
                .unwrap_or(self.fallback_delay),
        )
    }

    fn has_command_input(&self) -> bool {
        self.commands.is_some()
            || self
                .sinks
                .iter()
                .any(|s| matches!(s, FrameSink::Display(_)))
    }

    fn hold_until_quit(&mut self) {
        log::info!("Waiting for quit");
        while self.state != ControllerState::Stopped && self.has_command_input() {
            self.wait_until(Instant::now() + Duration::from_millis(PAUSE_POLL_MS));
        }
    }

    /// Applies every command that is already waiting, without blocking.
    fn drain_commands(&mut self) {
        let mut pending = Vec::new();
        for sink in &mut self.sinks {
            pending.extend(sink.poll_commands());
        }
        let mut disconnected = false;
        if let Some(rx) = &self.commands {
            loop {
                match rx.try_recv() {
                    Ok(command) => pending.push(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            log::debug!("Command channel closed");
            self.commands = None;
        }
        for command in pending {
            self.apply(command);
        }
    }

    /// Waits until `deadline`, handling commands as they arrive.
    /// Returns early once the controller stops.
    fn wait_until(&mut self, deadline: Instant) {
        let poll = Duration::from_millis(PAUSE_POLL_MS);
        loop {
            self.drain_commands();
            if self.state == ControllerState::Stopped {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let slice = (deadline - now).min(poll);
            let received = self.commands.as_ref().map(|rx| rx.recv_timeout(slice));
            match received {
                Some(Ok(command)) => self.apply(command),
                Some(Err(RecvTimeoutError::Timeout)) => {}
                Some(Err(RecvTimeoutError::Disconnected)) => self.commands = None,
                None => std::thread::sleep(slice),
            }
        }
    }

    pub fn apply(&mut self, command: ControlCommand) {
        if self.state == ControllerState::Stopped {
            return;
        }
        match command {
            ControlCommand::Quit => {
                log::info!("Quit requested");
                self.summary.stop_reason = StopReason::Quit;
                self.state = ControllerState::Stopped;
            }
            ControlCommand::Pause => self.set_paused(true),
            ControlCommand::Resume => self.set_paused(false),
            ControlCommand::TogglePause => {
                self.set_paused(self.state == ControllerState::Running)
            }
            ControlCommand::SaveScreenshot => self.save_screenshot(),
            ControlCommand::UpdateParams(update) => match self.params.update(&update) {
                Ok(()) => log::info!("Detection parameters updated: {:?}", self.params),
                Err(e) => log::warn!("Rejected parameter update: {e}"),
            },
        }
    }

    fn set_paused(&mut self, paused: bool) {
        let next = if paused {
            ControllerState::Paused
        } else {
            ControllerState::Running
        };
        if self.state != next {
            self.state = next;
            log::info!("{}", if paused { "Paused" } else { "Resumed" });
        }
    }

    fn save_screenshot(&mut self) {
        let Some(frame) = &self.last_annotated else {
            log::warn!("No frame to save yet");
            return;
        };
        let Some(shots) = &mut self.screenshots else {
            log::warn!("Screenshots are not enabled for this run");
            return;
        };
        if let Err(e) = shots.consume(frame) {
            log::warn!("Screenshot failed: {e}");
        }
    }

    /// Enters `Stopped` and releases everything. Only the first call has
    /// any effect.
    pub fn stop(&mut self) {
        self.state = ControllerState::Stopped;
        if self.released {
            return;
        }
        self.released = true;

        self.source.close();
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                log::warn!("{e}");
                self.summary.sink_errors += 1;
            }
        }
        self.summary.log();
        self.logger.summary();
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
