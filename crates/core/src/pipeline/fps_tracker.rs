use std::time::{Duration, Instant};

use crate::shared::constants::FPS_WINDOW_SECS;

/// Frames-per-second measured over a tumbling window.
///
/// The reported value is recomputed once the window has accumulated at
/// least [`FPS_WINDOW_SECS`], so it may lag the true rate by up to one window.
#[derive(Debug, Clone)]
pub struct FpsTracker {
    window_start: Instant,
    frames_in_window: u32,
    last_fps: f64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            window_start: start,
            frames_in_window: 0,
            last_fps: 0.0,
        }
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f64 {
        self.frames_in_window += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs_f64(FPS_WINDOW_SECS) {
            self.last_fps = f64::from(self.frames_in_window) / elapsed.as_secs_f64();
            self.frames_in_window = 0;
            self.window_start = now;
        }
        self.last_fps
    }

    pub fn fps(&self) -> f64 {
        self.last_fps
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}
