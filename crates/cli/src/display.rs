use minifb::{Key, KeyRepeat, Window, WindowOptions};

use facescope_core::pipeline::control::ControlCommand;
use facescope_core::pipeline::frame_sink::DisplaySurface;
use facescope_core::shared::frame::Frame;

/// Native window showing annotated frames. Keys: `Q`/`Esc` quit, `P` pause,
/// `S` screenshot. Closing the window quits.
///
/// The window is created on the first frame so it matches the source size.
pub struct WindowSurface {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    /// Events were already pumped by the last `show`.
    pumped: bool,
}

impl WindowSurface {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            window: None,
            buffer: Vec::new(),
            width: 0,
            height: 0,
            pumped: false,
        }
    }

    fn ensure_window(
        &mut self,
        width: usize,
        height: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if self.window.is_none() || self.width != width || self.height != height {
            let mut window = Window::new(
                &self.title,
                width,
                height,
                WindowOptions {
                    resize: true,
                    ..WindowOptions::default()
                },
            )
            .map_err(|e| format!("failed to create window: {e}"))?;
            window.set_target_fps(60);
            self.window = Some(window);
            self.width = width;
            self.height = height;
            self.buffer = vec![0; width * height];
        }
        Ok(())
    }
}

fn key_command(key: Key) -> Option<ControlCommand> {
    match key {
        Key::Q | Key::Escape => Some(ControlCommand::Quit),
        Key::P => Some(ControlCommand::TogglePause),
        Key::S => Some(ControlCommand::SaveScreenshot),
        _ => None,
    }
}

impl DisplaySurface for WindowSurface {
    fn show(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        self.ensure_window(w, h)?;
        for (dst, px) in self.buffer.iter_mut().zip(frame.data().chunks_exact(3)) {
            *dst = (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]);
        }
        let Some(window) = self.window.as_mut() else {
            return Err("window unavailable".into());
        };
        window.update_with_buffer(&self.buffer, w, h)?;
        self.pumped = true;
        Ok(())
    }

    fn poll_commands(&mut self) -> Vec<ControlCommand> {
        let Some(window) = self.window.as_mut() else {
            return Vec::new();
        };
        if !self.pumped {
            window.update();
        }
        self.pumped = false;

        if !window.is_open() {
            return vec![ControlCommand::Quit];
        }
        window
            .get_keys_pressed(KeyRepeat::No)
            .into_iter()
            .filter_map(key_command)
            .collect()
    }

    fn close(&mut self) {
        self.window = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(key_command(Key::Q), Some(ControlCommand::Quit));
        assert_eq!(key_command(Key::Escape), Some(ControlCommand::Quit));
        assert_eq!(key_command(Key::P), Some(ControlCommand::TogglePause));
        assert_eq!(key_command(Key::S), Some(ControlCommand::SaveScreenshot));
        assert_eq!(key_command(Key::A), None);
    }

    #[test]
    fn test_poll_without_window_is_empty() {
        let mut surface = WindowSurface::new("test");
        assert!(surface.poll_commands().is_empty());
        surface.close();
    }
}
