use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in source-frame pixels, top-left origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Maps a rect detected on a resized frame back to the source frame.
    pub fn scaled(&self, factor: f64) -> Rect {
        Rect {
            x: (self.x as f64 * factor).round() as i32,
            y: (self.y as f64 * factor).round() as i32,
            width: (self.width as f64 * factor).round() as i32,
            height: (self.height as f64 * factor).round() as i32,
        }
    }

    /// Clips to `[0, width) x [0, height)`, never producing negative sizes.
    pub fn clamped(&self, width: u32, height: u32) -> Rect {
        let x = self.x.clamp(0, width as i32);
        let y = self.y.clamp(0, height as i32);
        let right = self.right().clamp(x, width as i32);
        let bottom = self.bottom().clamp(y, height as i32);
        Rect {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}
