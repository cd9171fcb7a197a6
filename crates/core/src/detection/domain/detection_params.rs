use serde::{Deserialize, Deserializer, Serialize};

use crate::shared::error::PipelineError;
use crate::shared::rect::Rect;

/// Tunable detection settings shared by every frame of one run or session.
///
/// Fields are private so that every mutation goes through [`DetectionParams::update`],
/// which validates the whole candidate before committing it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectionParams {
    scale_factor: f64,
    min_neighbors: i32,
    min_size: (i32, i32),
    max_size: Option<(i32, i32)>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (30, 30),
            max_size: None,
        }
    }
}

/// Partial parameter change. Absent fields keep their current value;
/// `max_size: Some(None)` removes the upper bound.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsUpdate {
    #[serde(default, alias = "scale_factor")]
    pub scale_factor: Option<f64>,
    #[serde(default, alias = "min_neighbors")]
    pub min_neighbors: Option<i32>,
    #[serde(default, alias = "min_size")]
    pub min_size: Option<(i32, i32)>,
    #[serde(default, alias = "max_size", deserialize_with = "present_or_null")]
    pub max_size: Option<Option<(i32, i32)>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`).
fn present_or_null<'de, D>(
    deserializer: D,
) -> Result<Option<Option<(i32, i32)>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<(i32, i32)>::deserialize(deserializer).map(Some)
}

impl ParamsUpdate {
    pub fn is_empty(&self) -> bool {
        self.scale_factor.is_none()
            && self.min_neighbors.is_none()
            && self.min_size.is_none()
            && self.max_size.is_none()
    }
}

impl DetectionParams {
    pub fn new(
        scale_factor: f64,
        min_neighbors: i32,
        min_size: (i32, i32),
        max_size: Option<(i32, i32)>,
    ) -> Result<Self, PipelineError> {
        let params = Self {
            scale_factor,
            min_neighbors,
            min_size,
            max_size,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn min_neighbors(&self) -> i32 {
        self.min_neighbors
    }

    pub fn min_size(&self) -> (i32, i32) {
        self.min_size
    }

    pub fn max_size(&self) -> Option<(i32, i32)> {
        self.max_size
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "scale factor must be greater than 1.0, got {}",
                self.scale_factor
            )));
        }
        if self.min_neighbors < 0 {
            return Err(PipelineError::InvalidParameter(format!(
                "min neighbors must be non-negative, got {}",
                self.min_neighbors
            )));
        }
        let (min_w, min_h) = self.min_size;
        if min_w < 0 || min_h < 0 {
            return Err(PipelineError::InvalidParameter(format!(
                "min size must be non-negative, got {min_w}x{min_h}"
            )));
        }
        if let Some((max_w, max_h)) = self.max_size {
            if max_w < 0 || max_h < 0 {
                return Err(PipelineError::InvalidParameter(format!(
                    "max size must be non-negative, got {max_w}x{max_h}"
                )));
            }
            if max_w < min_w || max_h < min_h {
                return Err(PipelineError::InvalidParameter(format!(
                    "max size {max_w}x{max_h} is smaller than min size {min_w}x{min_h}"
                )));
            }
        }
        Ok(())
    }

    /// Applies `update` as a whole or not at all.
    pub fn update(&mut self, update: &ParamsUpdate) -> Result<(), PipelineError> {
        let mut candidate = *self;
        if let Some(scale_factor) = update.scale_factor {
            candidate.scale_factor = scale_factor;
        }
        if let Some(min_neighbors) = update.min_neighbors {
            candidate.min_neighbors = min_neighbors;
        }
        if let Some(min_size) = update.min_size {
            candidate.min_size = min_size;
        }
        if let Some(max_size) = update.max_size {
            candidate.max_size = max_size;
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Whether a detection falls inside the configured size bounds.
    pub fn admits(&self, rect: &Rect) -> bool {
        let (min_w, min_h) = self.min_size;
        if rect.width < min_w || rect.height < min_h {
            return false;
        }
        match self.max_size {
            Some((max_w, max_h)) => rect.width <= max_w && rect.height <= max_h,
            None => true,
        }
    }
}
