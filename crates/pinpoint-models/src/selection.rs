//! Pinpoint selection on a video frame.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Pixel coordinates picked on a source frame of known size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "RawSelection")]
pub struct PinpointSelection {
    x: f64,
    y: f64,
    frame_width: u32,
    frame_height: u32,
}

#[derive(Deserialize)]
struct RawSelection {
    x: f64,
    y: f64,
    frame_width: u32,
    frame_height: u32,
}

impl TryFrom<RawSelection> for PinpointSelection {
    type Error = ModelError;

    fn try_from(raw: RawSelection) -> ModelResult<Self> {
        Self::new(raw.x, raw.y, raw.frame_width, raw.frame_height)
    }
}

/// A resolution-independent point with both axes in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl PinpointSelection {
    /// Create a selection, rejecting empty frames and points outside the frame.
    pub fn new(x: f64, y: f64, frame_width: u32, frame_height: u32) -> ModelResult<Self> {
        if frame_width == 0 || frame_height == 0 {
            return Err(ModelError::InvalidFrameSize {
                width: frame_width,
                height: frame_height,
            });
        }

        let inside = x.is_finite()
            && y.is_finite()
            && (0.0..=frame_width as f64).contains(&x)
            && (0.0..=frame_height as f64).contains(&y);
        if !inside {
            return Err(ModelError::PointOutsideFrame {
                x,
                y,
                width: frame_width,
                height: frame_height,
            });
        }

        Ok(Self {
            x,
            y,
            frame_width,
            frame_height,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    /// Pixel coordinates divided by the frame dimensions.
    pub fn normalized(&self) -> NormalizedPoint {
        NormalizedPoint {
            x: (self.x / self.frame_width as f64).clamp(0.0, 1.0),
            y: (self.y / self.frame_height as f64).clamp(0.0, 1.0),
        }
    }
}

impl NormalizedPoint {
    /// Wire form of the x coordinate (four decimal places).
    pub fn x_field(&self) -> String {
        format_coordinate(self.x)
    }

    /// Wire form of the y coordinate (four decimal places).
    pub fn y_field(&self) -> String {
        format_coordinate(self.y)
    }
}

fn format_coordinate(value: f64) -> String {
    format!("{:.4}", value)
}
