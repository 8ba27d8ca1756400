//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("Pinpoint ({x}, {y}) lies outside the {width}x{height} frame")]
    PointOutsideFrame {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },

    #[error("Video asset is empty: {0}")]
    EmptyAsset(String),
}
