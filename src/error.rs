// Failure taxonomy of the recognition pipeline

use image::math::Rect;
use thiserror::Error;

/// Everything that can go wrong while reading one region.
///
/// None of these is fatal to a table pass: the scanner logs them and
/// leaves the affected cell empty.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The font could not be loaded or produced no usable glyph.
    #[error("templates unavailable: {0}")]
    TemplateUnavailable(String),

    /// The classifier was handed an empty template library.
    #[error("no templates loaded, classification impossible")]
    TemplatesUnavailable,

    /// The generic OCR backend could not be located.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The generic OCR backend ran but did not produce a result.
    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("capture of {}x{} at ({}, {}) failed: {reason}", rect.width, rect.height, rect.x, rect.y)]
    CaptureFailure { rect: Rect, reason: String },

    #[error("invalid region ({x1}, {y1})-({x2}, {y2}): {reason}")]
    InvalidRegion {
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        reason: &'static str,
    },
}

impl RecognitionError {
    pub fn capture(rect: Rect, reason: impl ToString) -> Self {
        Self::CaptureFailure {
            rect,
            reason: reason.to_string(),
        }
    }
}
