// OCR Engine Traits and Implementations

use crate::error::RecognitionError;
use crate::preprocess::Mask;

pub mod fallback_ocr;
pub mod tesseract_ocr;
pub mod template_matching_ocr;

/// Reads the digits shown in one preprocessed region.
pub trait OcrEngine: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Recognized text of `mask`, left to right; empty if nothing was read.
    fn recognize(&self, mask: &Mask) -> Result<String, RecognitionError>;
}

/// A generic, font-agnostic OCR backend.
///
/// Its output is unconstrained: callers filter it down to the whitelist.
pub trait TextRecognizer: Send + Sync {
    fn read_text(&self, mask: &Mask, whitelist: &str) -> Result<String, RecognitionError>;
}

/// Keeps only whitelisted characters, in order.
pub fn filter_whitelist(text: &str, whitelist: &str) -> String {
    text.chars().filter(|c| whitelist.contains(*c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_whitelist() {
        assert_eq!(filter_whitelist(" 4 2\n", "0123456789."), "42");
        assert_eq!(filter_whitelist("1,234.5|", "0123456789."), "1234.5");
        assert_eq!(filter_whitelist("abc", "0123456789."), "");
    }
}
