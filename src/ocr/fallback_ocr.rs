// Strategy selection between template matching and the generic OCR fallback

use super::template_matching_ocr::TemplateMatchingOcrEngine;
use super::{OcrEngine, TextRecognizer, filter_whitelist};
use crate::error::RecognitionError;
use crate::preprocess::Mask;

/// Generic OCR restricted to a character whitelist.
pub struct GenericOcrEngine {
    backend: Box<dyn TextRecognizer>,
    whitelist: String,
}

impl GenericOcrEngine {
    pub fn new(backend: Box<dyn TextRecognizer>, whitelist: impl Into<String>) -> Self {
        Self {
            backend,
            whitelist: whitelist.into(),
        }
    }
}

impl OcrEngine for GenericOcrEngine {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn recognize(&self, mask: &Mask) -> Result<String, RecognitionError> {
        let raw = self.backend.read_text(mask, &self.whitelist)?;
        let text = filter_whitelist(&raw, &self.whitelist);
        if text.len() != raw.trim().len() {
            log::debug!("Generic OCR '{}' filtered to '{}'", raw.trim(), text);
        }
        Ok(text)
    }
}

/// Template matching when templates exist, generic OCR for the whole region otherwise.
pub struct FallbackOcrEngine {
    primary: TemplateMatchingOcrEngine,
    fallback: GenericOcrEngine,
}

impl FallbackOcrEngine {
    pub fn new(primary: TemplateMatchingOcrEngine, fallback: GenericOcrEngine) -> Self {
        Self { primary, fallback }
    }

    /// The strategy a region is read with.
    pub fn select(&self) -> &dyn OcrEngine {
        if self.primary.has_templates() {
            &self.primary
        } else {
            &self.fallback
        }
    }

    pub fn primary(&self) -> &TemplateMatchingOcrEngine {
        &self.primary
    }
}

impl OcrEngine for FallbackOcrEngine {
    fn name(&self) -> &'static str {
        self.select().name()
    }

    fn recognize(&self, mask: &Mask) -> Result<String, RecognitionError> {
        self.select().recognize(mask)
    }
}
