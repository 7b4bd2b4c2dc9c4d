// Template matching-based OCR implementation for fast digit recognition

use super::OcrEngine;
use crate::consts::{DEFAULT_CONFIDENCE_FLOOR, DEFAULT_TIE_TOLERANCE};
use crate::error::RecognitionError;
use crate::preprocess::Mask;
use crate::segment::{Segment, SegmenterConfig, segment};
use crate::templates::TemplateLibrary;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a normalized glyph is scored against a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMetric {
    /// `sum(a*b) / sqrt(sum(a^2) * sum(b^2))`
    #[default]
    CrossCorrelation,
    /// Like cross correlation, after subtracting each image's mean.
    CorrelationCoefficient,
}

impl CorrelationMetric {
    /// Score of two equally sized bitmaps; 0.0 when either is blank.
    pub fn score(self, a: &GrayImage, b: &GrayImage) -> f64 {
        debug_assert_eq!(a.dimensions(), b.dimensions());
        let a = a.as_raw();
        let b = b.as_raw();
        let n = a.len().min(b.len());
        if n == 0 {
            return 0.0;
        }

        let (mean_a, mean_b) = match self {
            CorrelationMetric::CrossCorrelation => (0.0, 0.0),
            CorrelationMetric::CorrelationCoefficient => (
                a.iter().map(|&v| v as f64).sum::<f64>() / n as f64,
                b.iter().map(|&v| v as f64).sum::<f64>() / n as f64,
            ),
        };

        let mut dot = 0.0;
        let mut norm_a = 0.0;
        let mut norm_b = 0.0;
        for (&pa, &pb) in a.iter().zip(b.iter()) {
            let va = pa as f64 - mean_a;
            let vb = pb as f64 - mean_b;
            dot += va * vb;
            norm_a += va * va;
            norm_b += vb * vb;
        }

        let denom = (norm_a * norm_b).sqrt();
        if denom <= f64::EPSILON {
            return 0.0;
        }
        dot / denom
    }
}

/// Configuration for template matching OCR
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Best scores below this are dropped rather than guessed.
    pub confidence_floor: f64,
    /// Scores this close to the best count as a tie, won by the smallest symbol.
    pub tie_tolerance: f64,
    pub metric: CorrelationMetric,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            tie_tolerance: DEFAULT_TIE_TOLERANCE,
            metric: CorrelationMetric::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Match { symbol: char, confidence: f64 },
    /// Best candidate stayed under the confidence floor.
    NoMatch { best: char, confidence: f64 },
}

impl Classification {
    pub fn symbol(&self) -> Option<char> {
        match self {
            Classification::Match { symbol, .. } => Some(*symbol),
            Classification::NoMatch { .. } => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Classification::Match { confidence, .. } | Classification::NoMatch { confidence, .. } => {
                *confidence
            }
        }
    }
}

/// Normalizes a segment and classifies it.
pub fn classify(
    segment: &Segment,
    templates: &TemplateLibrary,
    config: &ClassifierConfig,
) -> Result<Classification, RecognitionError> {
    if templates.is_empty() {
        return Err(RecognitionError::TemplatesUnavailable);
    }
    let glyph = segment.normalized(templates.canonical_size());
    classify_normalized(&glyph, templates, config)
}

/// Classifies a bitmap already in canonical size.
///
/// Every score within the tie tolerance of the maximum counts as a tie,
/// won by the smallest symbol.
pub fn classify_normalized(
    glyph: &GrayImage,
    templates: &TemplateLibrary,
    config: &ClassifierConfig,
) -> Result<Classification, RecognitionError> {
    let scores: Vec<(char, f64)> = templates
        .iter()
        .map(|t| (t.symbol, config.metric.score(glyph, &t.bitmap)))
        .collect();
    let max = scores
        .iter()
        .map(|&(_, score)| score)
        .fold(f64::NEG_INFINITY, f64::max);

    // Library order is ascending by symbol
    let (symbol, confidence) = scores
        .into_iter()
        .find(|&(_, score)| score >= max - config.tie_tolerance)
        .ok_or(RecognitionError::TemplatesUnavailable)?;
    if confidence < config.confidence_floor {
        Ok(Classification::NoMatch {
            best: symbol,
            confidence,
        })
    } else {
        Ok(Classification::Match { symbol, confidence })
    }
}

/// Template matching-based OCR engine for fast digit recognition
pub struct TemplateMatchingOcrEngine {
    templates: Arc<TemplateLibrary>,
    segmenter: SegmenterConfig,
    classifier: ClassifierConfig,
}

impl TemplateMatchingOcrEngine {
    pub fn new(
        templates: Arc<TemplateLibrary>,
        segmenter: SegmenterConfig,
        classifier: ClassifierConfig,
    ) -> Self {
        Self {
            templates,
            segmenter,
            classifier,
        }
    }

    pub fn has_templates(&self) -> bool {
        !self.templates.is_empty()
    }

    pub fn templates(&self) -> &TemplateLibrary {
        &self.templates
    }

    /// Classification of every segment in `mask`, left to right.
    pub fn classify_mask(&self, mask: &Mask) -> Result<Vec<Classification>, RecognitionError> {
        if !self.has_templates() {
            return Err(RecognitionError::TemplatesUnavailable);
        }
        segment(mask, &self.segmenter)
            .iter()
            .map(|s| classify(s, &self.templates, &self.classifier))
            .collect()
    }
}

impl OcrEngine for TemplateMatchingOcrEngine {
    fn name(&self) -> &'static str {
        "template"
    }

    fn recognize(&self, mask: &Mask) -> Result<String, RecognitionError> {
        let classifications = self.classify_mask(mask)?;

        let mut text = String::with_capacity(classifications.len());
        for classification in &classifications {
            match classification {
                Classification::Match { symbol, .. } => text.push(*symbol),
                Classification::NoMatch { best, confidence } => {
                    log::debug!(
                        "Dropping glyph, best '{}' scored {:.3} (floor {:.2})",
                        best,
                        confidence,
                        self.classifier.confidence_floor
                    );
                }
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn stripes(offset: u32) -> GrayImage {
        GrayImage::from_fn(8, 8, |x, _| if (x + offset) % 2 == 0 { Luma([255]) } else { Luma([0]) })
    }

    #[test]
    fn test_identical_images_score_one() {
        let img = stripes(0);
        for metric in [
            CorrelationMetric::CrossCorrelation,
            CorrelationMetric::CorrelationCoefficient,
        ] {
            assert!((metric.score(&img, &img) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_disjoint_images() {
        let a = stripes(0);
        let b = stripes(1);
        assert_eq!(CorrelationMetric::CrossCorrelation.score(&a, &b), 0.0);
        assert!((CorrelationMetric::CorrelationCoefficient.score(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_blank_image_scores_zero() {
        let blank = GrayImage::new(8, 8);
        let a = stripes(0);
        assert_eq!(CorrelationMetric::CrossCorrelation.score(&blank, &a), 0.0);
        assert_eq!(CorrelationMetric::CorrelationCoefficient.score(&a, &GrayImage::from_pixel(8, 8, Luma([9]))), 0.0);
    }

    /// Full-width rows from the top; the digit sets how many.
    struct TopRows;

    impl crate::templates::GlyphRasterizer for TopRows {
        fn name(&self) -> String {
            "top-rows".to_string()
        }

        fn rasterize(&self, symbol: char, _px_size: f32) -> Option<GrayImage> {
            let rows = [20, 25, 29][symbol.to_digit(10)? as usize];
            // The corner pixel keeps the ink box at the full 32x32
            Some(GrayImage::from_fn(32, 32, |x, y| {
                if y < rows || (x, y) == (31, 31) { Luma([255]) } else { Luma([0]) }
            }))
        }
    }

    #[test]
    fn test_tie_measured_against_best_score() {
        let library =
            TemplateLibrary::build(&TopRows, "012", 32.0, crate::segment::CanonicalSize::default()).unwrap();
        let config = ClassifierConfig {
            tie_tolerance: 0.1,
            ..ClassifierConfig::default()
        };
        let probe = GrayImage::from_pixel(32, 32, Luma([255]));

        // Scores are about 0.79, 0.88 and 0.95: only '1' and '2' are within the tolerance of the best
        let result = classify_normalized(&probe, &library, &config).unwrap();
        assert_eq!(result.symbol(), Some('1'));

        let strict = classify_normalized(&probe, &library, &ClassifierConfig::default()).unwrap();
        assert_eq!(strict.symbol(), Some('2'));
    }

    #[test]
    fn test_metric_names_in_config() {
        let config: ClassifierConfig =
            serde_json::from_str(r#"{"metric": "correlation_coefficient"}"#).unwrap();
        assert_eq!(config.metric, CorrelationMetric::CorrelationCoefficient);
        assert_eq!(config.confidence_floor, DEFAULT_CONFIDENCE_FLOOR);
    }
}
