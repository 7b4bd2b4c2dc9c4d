// Template library: canonical glyph bitmaps rasterized from a font

use crate::consts::{DEFAULT_RENDER_SIZE, DEFAULT_SYMBOLS};
use crate::error::RecognitionError;
use crate::segment::{CanonicalSize, ink_bounds, normalize_glyph};
use ab_glyph::{Font, FontVec, PxScale};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Where templates come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub path: PathBuf,
    /// Pixel size glyphs are rendered at before normalization.
    pub render_size: f32,
    pub symbols: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Bourgeois-Book.otf"),
            render_size: DEFAULT_RENDER_SIZE,
            symbols: DEFAULT_SYMBOLS.to_string(),
        }
    }
}

/// Renders single symbols as grayscale coverage bitmaps.
pub trait GlyphRasterizer {
    /// Human readable origin, recorded on every template.
    fn name(&self) -> String;

    /// Coverage bitmap of `symbol` at `px_size`; `None` if the symbol is unsupported.
    fn rasterize(&self, symbol: char, px_size: f32) -> Option<GrayImage>;
}

/// TrueType / OpenType rasterizer backed by `ab_glyph`.
pub struct FontRasterizer {
    font: FontVec,
    name: String,
}

impl FontRasterizer {
    pub fn open(path: &Path) -> Result<Self, RecognitionError> {
        let data = std::fs::read(path).map_err(|e| {
            RecognitionError::TemplateUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(data, path.display().to_string())
    }

    pub fn from_bytes(data: Vec<u8>, name: String) -> Result<Self, RecognitionError> {
        let font = FontVec::try_from_vec(data).map_err(|e| {
            RecognitionError::TemplateUnavailable(format!("cannot parse font {}: {}", name, e))
        })?;
        Ok(Self { font, name })
    }
}

impl GlyphRasterizer for FontRasterizer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn rasterize(&self, symbol: char, px_size: f32) -> Option<GrayImage> {
        let id = self.font.glyph_id(symbol);
        if id.0 == 0 {
            return None;
        }
        let outlined = self.font.outline_glyph(id.with_scale(PxScale::from(px_size)))?;
        let bounds = outlined.px_bounds();
        let width = bounds.width().ceil() as u32;
        let height = bounds.height().ceil() as u32;
        if width == 0 || height == 0 {
            return None;
        }

        let mut img = GrayImage::new(width, height);
        outlined.draw(|x, y, coverage| {
            if x < width && y < height {
                let value = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                img.put_pixel(x, y, Luma([value]));
            }
        });
        Some(img)
    }
}

/// Provenance of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOrigin {
    pub source: String,
    pub px_size: f32,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub symbol: char,
    /// Canonical-size grayscale bitmap.
    pub bitmap: GrayImage,
    pub origin: TemplateOrigin,
}

/// Immutable symbol -> template mapping, ordered by symbol.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    templates: BTreeMap<char, Template>,
    canonical_size: CanonicalSize,
}

impl TemplateLibrary {
    pub fn empty(canonical_size: CanonicalSize) -> Self {
        Self {
            templates: BTreeMap::new(),
            canonical_size,
        }
    }

    /// Renders every symbol, crops it to its ink and normalizes it.
    ///
    /// Unsupported or blank symbols are skipped; if none survive the
    /// library is unavailable.
    pub fn build(
        rasterizer: &dyn GlyphRasterizer,
        symbols: &str,
        render_size: f32,
        canonical_size: CanonicalSize,
    ) -> Result<Self, RecognitionError> {
        let source = rasterizer.name();
        let mut templates = BTreeMap::new();

        for symbol in symbols.chars() {
            let Some(bitmap) = rasterizer
                .rasterize(symbol, render_size)
                .and_then(|raster| crop_to_ink(&raster))
                .map(|glyph| normalize_glyph(&glyph, canonical_size))
            else {
                log::warn!("No glyph for '{}' in {}, skipping", symbol, source);
                continue;
            };

            templates.insert(
                symbol,
                Template {
                    symbol,
                    bitmap,
                    origin: TemplateOrigin {
                        source: source.clone(),
                        px_size: render_size,
                    },
                },
            );
        }

        if templates.is_empty() {
            return Err(RecognitionError::TemplateUnavailable(format!(
                "{} rendered none of \"{}\"",
                source, symbols
            )));
        }

        log::info!(
            "Built {} templates from {} at {}px",
            templates.len(),
            source,
            render_size
        );
        Ok(Self {
            templates,
            canonical_size,
        })
    }

    pub fn from_font(font: &FontConfig, canonical_size: CanonicalSize) -> Result<Self, RecognitionError> {
        let rasterizer = FontRasterizer::open(&font.path)?;
        Self::build(&rasterizer, &font.symbols, font.render_size, canonical_size)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn canonical_size(&self) -> CanonicalSize {
        self.canonical_size
    }

    pub fn get(&self, symbol: char) -> Option<&Template> {
        self.templates.get(&symbol)
    }

    /// Templates in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Writes every bitmap to `dir` as `template_<symbol>.png`, `.` as `dot`.
    pub fn save_to(&self, dir: &Path) -> anyhow::Result<usize> {
        std::fs::create_dir_all(dir)?;
        for template in self.iter() {
            let name = match template.symbol {
                '.' => "dot".to_string(),
                c => c.to_string(),
            };
            template.bitmap.save(dir.join(format!("template_{}.png", name)))?;
        }
        log::debug!("Saved {} templates to {}", self.len(), dir.display());
        Ok(self.len())
    }
}

/// Crops a raster to the bounding box of its non-zero pixels.
pub fn crop_to_ink(raster: &GrayImage) -> Option<GrayImage> {
    let ink = ink_bounds(raster)?;
    Some(image::imageops::crop_imm(raster, ink.x, ink.y, ink.width, ink.height).to_image())
}

/// Build-once holder for a template library.
///
/// Only successful builds are cached; a failed build hands out an empty
/// library and is retried on the next request.
pub struct TemplateCache {
    slot: RwLock<Option<Arc<TemplateLibrary>>>,
}

impl TemplateCache {
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// The process-wide cache.
    pub fn global() -> &'static TemplateCache {
        static GLOBAL: TemplateCache = TemplateCache::new();
        &GLOBAL
    }

    pub fn get_or_build<F>(&self, canonical_size: CanonicalSize, build: F) -> Arc<TemplateLibrary>
    where
        F: FnOnce() -> Result<TemplateLibrary, RecognitionError>,
    {
        if let Some(library) = self.slot.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return library.clone();
        }

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(library) = slot.as_ref() {
            return library.clone();
        }

        match build() {
            Ok(library) => {
                let library = Arc::new(library);
                *slot = Some(library.clone());
                library
            }
            Err(e) => {
                log::warn!("{}; falling back to generic OCR", e);
                Arc::new(TemplateLibrary::empty(canonical_size))
            }
        }
    }

    pub fn load_font(&self, font: &FontConfig, canonical_size: CanonicalSize) -> Arc<TemplateLibrary> {
        self.get_or_build(canonical_size, || TemplateLibrary::from_font(font, canonical_size))
    }

    pub fn invalidate(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_built(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Solid bars whose width depends on the symbol.
    struct Bars;

    impl GlyphRasterizer for Bars {
        fn name(&self) -> String {
            "bars".to_string()
        }

        fn rasterize(&self, symbol: char, px_size: f32) -> Option<GrayImage> {
            let width = symbol.to_digit(10)? + 2;
            let size = px_size as u32;
            Some(GrayImage::from_fn(size, size, |x, y| {
                if (4..4 + width).contains(&x) && (2..size - 2).contains(&y) {
                    Luma([255])
                } else {
                    Luma([0])
                }
            }))
        }
    }

    #[test]
    fn test_build_skips_unsupported_symbols() {
        let library = TemplateLibrary::build(&Bars, "01.", 40.0, CanonicalSize::default()).unwrap();
        assert_eq!(library.len(), 2);
        assert!(library.get('.').is_none());
        let template = library.get('1').unwrap();
        assert_eq!(template.bitmap.dimensions(), (32, 32));
        assert_eq!(template.origin.source, "bars");
    }

    #[test]
    fn test_build_without_glyphs_is_unavailable() {
        let result = TemplateLibrary::build(&Bars, ".", 40.0, CanonicalSize::default());
        assert!(matches!(result, Err(RecognitionError::TemplateUnavailable(_))));
    }

    #[test]
    fn test_missing_font_is_unavailable() {
        let font = FontConfig {
            path: PathBuf::from("/nonexistent/font.otf"),
            ..FontConfig::default()
        };
        let result = TemplateLibrary::from_font(&font, CanonicalSize::default());
        assert!(matches!(result, Err(RecognitionError::TemplateUnavailable(_))));
    }

    #[test]
    fn test_save_to_writes_one_png_per_template() {
        let dir = tempfile::tempdir().unwrap();
        let library = TemplateLibrary::build(&Bars, "019", 40.0, CanonicalSize::default()).unwrap();
        assert_eq!(library.save_to(&dir.path().join("templates")).unwrap(), 3);

        let saved = image::open(dir.path().join("templates/template_9.png")).unwrap().to_luma8();
        assert_eq!(saved, library.get('9').unwrap().bitmap);
        assert!(!dir.path().join("templates/template_dot.png").exists());
    }

    #[test]
    fn test_cache_builds_once() {
        let cache = TemplateCache::new();
        let calls = Cell::new(0);
        let build = || {
            calls.set(calls.get() + 1);
            TemplateLibrary::build(&Bars, "0123", 40.0, CanonicalSize::default())
        };
        let first = cache.get_or_build(CanonicalSize::default(), build);
        let second = cache.get_or_build(CanonicalSize::default(), || unreachable!());
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate();
        assert!(!cache.is_built());
    }

    #[test]
    fn test_cache_does_not_keep_failures() {
        let cache = TemplateCache::new();
        let failed = cache.get_or_build(CanonicalSize::default(), || {
            Err(RecognitionError::TemplateUnavailable("missing".into()))
        });
        assert!(failed.is_empty());
        assert!(!cache.is_built());

        let built = cache.get_or_build(CanonicalSize::default(), || {
            TemplateLibrary::build(&Bars, "7", 40.0, CanonicalSize::default())
        });
        assert_eq!(built.len(), 1);
    }
}
