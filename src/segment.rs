// Segmentation of a mask into glyph candidates, and glyph normalization

use crate::consts::{DEFAULT_CANONICAL_SIZE, DEFAULT_MIN_GLYPH_HEIGHT, DEFAULT_MIN_GLYPH_WIDTH};
use crate::preprocess::{BACKGROUND, FOREGROUND, Mask};
use image::{GrayImage, imageops::FilterType, math::Rect};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Components this tall or smaller are noise.
    pub min_glyph_height: u32,
    /// Components this narrow or narrower are noise.
    pub min_glyph_width: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_glyph_height: DEFAULT_MIN_GLYPH_HEIGHT,
            min_glyph_width: DEFAULT_MIN_GLYPH_WIDTH,
        }
    }
}

/// Fixed bitmap size shared by templates and normalized segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanonicalSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANONICAL_SIZE,
            height: DEFAULT_CANONICAL_SIZE,
        }
    }
}

/// One connected foreground blob.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position within the mask it was cut from.
    pub bbox: Rect,
    /// The component's own pixels, cropped to `bbox`.
    pub mask: Mask,
}

impl Segment {
    pub fn normalized(&self, size: CanonicalSize) -> GrayImage {
        normalize_glyph(&self.mask, size)
    }
}

/// Extracts 8-connected foreground components in left-to-right order.
///
/// Touching glyphs stay fused in a single segment.
pub fn segment(mask: &Mask, config: &SegmenterConfig) -> Vec<Segment> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let labels = connected_components(mask, Connectivity::Eight, BACKGROUND);

    // Label -> (min_x, min_y, max_x, max_y)
    let mut bounds: Vec<Option<(u32, u32, u32, u32)>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if bounds.len() <= label {
            bounds.resize(label + 1, None);
        }
        bounds[label] = Some(match bounds[label] {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    let mut segments: Vec<Segment> = bounds
        .iter()
        .enumerate()
        .filter_map(|(label, b)| b.map(|b| (label as u32, b)))
        .filter_map(|(label, (x0, y0, x1, y1))| {
            let bbox = Rect {
                x: x0,
                y: y0,
                width: x1 - x0 + 1,
                height: y1 - y0 + 1,
            };
            if bbox.height <= config.min_glyph_height || bbox.width <= config.min_glyph_width {
                return None;
            }
            let mask = GrayImage::from_fn(bbox.width, bbox.height, |x, y| {
                if labels.get_pixel(bbox.x + x, bbox.y + y).0[0] == label {
                    FOREGROUND
                } else {
                    BACKGROUND
                }
            });
            Some(Segment { bbox, mask })
        })
        .collect();

    segments.sort_by_key(|s| (s.bbox.x, s.bbox.y));
    log::trace!("Segmented {} glyph candidates", segments.len());
    segments
}

/// Bounding box of all non-zero pixels, `None` for a blank image.
pub fn ink_bounds(img: &GrayImage) -> Option<Rect> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| Rect {
        x: x0,
        y: y0,
        width: x1 - x0 + 1,
        height: y1 - y0 + 1,
    })
}

/// Scales a tightly cropped glyph into the canonical size, keeping its
/// aspect ratio, and centers it on a blank canvas.
///
/// Templates and probe segments both go through here so their pixels line
/// up for correlation.
pub fn normalize_glyph(glyph: &GrayImage, size: CanonicalSize) -> GrayImage {
    let mut canvas = GrayImage::new(size.width, size.height);
    let (w, h) = glyph.dimensions();
    if w == 0 || h == 0 || size.width == 0 || size.height == 0 {
        return canvas;
    }

    let scale = (size.height as f32 / h as f32).min(size.width as f32 / w as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size.width);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size.height);

    let resized = image::imageops::resize(glyph, new_w, new_h, FilterType::Triangle);
    let x_off = (size.width - new_w) / 2;
    let y_off = (size.height - new_h) / 2;
    image::imageops::replace(&mut canvas, &resized, x_off as i64, y_off as i64);
    canvas
}
