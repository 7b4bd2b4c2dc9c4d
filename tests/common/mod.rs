#![allow(dead_code)]

use image::{GrayImage, Luma, Rgba, RgbaImage};
use stat_reader::{
    segment::CanonicalSize,
    templates::{GlyphRasterizer, TemplateLibrary},
};

pub const GLYPH_PX: f32 = 40.0;
pub const TEXT_COLOR: Rgba<u8> = Rgba([247, 253, 255, 255]);
pub const BACKGROUND_COLOR: Rgba<u8> = Rgba([20, 30, 60, 255]);

/// Seven-segment digits with overlapping strokes, so every digit is one
/// 8-connected blob. Anything but `0`-`9` is unsupported.
pub struct SevenSegment;

const SEGMENTS: [&str; 10] = [
    "abcdef", "bc", "abdeg", "abcdg", "bcfg", "acdfg", "acdefg", "abc", "abcdefg", "abcdfg",
];

impl SevenSegment {
    fn ink(digit: u32, px: u32) -> impl Fn(u32, u32) -> bool {
        let h = px;
        let w = h / 2;
        let t = (h / 8).max(2);
        let segments = SEGMENTS[digit as usize];
        let mid_top = (h - t) / 2;
        let mid_bottom = (h + t) / 2;

        move |x, y| {
            segments.chars().any(|s| {
                let (x0, y0, x1, y1) = match s {
                    'a' => (0, 0, w, t),
                    'b' => (w - t, 0, w, mid_bottom),
                    'c' => (w - t, mid_top, w, h),
                    'd' => (0, h - t, w, h),
                    'e' => (0, mid_top, t, h),
                    'f' => (0, 0, t, mid_bottom),
                    _ => (0, mid_top, w, mid_bottom),
                };
                (x0..x1).contains(&x) && (y0..y1).contains(&y)
            })
        }
    }

    pub fn glyph_width(px: f32) -> u32 {
        px as u32 / 2
    }
}

impl GlyphRasterizer for SevenSegment {
    fn name(&self) -> String {
        "seven-segment".to_string()
    }

    fn rasterize(&self, symbol: char, px_size: f32) -> Option<GrayImage> {
        let digit = symbol.to_digit(10)?;
        let px = px_size as u32;
        let ink = Self::ink(digit, px);
        // Two pixels of margin around the glyph box
        Some(GrayImage::from_fn(px / 2 + 4, px + 4, |x, y| {
            let inside = x >= 2 && y >= 2 && ink(x - 2, y - 2);
            if inside { Luma([255]) } else { Luma([0]) }
        }))
    }
}

pub fn seven_segment_library() -> TemplateLibrary {
    TemplateLibrary::build(&SevenSegment, "0123456789.", GLYPH_PX, CanonicalSize::default())
        .expect("seven-segment templates")
}

pub fn screen(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BACKGROUND_COLOR)
}

/// Draws `text` with its top-left corner at (`x`, `y`), glyphs separated by a gap.
pub fn draw_digits(img: &mut RgbaImage, text: &str, x: u32, y: u32, px: f32, color: Rgba<u8>) {
    let advance = SevenSegment::glyph_width(px) + (px as u32 / 4);
    for (i, c) in text.chars().enumerate() {
        let Some(digit) = c.to_digit(10) else {
            continue;
        };
        let ink = SevenSegment::ink(digit, px as u32);
        let left = x + i as u32 * advance;
        for gy in 0..px as u32 {
            for gx in 0..SevenSegment::glyph_width(px) {
                if ink(gx, gy) {
                    img.put_pixel(left + gx, y + gy, color);
                }
            }
        }
    }
}

/// Binary mask of a coverage raster, any coverage counting as ink, with a blank margin around it.
pub fn raster_mask(raster: &GrayImage, margin: u32) -> GrayImage {
    let (w, h) = raster.dimensions();
    let mut mask = GrayImage::new(w + 2 * margin, h + 2 * margin);
    for (x, y, p) in raster.enumerate_pixels() {
        if p.0[0] > 0 {
            mask.put_pixel(x + margin, y + margin, Luma([255]));
        }
    }
    mask
}
