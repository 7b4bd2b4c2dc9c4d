// Region preprocessing: captured pixels -> binary foreground mask

use crate::consts::{DEFAULT_COLOR_TOLERANCE, DEFAULT_MAX_FOREGROUND_FRACTION};
use crate::frame::FrameBuffer;
use image::{GrayImage, Luma, Rgb};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use serde::{Deserialize, Serialize};

/// Binary image: 255 marks symbol pixels, 0 marks background.
pub type Mask = GrayImage;

pub const FOREGROUND: Luma<u8> = Luma([255]);
pub const BACKGROUND: Luma<u8> = Luma([0]);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Accepted distance per channel around the expected color.
    pub color_tolerance: u8,
    /// Adaptive masks with a larger foreground share get inverted.
    pub max_foreground_fraction: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            color_tolerance: DEFAULT_COLOR_TOLERANCE,
            max_foreground_fraction: DEFAULT_MAX_FOREGROUND_FRACTION,
        }
    }
}

/// Turns a captured region into a mask with the text as foreground.
///
/// With an expected color the mask is a color key, otherwise the frame is
/// thresholded with Otsu's method and its polarity normalized.
pub fn preprocess(frame: &FrameBuffer, expected_color: Option<Rgb<u8>>, config: &PreprocessConfig) -> Mask {
    match expected_color {
        Some(color) => color_key_mask(frame, color, config.color_tolerance),
        None => adaptive_mask(frame, config.max_foreground_fraction),
    }
}

/// Marks every pixel whose color channels all lie within `tolerance` of `color`.
///
/// The band is clamped to 0..=255 and inclusive on both ends. Comparison
/// happens in the frame's own channel order.
pub fn color_key_mask(frame: &FrameBuffer, color: Rgb<u8>, tolerance: u8) -> Mask {
    let target = frame.order.arrange(color);
    let lower = target.map(|c| c.saturating_sub(tolerance));
    let upper = target.map(|c| c.saturating_add(tolerance));

    let data = frame
        .color_channels()
        .map(|px| {
            let inside = (0..3).all(|i| px[i] >= lower[i] && px[i] <= upper[i]);
            if inside { FOREGROUND.0[0] } else { BACKGROUND.0[0] }
        })
        .collect();

    Mask::from_raw(frame.width, frame.height, data)
        .unwrap_or_else(|| Mask::new(frame.width, frame.height))
}

/// Grayscale + Otsu threshold, then polarity correction.
pub fn adaptive_mask(frame: &FrameBuffer, max_foreground_fraction: f32) -> Mask {
    if frame.is_empty() {
        return Mask::new(frame.width, frame.height);
    }

    let gray = image::imageops::grayscale(&frame.to_rgb_image());

    // A uniform region has nothing to separate
    let first = gray.as_raw()[0];
    if gray.as_raw().iter().all(|&p| p == first) {
        return Mask::new(frame.width, frame.height);
    }

    let level = otsu_level(&gray);
    let mask = threshold(&gray, level, ThresholdType::Binary);
    normalize_polarity(mask, max_foreground_fraction)
}

/// Share of foreground pixels in a mask, 0.0 for an empty mask.
pub fn foreground_fraction(mask: &Mask) -> f32 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let foreground = mask.as_raw().iter().filter(|&&p| p > 0).count();
    foreground as f32 / total as f32
}

/// Inverts a mask whose foreground fraction exceeds `max_foreground_fraction`.
///
/// Applying it to its own output never flips again.
pub fn normalize_polarity(mut mask: Mask, max_foreground_fraction: f32) -> Mask {
    if foreground_fraction(&mask) > max_foreground_fraction {
        image::imageops::invert(&mut mask);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;
    use image::{Rgba, RgbaImage};

    fn frame_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> FrameBuffer {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            let [r, g, b] = f(x, y);
            Rgba([r, g, b, 255])
        });
        FrameBuffer::from_rgba(img)
    }

    #[test]
    fn test_color_key_exact_color_is_foreground() {
        let color = Rgb([247, 253, 255]);
        let frame = frame_from_fn(4, 1, |x, _| match x {
            0 => [247, 253, 255],
            1 => [200, 200, 200],
            2 => [100, 100, 100],
            _ => [250, 230, 240],
        });
        let mask = color_key_mask(&frame, color, 40);
        assert_eq!(mask.get_pixel(0, 0), &FOREGROUND);
        // Every channel more than 40 away
        assert_eq!(mask.get_pixel(2, 0), &BACKGROUND);
        // Within band on every channel
        assert_eq!(mask.get_pixel(3, 0), &FOREGROUND);
        // Red channel 47 away
        assert_eq!(mask.get_pixel(1, 0), &BACKGROUND);
    }

    #[test]
    fn test_color_key_respects_bgra_order() {
        // Pixel stored as B=174 G=244 R=255 is the color (255, 244, 174)
        let frame =
            FrameBuffer::new(2, 1, ChannelOrder::Bgra, vec![174, 244, 255, 0, 255, 244, 174, 0])
                .unwrap();
        let mask = color_key_mask(&frame, Rgb([255, 244, 174]), 10);
        assert_eq!(mask.get_pixel(0, 0), &FOREGROUND);
        assert_eq!(mask.get_pixel(1, 0), &BACKGROUND);
    }

    #[test]
    fn test_adaptive_dark_text_on_light_background_is_inverted() {
        // Dark stripe on a bright background
        let frame = frame_from_fn(10, 10, |x, _| if x == 4 { [10, 10, 10] } else { [240, 240, 240] });
        let mask = adaptive_mask(&frame, 0.5);
        assert_eq!(mask.get_pixel(4, 5), &FOREGROUND);
        assert_eq!(mask.get_pixel(0, 0), &BACKGROUND);
    }

    #[test]
    fn test_adaptive_bright_text_on_dark_background_kept() {
        let frame = frame_from_fn(10, 10, |x, _| if x == 4 { [250, 250, 250] } else { [20, 20, 20] });
        let mask = adaptive_mask(&frame, 0.5);
        assert_eq!(mask.get_pixel(4, 5), &FOREGROUND);
        assert_eq!(mask.get_pixel(9, 9), &BACKGROUND);
    }

    #[test]
    fn test_uniform_region_is_all_background() {
        let frame = frame_from_fn(8, 8, |_, _| [128, 128, 128]);
        let mask = preprocess(&frame, None, &PreprocessConfig::default());
        assert_eq!(foreground_fraction(&mask), 0.0);

        let empty = FrameBuffer::new(0, 0, ChannelOrder::Rgba, Vec::new()).unwrap();
        let mask = preprocess(&empty, None, &PreprocessConfig::default());
        assert_eq!(mask.dimensions(), (0, 0));
    }

    #[test]
    fn test_polarity_correction_is_single_shot() {
        let mut mask = Mask::new(10, 10);
        for (i, p) in mask.pixels_mut().enumerate() {
            if i < 70 {
                *p = FOREGROUND;
            }
        }
        assert!(foreground_fraction(&mask) > 0.5);

        let once = normalize_polarity(mask, 0.5);
        assert!((foreground_fraction(&once) - 0.3).abs() < 1e-6);

        let twice = normalize_polarity(once.clone(), 0.5);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_half_foreground_is_not_flipped() {
        let mask = Mask::from_fn(10, 10, |x, _| if x < 5 { FOREGROUND } else { BACKGROUND });
        let out = normalize_polarity(mask.clone(), 0.5);
        assert_eq!(out, mask);
    }
}
