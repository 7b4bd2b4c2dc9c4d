// Frame sources: where region pixels come from

use crate::error::RecognitionError;
use image::{GenericImageView, Rgb, RgbImage, RgbaImage, math::Rect};
use std::path::Path;

/// Channel layout of a captured pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
    Rgb,
    Bgr,
}

impl ChannelOrder {
    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::Rgba | ChannelOrder::Bgra => 4,
            ChannelOrder::Rgb | ChannelOrder::Bgr => 3,
        }
    }

    /// Lays out an RGB color the way this order stores it (alpha excluded).
    pub fn arrange(self, color: Rgb<u8>) -> [u8; 3] {
        let [r, g, b] = color.0;
        match self {
            ChannelOrder::Rgba | ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgra | ChannelOrder::Bgr => [b, g, r],
        }
    }
}

/// Raw pixels of one captured rectangle.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * order.channels() {
            return None;
        }
        Some(Self {
            width,
            height,
            order,
            data,
        })
    }

    pub fn from_rgba(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            order: ChannelOrder::Rgba,
            data: img.into_raw(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Color channels of every pixel in storage order, alpha dropped.
    pub fn color_channels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data
            .chunks_exact(self.order.channels())
            .map(|px| [px[0], px[1], px[2]])
    }

    /// Converts to an RGB image, dropping alpha and undoing BGR storage.
    pub fn to_rgb_image(&self) -> RgbImage {
        let swap = matches!(self.order, ChannelOrder::Bgra | ChannelOrder::Bgr);
        let data = self
            .color_channels()
            .flat_map(|[a, b, c]| if swap { [c, b, a] } else { [a, b, c] })
            .collect();
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

/// Produces pixel buffers for absolute screen rectangles.
pub trait FrameSource: Send + Sync {
    fn capture(&self, rect: Rect) -> Result<FrameBuffer, RecognitionError>;
}

/// Serves regions out of a still image, e.g. a saved screenshot.
pub struct ImageFrameSource {
    image: RgbaImage,
}

impl ImageFrameSource {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?
            .to_rgba8();
        log::info!(
            "Replaying screenshot {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self { image })
    }
}

impl FrameSource for ImageFrameSource {
    fn capture(&self, rect: Rect) -> Result<FrameBuffer, RecognitionError> {
        let (width, height) = self.image.dimensions();
        let fits = rect.width > 0
            && rect.height > 0
            && rect.x.checked_add(rect.width).is_some_and(|right| right <= width)
            && rect.y.checked_add(rect.height).is_some_and(|bottom| bottom <= height);
        if !fits {
            return Err(RecognitionError::capture(
                rect,
                format!("outside of the {}x{} source image", width, height),
            ));
        }

        let subview = self
            .image
            .view(rect.x, rect.y, rect.width, rect.height)
            .to_image();
        Ok(FrameBuffer::from_rgba(subview))
    }
}

#[cfg(feature = "screen-capture")]
pub use screen::{MonitorInfo, ScreenFrameSource, list_monitors};

#[cfg(feature = "screen-capture")]
mod screen {
    use super::{FrameBuffer, FrameSource};
    use crate::error::RecognitionError;
    use image::{RgbaImage, math::Rect};
    use screenshots::Screen;

    #[derive(Debug, Clone)]
    pub struct MonitorInfo {
        pub id: u32,
        pub x: i32,
        pub y: i32,
        pub width: u32,
        pub height: u32,
        pub scale_factor: f32,
    }

    pub fn list_monitors() -> anyhow::Result<Vec<MonitorInfo>> {
        let screens = Screen::all()?;
        Ok(screens
            .iter()
            .map(|screen| MonitorInfo {
                id: screen.display_info.id,
                x: screen.display_info.x,
                y: screen.display_info.y,
                width: screen.display_info.width,
                height: screen.display_info.height,
                scale_factor: screen.display_info.scale_factor,
            })
            .collect())
    }

    /// Captures from the live display that contains each rectangle's top-left corner.
    #[derive(Default)]
    pub struct ScreenFrameSource;

    impl FrameSource for ScreenFrameSource {
        fn capture(&self, rect: Rect) -> Result<FrameBuffer, RecognitionError> {
            let x = i32::try_from(rect.x).map_err(|e| RecognitionError::capture(rect, e))?;
            let y = i32::try_from(rect.y).map_err(|e| RecognitionError::capture(rect, e))?;
            let screen =
                Screen::from_point(x, y).map_err(|e| RecognitionError::capture(rect, e))?;
            let shot = screen
                .capture_area(
                    x - screen.display_info.x,
                    y - screen.display_info.y,
                    rect.width,
                    rect.height,
                )
                .map_err(|e| RecognitionError::capture(rect, e))?;

            // screenshots links its own `image` version, so move the raw bytes across
            let (width, height) = (shot.width(), shot.height());
            let image = RgbaImage::from_raw(width, height, shot.into_raw())
                .ok_or_else(|| RecognitionError::capture(rect, "unexpected buffer size"))?;
            Ok(FrameBuffer::from_rgba(image))
        }
    }
}
