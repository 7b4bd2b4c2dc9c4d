pub mod consts {
    /// Symbols a template library is built for unless configured otherwise.
    pub const DEFAULT_SYMBOLS: &str = "0123456789.";

    /// Characters the generic OCR fallback may return.
    pub const DEFAULT_WHITELIST: &str = "0123456789.";

    /// Glyphs are rasterized large and scaled down to keep anti-aliasing out of the templates.
    pub const DEFAULT_RENDER_SIZE: f32 = 64.0;

    pub const DEFAULT_CANONICAL_SIZE: u32 = 32;

    pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.6;
    pub const DEFAULT_TIE_TOLERANCE: f64 = 1e-6;

    /// Per-channel distance accepted around an expected text color.
    pub const DEFAULT_COLOR_TOLERANCE: u8 = 40;

    /// An adaptive mask with more foreground than this is assumed to be inverted.
    pub const DEFAULT_MAX_FOREGROUND_FRACTION: f32 = 0.5;

    pub const DEFAULT_MIN_GLYPH_HEIGHT: u32 = 10;
    pub const DEFAULT_MIN_GLYPH_WIDTH: u32 = 2;

    pub const DEFAULT_PAGE_SEGMENTATION_MODE: u8 = 6;

    pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 4000;

    /// Minimum cell width of the rendered text table.
    pub const TABLE_CELL_WIDTH: usize = 12;
}

pub mod config;
pub mod error;
pub mod frame;
pub mod ocr;
pub mod preprocess;
pub mod scan_loop;
pub mod segment;
pub mod table_scanner;
pub mod templates;

pub use error::RecognitionError;
