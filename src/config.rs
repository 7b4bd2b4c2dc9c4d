//! Scanner configuration.
//!
//! Loaded from a JSON file at startup. Every field has a default, so a
//! config only needs to spell out what differs, usually the layout.

use crate::consts::DEFAULT_CAPTURE_INTERVAL_MS;
use crate::error::RecognitionError;
use crate::ocr::tesseract_ocr::FallbackConfig;
use crate::ocr::template_matching_ocr::ClassifierConfig;
use crate::preprocess::PreprocessConfig;
use crate::segment::{CanonicalSize, SegmenterConfig};
use crate::templates::FontConfig;
use anyhow::{Context, Result};
use image::{Rgb, math::Rect};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One rectangular screen area to read digits from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    /// Text color, if known; switches preprocessing to color keying.
    pub expected_color: Option<Rgb<u8>>,
}

impl Region {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32, expected_color: Option<Rgb<u8>>) -> Result<Self, RecognitionError> {
        let invalid = |reason: &'static str| RecognitionError::InvalidRegion { x1, y1, x2, y2, reason };
        if x2 <= x1 {
            return Err(invalid("x2 must be greater than x1"));
        }
        if y2 <= y1 {
            return Err(invalid("y2 must be greater than y1"));
        }
        Ok(Self {
            x1,
            y1,
            x2,
            y2,
            expected_color,
        })
    }

    /// Capture request in absolute screen coordinates.
    pub fn capture_rect(&self) -> Rect {
        Rect {
            x: self.x1,
            y: self.y1,
            width: self.x2 - self.x1,
            height: self.y2 - self.y1,
        }
    }
}

/// Regions arranged as rows (records) by columns (fields).
#[derive(Debug, Clone, Default)]
pub struct RegionGrid {
    pub column_names: Vec<String>,
    pub row_names: Vec<String>,
    pub rows: Vec<Vec<Region>>,
}

impl RegionGrid {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }

    pub fn region_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub name: String,
    /// Left edge, relative to the layout origin.
    pub x: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RowLayout {
    pub name: String,
    /// Top edge, relative to the layout origin.
    pub y: u32,
    /// Text color of every cell in this row, `[r, g, b]`.
    pub color: Option<[u8; 3]>,
}

/// Grid description: every row crossed with every column, one fixed cell size.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    /// Screen position the column/row offsets are relative to, e.g. a monitor's corner.
    pub origin: [u32; 2],
    pub cell_width: u32,
    pub cell_height: u32,
    pub columns: Vec<ColumnLayout>,
    pub rows: Vec<RowLayout>,
}

impl GridLayout {
    pub fn to_grid(&self) -> Result<RegionGrid, RecognitionError> {
        let [ox, oy] = self.origin;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let color = row.color.map(Rgb);
                self.columns
                    .iter()
                    .map(|column| {
                        let overflow = || RecognitionError::InvalidRegion {
                            x1: ox.saturating_add(column.x),
                            y1: oy.saturating_add(row.y),
                            x2: u32::MAX,
                            y2: u32::MAX,
                            reason: "coordinates overflow",
                        };
                        let x1 = ox.checked_add(column.x).ok_or_else(overflow)?;
                        let y1 = oy.checked_add(row.y).ok_or_else(overflow)?;
                        let x2 = x1.checked_add(self.cell_width).ok_or_else(overflow)?;
                        let y2 = y1.checked_add(self.cell_height).ok_or_else(overflow)?;
                        Region::new(x1, y1, x2, y2, color)
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RegionGrid {
            column_names: self.columns.iter().map(|c| c.name.clone()).collect(),
            row_names: self.rows.iter().map(|r| r.name.clone()).collect(),
            rows,
        })
    }
}

/// Tuning parameters of the recognition pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub canonical_size: CanonicalSize,
    pub preprocess: PreprocessConfig,
    pub segmenter: SegmenterConfig,
    pub classifier: ClassifierConfig,
}

/// Complete scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub font: FontConfig,
    pub recognition: RecognitionConfig,
    pub fallback: FallbackConfig,
    pub layout: GridLayout,
    /// Minimum time between the starts of two table passes.
    pub capture_interval_ms: u64,
    /// Read the regions of a pass on the rayon pool.
    pub parallel: bool,
    /// Save every region's raw capture here as `<col>_<row>_<value>.png`.
    pub debug_dir: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            font: FontConfig::default(),
            recognition: RecognitionConfig::default(),
            fallback: FallbackConfig::default(),
            layout: GridLayout::default(),
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            parallel: false,
            debug_dir: None,
        }
    }
}

impl ScannerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.layout.to_grid()?;
        Ok(config)
    }

    /// Reads an explicit config file; any failure is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        log::info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Looks for `config.json` next to the executable, then in the working
    /// directory, and falls back to defaults.
    pub fn discover() -> Result<Self> {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("config.json")));
        let candidates = beside_exe.into_iter().chain(Some(PathBuf::from("config.json")));

        for candidate in candidates {
            log::debug!("Looking for config at: {}", candidate.display());
            if candidate.exists() {
                return Self::load(&candidate);
            }
        }

        log::info!("config.json not found. Using default config.");
        Ok(Self::default())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn grid(&self) -> Result<RegionGrid, RecognitionError> {
        self.layout.to_grid()
    }
}
