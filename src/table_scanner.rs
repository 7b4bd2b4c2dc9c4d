use crate::config::{Region, RegionGrid};
use crate::consts::TABLE_CELL_WIDTH;
use crate::error::RecognitionError;
use crate::frame::{FrameBuffer, FrameSource};
use crate::ocr::OcrEngine;
use crate::preprocess::{PreprocessConfig, preprocess};
use image::RgbaImage;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Passes slower than this get a warning.
const SLOW_PASS: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub name: String,
    pub cells: Vec<String>,
}

/// Recognized strings of one pass, rows by columns.
///
/// Unreadable cells are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableResult {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl TableResult {
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.cells.get(column))
            .map(String::as_str)
    }

    pub fn filled_cells(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .filter(|c| !c.is_empty())
            .count()
    }
}

impl fmt::Display for TableResult {
    /// Fixed-width text table with a header row and separators.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labelled = self.rows.iter().any(|r| !r.name.is_empty());
        let column_count = self
            .rows
            .iter()
            .map(|r| r.cells.len())
            .chain(Some(self.columns.len()))
            .max()
            .unwrap_or(0);

        let header = |i: usize| self.columns.get(i).map(String::as_str).unwrap_or("");
        let width = (0..column_count)
            .map(|i| header(i).chars().count())
            .chain(self.rows.iter().flat_map(|r| r.cells.iter().map(|c| c.chars().count())))
            .chain(self.rows.iter().map(|r| r.name.chars().count()))
            .fold(TABLE_CELL_WIDTH, usize::max);

        let header_line = render_line(
            labelled.then_some(""),
            (0..column_count).map(header),
            width,
        );
        let separator = "-".repeat(header_line.chars().count());

        writeln!(f, "{}", separator)?;
        writeln!(f, "{}", header_line)?;
        writeln!(f, "{}", separator)?;
        for row in &self.rows {
            let cells = (0..column_count).map(|i| row.cells.get(i).map(String::as_str).unwrap_or(""));
            writeln!(f, "{}", render_line(labelled.then_some(row.name.as_str()), cells, width))?;
        }
        write!(f, "{}", separator)
    }
}

fn render_line<'a>(label: Option<&'a str>, cells: impl Iterator<Item = &'a str>, width: usize) -> String {
    let fields: Vec<String> = label
        .into_iter()
        .chain(cells)
        .map(|c| format!("{:<width$}", c))
        .collect();
    format!("| {} |", fields.join(" | "))
}

/// Drives capture -> preprocess -> recognize over every region of a grid.
pub struct TableScanner<S: FrameSource> {
    source: S,
    grid: RegionGrid,
    preprocess: PreprocessConfig,
    engine: Box<dyn OcrEngine>,
    parallel: bool,
    debug_dir: Option<PathBuf>,
    previous: Option<TableResult>,
    passes: u64,
}

struct CellOutcome {
    text: String,
    capture: Option<FrameBuffer>,
}

impl<S: FrameSource> TableScanner<S> {
    pub fn new(source: S, grid: RegionGrid, preprocess: PreprocessConfig, engine: Box<dyn OcrEngine>) -> Self {
        Self {
            source,
            grid,
            preprocess,
            engine,
            parallel: false,
            debug_dir: None,
            previous: None,
            passes: 0,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Runs one full pass. Never fails: unreadable regions come back empty.
    pub fn recognize_table(&mut self) -> TableResult {
        let started = Instant::now();
        let keep_captures = self.debug_dir.is_some();

        let outcomes: Vec<Vec<CellOutcome>> = if self.parallel {
            self.grid
                .rows
                .par_iter()
                .enumerate()
                .map(|(row, regions)| {
                    regions
                        .par_iter()
                        .enumerate()
                        .map(|(column, region)| self.recognize_region(row, column, region, keep_captures))
                        .collect::<Vec<_>>()
                })
                .collect()
        } else {
            self.grid
                .rows
                .iter()
                .enumerate()
                .map(|(row, regions)| {
                    regions
                        .iter()
                        .enumerate()
                        .map(|(column, region)| self.recognize_region(row, column, region, keep_captures))
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        let table = TableResult {
            columns: self.grid.column_names.clone(),
            rows: outcomes
                .iter()
                .enumerate()
                .map(|(row, cells)| TableRow {
                    name: self.grid.row_names.get(row).cloned().unwrap_or_default(),
                    cells: cells.iter().map(|c| c.text.clone()).collect(),
                })
                .collect(),
        };

        if let Some(dir) = &self.debug_dir {
            self.dump_changed_captures(dir, &outcomes);
        }

        let elapsed = started.elapsed();
        if elapsed > SLOW_PASS {
            log::warn!("Table pass took too long: {:?}", elapsed);
        }
        log::debug!(
            "Pass {} read {}/{} cells in {} ms",
            self.passes + 1,
            table.filled_cells(),
            self.grid.region_count(),
            elapsed.as_millis()
        );

        self.passes += 1;
        self.previous = Some(table.clone());
        table
    }

    fn recognize_region(&self, row: usize, column: usize, region: &Region, keep_capture: bool) -> CellOutcome {
        let frame = match self.source.capture(region.capture_rect()) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Region row {} column {}: {}", row, column, e);
                return CellOutcome {
                    text: String::new(),
                    capture: None,
                };
            }
        };

        let mask = preprocess(&frame, region.expected_color, &self.preprocess);
        let text = match self.engine.recognize(&mask) {
            Ok(text) => text,
            Err(e) => {
                log_engine_error(row, column, self.engine.name(), &e);
                String::new()
            }
        };

        CellOutcome {
            text,
            capture: keep_capture.then_some(frame),
        }
    }

    /// Writes raw captures of cells whose value changed since the last pass.
    fn dump_changed_captures(&self, dir: &Path, outcomes: &[Vec<CellOutcome>]) {
        for (row, cells) in outcomes.iter().enumerate() {
            for (column, outcome) in cells.iter().enumerate() {
                let unchanged = self
                    .previous
                    .as_ref()
                    .and_then(|p| p.cell(row, column))
                    .is_some_and(|previous| previous == outcome.text);
                let Some(frame) = outcome.capture.as_ref().filter(|_| !unchanged) else {
                    continue;
                };
                if let Err(e) = save_debug_capture(dir, column, row, &outcome.text, frame) {
                    log::warn!("Failed to save debug capture: {:#}", e);
                }
            }
        }
    }
}

fn log_engine_error(row: usize, column: usize, engine: &str, error: &RecognitionError) {
    match error {
        RecognitionError::EngineUnavailable(_) => {
            log::warn!("Region row {} column {}: {}", row, column, error)
        }
        _ => log::warn!("Region row {} column {} ({} OCR): {}", row, column, engine, error),
    }
}

/// Saves a raw capture as `<column>_<row>_<value>.png` in `dir`.
pub fn save_debug_capture(
    dir: &Path,
    column: usize,
    row: usize,
    value: &str,
    frame: &FrameBuffer,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}_{}.png", column, row, value));

    let rgb = frame.to_rgb_image();
    let rgba = RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        image::Rgba([r, g, b, 255])
    });
    rgba.save(&path)?;
    log::trace!("Saved {}", path.display());
    Ok(path)
}
