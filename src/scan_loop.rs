use crate::frame::FrameSource;
use crate::table_scanner::{TableResult, TableScanner};
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often the loop re-checks the stop flag while waiting for the next pass.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Repeats table passes with a minimum interval between pass starts.
pub struct ScanLoop<S: FrameSource> {
    scanner: TableScanner<S>,
    interval: Duration,
}

impl<S: FrameSource> ScanLoop<S> {
    pub fn new(scanner: TableScanner<S>, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    /// Runs until `should_quit` is set, handing every table to `sink`.
    ///
    /// The flag is only honoured between passes; a started pass always
    /// completes. Returns the number of passes run.
    pub fn run<F>(mut self, should_quit: Arc<AtomicBool>, mut sink: F) -> u64
    where
        F: FnMut(&TableResult),
    {
        info!(
            "Scan loop started: {} regions every {:?}",
            self.scanner.grid().region_count(),
            self.interval
        );

        let mut filled = 0usize;
        while !should_quit.load(Ordering::Relaxed) {
            let started = Instant::now();
            let table = self.scanner.recognize_table();
            filled += table.filled_cells();
            sink(&table);

            let passes = self.scanner.passes();
            if passes % 100 == 0 {
                info!(
                    "Ran {} passes, {:.1} cells read per pass on average",
                    passes,
                    filled as f64 / passes as f64
                );
            }

            while started.elapsed() < self.interval {
                if should_quit.load(Ordering::Relaxed) {
                    break;
                }
                let remaining = self.interval.saturating_sub(started.elapsed());
                std::thread::sleep(remaining.min(STOP_POLL));
            }
        }

        let passes = self.scanner.passes();
        info!("Scan loop stopped after {} passes", passes);
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Region, RegionGrid};
    use crate::error::RecognitionError;
    use crate::frame::ImageFrameSource;
    use crate::ocr::OcrEngine;
    use crate::preprocess::{Mask, PreprocessConfig};
    use image::RgbaImage;
    use std::sync::atomic::AtomicUsize;

    struct Counting(Arc<AtomicUsize>);

    impl OcrEngine for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn recognize(&self, _mask: &Mask) -> Result<String, RecognitionError> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst).to_string())
        }
    }

    fn scanner(calls: Arc<AtomicUsize>) -> TableScanner<ImageFrameSource> {
        let grid = RegionGrid {
            column_names: vec!["Score".into()],
            row_names: vec![String::new()],
            rows: vec![vec![Region::new(0, 0, 8, 8, None).unwrap()]],
        };
        TableScanner::new(
            ImageFrameSource::new(RgbaImage::new(16, 16)),
            grid,
            PreprocessConfig::default(),
            Box::new(Counting(calls)),
        )
    }

    #[test]
    fn test_stops_when_flag_set_between_passes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let should_quit = Arc::new(AtomicBool::new(false));
        let flag = should_quit.clone();

        let mut seen = Vec::new();
        let passes = ScanLoop::new(scanner(calls.clone()), Duration::ZERO).run(should_quit, |table| {
            seen.push(table.cell(0, 0).unwrap_or_default().to_string());
            if seen.len() == 3 {
                flag.store(true, Ordering::Relaxed);
            }
        });

        assert_eq!(passes, 3);
        assert_eq!(seen, vec!["0", "1", "2"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_preset_flag_runs_no_pass() {
        let calls = Arc::new(AtomicUsize::new(0));
        let passes = ScanLoop::new(scanner(calls.clone()), Duration::ZERO)
            .run(Arc::new(AtomicBool::new(true)), |_| panic!("no pass expected"));
        assert_eq!(passes, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_waits_for_interval_between_pass_starts() {
        let should_quit = Arc::new(AtomicBool::new(false));
        let flag = should_quit.clone();
        let interval = Duration::from_millis(120);
        let mut starts = Vec::new();

        let begun = Instant::now();
        ScanLoop::new(scanner(Arc::new(AtomicUsize::new(0))), interval).run(should_quit, |_| {
            starts.push(Instant::now());
            if starts.len() == 2 {
                flag.store(true, Ordering::Relaxed);
            }
        });

        assert_eq!(starts.len(), 2);
        assert!(starts[1] - begun >= interval);
    }
}
