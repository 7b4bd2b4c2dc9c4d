use anyhow::Result;
use clap::Parser;
use log::{error, info};
use stat_reader::{
    config::ScannerConfig,
    frame::{FrameSource, ImageFrameSource},
    ocr::{
        fallback_ocr::{FallbackOcrEngine, GenericOcrEngine},
        template_matching_ocr::TemplateMatchingOcrEngine,
        tesseract_ocr::TesseractCli,
    },
    scan_loop::ScanLoop,
    table_scanner::{TableResult, TableScanner},
    templates::TemplateCache,
};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;

/// Stat Reader - reads numbers off a fixed on-screen table
#[derive(Parser, Debug)]
#[command(name = "stat_reader")]
#[command(about = "Reads a grid of on-screen numbers with font templates and OCR fallback", long_about = None)]
struct Args {
    /// Configuration file (defaults to config.json next to the executable or in the working directory)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Read regions from this screenshot instead of the live screen
    #[arg(short = 'i', long)]
    image: Option<PathBuf>,

    /// Font the digit templates are rendered from
    #[arg(short = 'f', long)]
    font: Option<PathBuf>,

    /// Milliseconds between the starts of two passes
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Run a single pass and exit
    #[arg(long, default_value = "false")]
    once: bool,

    /// Print every table as a JSON line
    #[arg(long, default_value = "false")]
    json: bool,

    /// Save raw region captures into this directory
    #[arg(short = 'd', long)]
    debug_dir: Option<PathBuf>,

    /// Read the regions of a pass in parallel
    #[arg(short = 'p', long, default_value = "false")]
    parallel: bool,

    /// List the available monitors and exit
    #[arg(long, default_value = "false")]
    list_monitors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter(None, log::LevelFilter::Info)
        .filter(Some("stat_reader"), log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let args = Args::parse();

    if args.list_monitors {
        return list_monitors();
    }

    let mut config = match &args.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::discover()?,
    };
    if let Some(font) = &args.font {
        config.font.path = font.clone();
    }
    if let Some(interval) = args.interval_ms {
        config.capture_interval_ms = interval;
    }
    if args.debug_dir.is_some() {
        config.debug_dir = args.debug_dir.clone();
    }
    config.parallel |= args.parallel;

    match &args.image {
        Some(path) => run(ImageFrameSource::open(path)?, config, &args).await,
        None => run_live(config, &args).await,
    }
}

#[cfg(feature = "screen-capture")]
async fn run_live(config: ScannerConfig, args: &Args) -> Result<()> {
    run(stat_reader::frame::ScreenFrameSource, config, args).await
}

#[cfg(not(feature = "screen-capture"))]
async fn run_live(_config: ScannerConfig, _args: &Args) -> Result<()> {
    anyhow::bail!("Built without screen capture; pass --image <screenshot> or rebuild with --features screen-capture");
}

#[cfg(feature = "screen-capture")]
fn list_monitors() -> Result<()> {
    for monitor in stat_reader::frame::list_monitors()? {
        println!(
            "Monitor {}: {}x{} at ({}, {}), scale {}",
            monitor.id, monitor.width, monitor.height, monitor.x, monitor.y, monitor.scale_factor
        );
    }
    Ok(())
}

#[cfg(not(feature = "screen-capture"))]
fn list_monitors() -> Result<()> {
    anyhow::bail!("Built without screen capture; rebuild with --features screen-capture");
}

async fn run<S: FrameSource + 'static>(source: S, config: ScannerConfig, args: &Args) -> Result<()> {
    let grid = config.grid()?;
    if grid.is_empty() {
        anyhow::bail!("No regions configured; describe the table under \"layout\" in config.json");
    }

    let recognition = &config.recognition;
    let templates = TemplateCache::global().load_font(&config.font, recognition.canonical_size);
    if templates.is_empty() {
        info!("No templates available, every region goes through Tesseract");
    }
    if let Some(dir) = &config.debug_dir {
        if let Err(e) = templates.save_to(&dir.join("templates")) {
            log::warn!("Failed to save templates: {:#}", e);
        }
    }

    let engine = FallbackOcrEngine::new(
        TemplateMatchingOcrEngine::new(
            templates,
            recognition.segmenter.clone(),
            recognition.classifier.clone(),
        ),
        GenericOcrEngine::new(
            Box::new(TesseractCli::new(&config.fallback)),
            config.fallback.whitelist.clone(),
        ),
    );

    let mut scanner = TableScanner::new(source, grid, recognition.preprocess.clone(), Box::new(engine))
        .with_parallel(config.parallel)
        .with_debug_dir(config.debug_dir.clone());

    let json = args.json;
    if args.once {
        print_table(&scanner.recognize_table(), json);
        return Ok(());
    }

    info!(
        "Reading {} regions every {} ms",
        scanner.grid().region_count(),
        config.capture_interval_ms
    );

    let should_quit = Arc::new(AtomicBool::new(false));
    let should_quit_loop = should_quit.clone();
    let scan_loop = ScanLoop::new(scanner, config.capture_interval());
    let mut handle = tokio::task::spawn_blocking(move || {
        scan_loop.run(should_quit_loop, |table| print_table(table, json))
    });

    tokio::select! {
        result = &mut handle => {
            match result {
                Ok(passes) => info!("Scan loop finished after {} passes", passes),
                Err(err) => error!("Scan loop failed: {}", err),
            }
            return Ok(());
        }
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl-C, finishing the current pass..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
            should_quit.store(true, Ordering::Relaxed);
        }
    }

    match handle.await {
        Ok(passes) => info!("Done after {} passes", passes),
        Err(err) => error!("Scan loop failed: {}", err),
    }
    Ok(())
}

fn print_table(table: &TableResult, json: bool) {
    if json {
        match serde_json::to_string(table) {
            Ok(line) => println!("{}", line),
            Err(err) => error!("Failed to serialize table: {}", err),
        }
    } else {
        println!("\n{}", table);
    }
}
