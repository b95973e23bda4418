//! gabarito-scan - answer-sheet recognition for scanned PDFs
//!
//! CLI entry point

use anyhow::Context;
use clap::Parser;
use gabarito_scan::{
    collect_inputs, exit_codes,
    // CLI
    CheckConfigArgs, Cli, Commands, RecognizeArgs,
    // Config
    Config,
    // Engines
    FileRasterizer, OcrEngine, OcrOptions, PdftoppmRasterizer, TesseractEngine, UnavailableEngine,
    // Pipeline
    ProgressCallback, RecognitionPipeline,
    // Report and progress
    BatchReport, BatchSummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Recognize(args) => {
            init_logging(args.verbose, args.quiet);
            run_recognize(&args)
        }
        Commands::CheckConfig(args) => {
            init_logging(0, false);
            run_check_config(&args)
        }
        Commands::Info => run_info().map(|()| exit_codes::SUCCESS),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, 2) => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============ Progress Callback Implementation ============

/// Progress bar over the pages of the current document
struct BarProgress {
    bar: ProgressBar,
    verbose_level: u8,
}

impl BarProgress {
    fn new(verbose_level: u8, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        };
        Self { bar, verbose_level }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_step_start(&self, step: &str) {
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_message(step.to_string());
    }

    fn on_step_progress(&self, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
    }

    fn on_step_complete(&self, step: &str, message: &str) {
        self.bar.println(format!("  {}: {}", step, message));
    }

    fn on_debug(&self, message: &str) {
        if self.verbose_level > 1 {
            self.bar.println(format!("    [DEBUG] {}", message));
        }
    }
}

// ============ Recognize Command ============

fn run_recognize(args: &RecognizeArgs) -> anyhow::Result<i32> {
    let start_time = Instant::now();

    if let Some(missing) = args.inputs.iter().find(|p| !p.exists()) {
        eprintln!("Error: Input path does not exist: {}", missing.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }
    let files = collect_inputs(&args.inputs).context("Failed to read input directory")?;
    if files.is_empty() {
        eprintln!("Error: No PDF or image files found in input paths");
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    // Config file, then command-line overrides on top
    let file_config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let config = match file_config {
        Ok(cfg) => cfg.merge_with_cli(&args.to_overrides()),
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let pipeline_config = match config.to_pipeline_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: Invalid configuration: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let mut ocr_options = OcrOptions::portuguese();
    if let Some(language) = &config.ocr_language {
        ocr_options.language = language.clone();
    }
    ocr_options.executable = args.tesseract.clone();
    let ocr: Arc<dyn OcrEngine> = match TesseractEngine::new(ocr_options) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            warn!(error = %e, "OCR unavailable, matrícula will not be read");
            Arc::new(UnavailableEngine::new(e.to_string()))
        }
    };

    let rasterizer = FileRasterizer {
        pdf: PdftoppmRasterizer {
            executable: args.pdftoppm.clone(),
            max_pages: config.max_pages,
        },
    };

    let pipeline = RecognitionPipeline::new(pipeline_config, ocr, Arc::new(rasterizer))
        .context("Failed to start the recognition pipeline")?;
    info!(
        files = files.len(),
        threads = pipeline.config().thread_count(),
        "Starting recognition"
    );

    let progress = BarProgress::new(args.verbose, args.quiet);
    let documents = pipeline.process_batch(&files, &progress);
    progress.finish();

    let report = BatchReport::from_documents(&documents, args.preview)
        .context("Failed to build report")?;
    match &args.output {
        Some(path) => report
            .write_to(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => println!("{}", report.to_json()?),
    }

    let summary = BatchSummary::from_documents(&documents);
    for doc in &documents {
        if let Some(e) = &doc.error {
            eprintln!("Error: {}: {}", doc.path.display(), e);
        }
    }

    // Summary goes to stdout only when stdout is not carrying the report
    if !args.quiet && args.output.is_some() {
        summary.print();
        println!("Elapsed: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    Ok(if summary.failed_files > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::SUCCESS
    })
}

// ============ Check Config Command ============

fn run_check_config(args: &CheckConfigArgs) -> anyhow::Result<i32> {
    let loaded = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match config.to_pipeline_config() {
        Ok(pipeline) => {
            println!("Configuration OK");
            println!("  Questions:    {}", pipeline.grid.len());
            println!("  Canvas:       {}x{}", pipeline.canvas_width, pipeline.canvas_height);
            println!("  Threshold:    {:.2}", config.threshold_fill);
            println!("  DPI:          {}", pipeline.dpi);
            println!(
                "  Localization: {}",
                if pipeline.answer_template.is_some() {
                    "answer template"
                } else if pipeline.reference_points.is_some() {
                    "reference points"
                } else {
                    "none"
                }
            );
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: Invalid configuration: {}", e);
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

// ============ Info Command ============

fn run_info() -> anyhow::Result<()> {
    println!("gabarito-scan v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // System Information
    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    // Memory info (Linux)
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        if let Some(line) = meminfo.lines().find(|l| l.starts_with("MemTotal:")) {
            if let Some(kb) = line.split_whitespace().nth(1) {
                if let Ok(kb_val) = kb.parse::<u64>() {
                    println!("  Memory: {:.1} GB", kb_val as f64 / 1_048_576.0);
                }
            }
        }
    }

    // External Tools
    println!();
    println!("PDF Rasterization:");
    check_tool_with_version("pdftoppm", "Poppler", &["-v"]);

    println!();
    println!("OCR Tools:");
    check_tool_with_version("tesseract", "Tesseract", &["--version"]);
    if let Ok(output) = std::process::Command::new("tesseract").arg("--list-langs").output() {
        let langs = String::from_utf8_lossy(&output.stdout);
        let has_por = langs.lines().any(|l| l.trim() == "por");
        println!(
            "  Portuguese data: {}",
            if has_por { "installed" } else { "Not installed" }
        );
    }

    // Config File Locations
    println!();
    println!("Config File Locations:");
    for (label, path) in ["Local", "User "].iter().zip(Config::search_paths()) {
        println!("  {}: {}", label, path.display());
    }

    Ok(())
}

fn check_tool_with_version(cmd: &str, name: &str, version_args: &[&str]) {
    match which::which(cmd) {
        Ok(path) => {
            // Poppler prints its version on stderr
            let first_line = std::process::Command::new(&path)
                .args(version_args)
                .output()
                .ok()
                .and_then(|output| {
                    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                    stdout
                        .lines()
                        .chain(stderr.lines())
                        .map(str::trim)
                        .find(|l| !l.is_empty())
                        .map(str::to_string)
                });
            match first_line {
                Some(line) if line.len() < 80 => println!("  {}: {} ({})", name, line, path.display()),
                _ => println!("  {}: {} (found)", name, path.display()),
            }
        }
        Err(_) => println!("  {}: Not found", name),
    }
}
