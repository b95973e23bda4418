//! CLI argument definitions

use crate::bubble::PartialRoiPolicy;
use crate::config::CliOverrides;
use crate::matricula::ExtractionMode;
use crate::rasterize::InputKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INPUT_NOT_FOUND: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    /// Some documents could not be processed
    pub const PARTIAL_FAILURE: i32 = 4;
}

/// Answer-sheet recognition for scanned PDFs
#[derive(Debug, Parser)]
#[command(name = "gabarito-scan", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recognize answers and matrículas in PDFs or images
    Recognize(RecognizeArgs),
    /// Validate a configuration file without processing anything
    CheckConfig(CheckConfigArgs),
    /// Show system information and external tool status
    Info,
}

/// Matrícula scheduling as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Run every strategy, keep the most confident
    Exhaustive,
    /// Stop at the first valid reading
    FirstValid,
}

impl From<ModeArg> for ExtractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Exhaustive => ExtractionMode::Exhaustive,
            ModeArg::FirstValid => ExtractionMode::FirstValid,
        }
    }
}

/// ROIs past the canvas edge, as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartialRoiArg {
    Reject,
    Clip,
}

impl From<PartialRoiArg> for PartialRoiPolicy {
    fn from(policy: PartialRoiArg) -> Self {
        match policy {
            PartialRoiArg::Reject => PartialRoiPolicy::Reject,
            PartialRoiArg::Clip => PartialRoiPolicy::Clip,
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct RecognizeArgs {
    /// Input files or directories (PDF, PNG, JPEG, TIFF, BMP)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Configuration file (TOML, or JSON with `.json`)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON report path; printed to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Base bubble fill threshold
    #[arg(long)]
    pub threshold_fill: Option<f32>,

    /// Rasterization DPI
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Write debug images under this directory
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    /// Draw ROI outlines on the preview
    #[arg(long)]
    pub overlay: bool,

    /// Localize only the first page of each document
    #[arg(long)]
    pub no_localize_each_page: bool,

    /// Equalize matrícula crops from office scanners
    #[arg(long)]
    pub scanned_by_printer: bool,

    /// Minimum matrícula length
    #[arg(long)]
    pub min_length: Option<usize>,

    /// Maximum matrícula length
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Matrícula strategy scheduling
    #[arg(long, value_enum)]
    pub matricula_mode: Option<ModeArg>,

    /// How to treat ROIs extending past the canvas
    #[arg(long, value_enum)]
    pub partial_roi: Option<PartialRoiArg>,

    /// Tesseract language(s), e.g. `por+eng`
    #[arg(long)]
    pub language: Option<String>,

    /// Only process the first N pages of each document
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Embed a base64 PNG preview per page in the report
    #[arg(long)]
    pub preview: bool,

    /// Explicit `tesseract` executable
    #[arg(long)]
    pub tesseract: Option<PathBuf>,

    /// Explicit `pdftoppm` executable
    #[arg(long)]
    pub pdftoppm: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl RecognizeArgs {
    /// Overrides for the values given on the command line
    pub fn to_overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides::new();
        overrides.threshold_fill = self.threshold_fill;
        overrides.dpi = self.dpi;
        overrides.threads = self.threads;
        overrides.debug_dir = self.debug_dir.clone();
        if self.overlay {
            overrides.draw_overlay = Some(true);
        }
        if self.no_localize_each_page {
            overrides.localize_each_page = Some(false);
        }
        if self.scanned_by_printer {
            overrides.scanned_by_printer = Some(true);
        }
        overrides.matricula_min_length = self.min_length;
        overrides.matricula_max_length = self.max_length;
        overrides.matricula_mode = self.matricula_mode.map(Into::into);
        overrides.partial_roi = self.partial_roi.map(Into::into);
        overrides.ocr_language = self.language.clone();
        overrides.max_pages = self.max_pages;
        overrides
    }
}

#[derive(Debug, clap::Args)]
pub struct CheckConfigArgs {
    /// Configuration file; default locations are searched when omitted
    pub config: Option<PathBuf>,
}

/// Supported documents from files and directories (one level), sorted per directory
pub fn collect_inputs(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            if is_supported(input) {
                files.push(input.clone());
            }
        } else if input.is_dir() {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && is_supported(&path) {
                    found.push(path);
                }
            }
            found.sort();
            files.extend(found);
        }
    }
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    InputKind::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recognize_overrides() {
        let cli = Cli::try_parse_from([
            "gabarito-scan",
            "recognize",
            "turma.pdf",
            "--threshold-fill",
            "0.25",
            "--no-localize-each-page",
            "--matricula-mode",
            "first-valid",
            "--partial-roi",
            "clip",
            "-vv",
        ])
        .unwrap();
        let Commands::Recognize(args) = cli.command else {
            panic!("expected recognize");
        };
        assert_eq!(args.verbose, 2);
        let overrides = args.to_overrides();
        assert_eq!(overrides.threshold_fill, Some(0.25));
        assert_eq!(overrides.localize_each_page, Some(false));
        assert_eq!(overrides.matricula_mode, Some(ExtractionMode::FirstValid));
        assert_eq!(overrides.partial_roi, Some(PartialRoiPolicy::Clip));
        // Flags left at their defaults do not override the file
        assert_eq!(overrides.draw_overlay, None);
        assert_eq!(overrides.dpi, None);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["gabarito-scan", "recognize", "a.pdf", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_collect_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = collect_inputs(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.pdf"]);
    }
}
