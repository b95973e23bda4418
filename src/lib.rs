//! gabarito-scan - answer-sheet recognition for scanned PDFs
//!
//! Finds the answer area of a scanned or photographed answer sheet
//! ("gabarito"), corrects its perspective, reads the filled bubble of each
//! question and recovers the printed student ID ("matrícula") through OCR.
//!
//! # Modules
//!
//! - [`image_ops`]: grayscale, denoise, contrast, binarization, morphology
//! - [`localize`]: multi-scale, multi-angle template localization
//! - [`rectify`]: projective rectification onto a canonical canvas
//! - [`bubble`]: grid-based bubble fill detection with an adaptive threshold
//! - [`matricula`]: multi-strategy matrícula OCR
//! - [`pipeline`]: per-page orchestration and batch scheduling
//! - [`ocr`], [`rasterize`]: Tesseract and `pdftoppm` adapters
//! - [`config`], [`report`], [`progress`], [`cli`]: application plumbing
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{Config, FileRasterizer, NoopProgress, OcrOptions, RecognitionPipeline, TesseractEngine};
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! let config = Config::load_from_path(Path::new("gabarito.toml")).unwrap();
//! let pipeline = RecognitionPipeline::new(
//!     config.to_pipeline_config().unwrap(),
//!     Arc::new(TesseractEngine::new(OcrOptions::portuguese()).unwrap()),
//!     Arc::new(FileRasterizer::default()),
//! )
//! .unwrap();
//!
//! let docs = pipeline.process_batch(&[PathBuf::from("turma_a.pdf")], &NoopProgress);
//! for page in docs.iter().flat_map(|d| &d.pages) {
//!     println!("{} matrícula={} answered={}", page.page, page.matricula.text, page.answered_count());
//! }
//! ```

pub mod bubble;
pub mod cli;
pub mod config;
pub mod image_ops;
pub mod localize;
pub mod matricula;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod rasterize;
pub mod rectify;
pub mod report;

// Bubble detection
pub use bubble::{
    AnswerValue, BubbleError, BubbleGridDetector, BubbleOptions, BubbleOptionsBuilder,
    DecisionPolicy, GridSpec, PartialRoiPolicy, QuestionResult, Roi,
};

// CLI
pub use cli::{collect_inputs, exit_codes, CheckConfigArgs, Cli, Commands, RecognizeArgs};

// Config
pub use config::{CliOverrides, Config, ConfigError, TemplateConfig};

// Localization and rectification
pub use localize::{
    LocalizeError, LocateOptions, LocateResult, PixelRect, Point, Quadrilateral, Template,
    TemplateLocalizer, TemplateRole,
};
pub use rectify::{PerspectiveRectifier, RectifyError};

// Matrícula
pub use matricula::{
    ExtractionMode, MatriculaCandidate, MatriculaExtractor, MatriculaOptions, MatriculaResult,
    MatriculaStrategy, StrategyContext, StrategyError, StrategyKind, StrategyOutcome,
};

// OCR and rasterization
pub use ocr::{
    OcrEngine, OcrError, OcrOptions, OcrToken, PageSegMode, TesseractEngine, UnavailableEngine,
};
pub use rasterize::{FileRasterizer, InputKind, PdftoppmRasterizer, RasterizeError, Rasterizer};

// Pipeline
pub use pipeline::{
    CancellationToken, DocumentResult, LocalizationSource, PageId, PageResult, PipelineConfig,
    PipelineError, RecognitionPipeline,
};

// Progress and report
pub use progress::{BatchSummary, NoopProgress, ProgressCallback};
pub use report::{BatchReport, PageReport, ReportError};
