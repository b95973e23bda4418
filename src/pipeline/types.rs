//! Pipeline module core types

use crate::bubble::{BubbleOptions, GridSpec, QuestionResult};
use crate::localize::{LocateOptions, Quadrilateral, Template};
use crate::matricula::{MatriculaOptions, MatriculaResult};
use crate::rasterize::DEFAULT_DPI;
use image::RgbImage;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Default rectified canvas width
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;

/// Default rectified canvas height
pub const DEFAULT_CANVAS_HEIGHT: u32 = 1200;

/// Debug run directory timestamp format
pub const DEBUG_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ============================================================
// Error Types
// ============================================================

/// Pipeline errors
///
/// Only document-level and setup failures surface as errors; everything
/// that goes wrong inside a page ends up in that page's diagnostics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No pages could be rendered from {0}")]
    EmptyDocument(PathBuf),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Debug output failed: {0}")]
    DebugOutput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Where a page came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageId {
    /// Document file name
    pub document: String,
    /// Position of the document in the batch (0-based)
    pub document_index: usize,
    /// Position of the page in the document (0-based)
    pub page_index: usize,
}

impl PageId {
    pub fn new(document: impl Into<String>, document_index: usize, page_index: usize) -> Self {
        Self {
            document: document.into(),
            document_index,
            page_index,
        }
    }

    /// `<document stem>_pag_<n>`, with a 1-based page number
    pub fn debug_dir_name(&self) -> String {
        let stem = std::path::Path::new(&self.document)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.document.clone());
        format!("{}_pag_{}", stem, self.page_index + 1)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} p.{}", self.document, self.page_index + 1)
    }
}

/// How the answer area was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizationSource {
    /// Answer template matched above its minimum score
    Template,
    /// Configured reference points
    ReferencePoints,
    /// Not localized; the grid was read in page coordinates
    None,
}

/// Quadrilateral chosen for a page, with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Localization {
    pub quad: Option<Quadrilateral>,
    pub source: LocalizationSource,
    /// Best template score, when a template search ran
    pub template_score: Option<f32>,
    pub diagnostics: Vec<String>,
}

/// Recognition output for one page
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: PageId,
    /// Sorted by question number
    pub answers: Vec<QuestionResult>,
    pub matricula: MatriculaResult,
    /// Rectified canvas (or the original page when not localized)
    pub preview: RgbImage,
    pub template_score: Option<f32>,
    pub localization: LocalizationSource,
    pub diagnostics: Vec<String>,
}

impl PageResult {
    /// Number of questions with a single resolved alternative
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.value.is_answered()).count()
    }
}

/// Result of one document in a batch
#[derive(Debug)]
pub struct DocumentResult {
    pub path: PathBuf,
    pub document_index: usize,
    pub pages: Vec<PageResult>,
    /// Document-level failure or cancellation; pages finished before a
    /// cancellation are kept in `pages`
    pub error: Option<PipelineError>,
}

impl DocumentResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================
// Cancellation
// ============================================================

/// Cooperative cancellation flag shared with the caller
///
/// Checked before each document and each page starts; a page already in
/// progress always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================
// Configuration
// ============================================================

/// Run-level settings, shared read-only by every page
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub grid: GridSpec,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub answer_template: Option<Arc<Template>>,
    /// Fallback quadrilateral when no template is configured or accepted
    pub reference_points: Option<Quadrilateral>,
    pub locate: LocateOptions,
    pub bubble: BubbleOptions,
    pub matricula: MatriculaOptions,
    /// Localize every page, or only the first page of each document
    pub localize_each_page: bool,
    pub dpi: u32,
    /// Worker threads; CPU count when `None`
    pub threads: Option<usize>,
    /// Only the first N pages of each document
    pub max_pages: Option<usize>,
    pub debug_dir: Option<PathBuf>,
    /// Draw ROI outlines on the preview
    pub draw_overlay: bool,
}

impl PipelineConfig {
    /// Defaults around a grid
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            answer_template: None,
            reference_points: None,
            locate: LocateOptions::default(),
            bubble: BubbleOptions::default(),
            matricula: MatriculaOptions::default(),
            localize_each_page: true,
            dpi: DEFAULT_DPI,
            threads: None,
            max_pages: None,
            debug_dir: None,
            draw_overlay: false,
        }
    }

    #[must_use]
    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = width;
        self.canvas_height = height;
        self
    }

    #[must_use]
    pub fn with_answer_template(mut self, template: Arc<Template>) -> Self {
        self.answer_template = Some(template);
        self
    }

    #[must_use]
    pub fn with_reference_points(mut self, quad: Quadrilateral) -> Self {
        self.reference_points = Some(quad);
        self
    }

    #[must_use]
    pub fn with_locate(mut self, locate: LocateOptions) -> Self {
        self.locate = locate;
        self
    }

    #[must_use]
    pub fn with_bubble(mut self, bubble: BubbleOptions) -> Self {
        self.bubble = bubble;
        self
    }

    #[must_use]
    pub fn with_matricula(mut self, matricula: MatriculaOptions) -> Self {
        self.matricula = matricula;
        self
    }

    #[must_use]
    pub fn with_localize_each_page(mut self, each: bool) -> Self {
        self.localize_each_page = each;
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    #[must_use]
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_overlay(mut self, draw: bool) -> Self {
        self.draw_overlay = draw;
        self
    }

    /// Effective worker count
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::Roi;

    #[test]
    fn test_page_id() {
        let id = PageId::new("provas.pdf", 0, 2);
        assert_eq!(id.to_string(), "provas.pdf p.3");
        assert_eq!(id.debug_dir_name(), "provas_pag_3");
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::new(GridSpec::from_rois(vec![Roi::new(0, 0, 100, 20)], 4));
        assert_eq!((config.canvas_width, config.canvas_height), (800, 1200));
        assert!(config.localize_each_page);
        assert_eq!(config.dpi, 300);
        assert!(config.thread_count() >= 1);
        assert_eq!(config.with_threads(0).thread_count(), 1);
    }

    #[test]
    fn test_localization_source_serde() {
        assert_eq!(
            serde_json::to_string(&LocalizationSource::ReferencePoints).unwrap(),
            "\"reference_points\""
        );
    }
}
