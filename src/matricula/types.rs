//! Matrícula module core types

use crate::localize::{LocateOptions, PixelRect, Template};
use crate::ocr::{OcrError, PageSegMode, DEFAULT_DIGIT_MODES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Default minimum matrícula length
pub const DEFAULT_MIN_LENGTH: usize = 4;

/// Default maximum matrícula length
pub const DEFAULT_MAX_LENGTH: usize = 10;

/// Confidence of a valid fixed-ROI read
pub const FIXED_ROI_CONFIDENCE: f32 = 0.9;

/// Confidence of a valid contour-shape read
pub const CONTOUR_CONFIDENCE: f32 = 0.7;

/// Confidence of a valid line-geometry read
pub const LINE_CONFIDENCE: f32 = 0.6;

/// Confidence of the ensemble majority vote
pub const ENSEMBLE_CONFIDENCE: f32 = 0.5;

/// Confidence of a digit token found next to the label
pub const LABEL_CONFIDENCE: f32 = 0.75;

/// Label printed next to the number on the sheet
pub const DEFAULT_LABEL: &str = "matricula";

/// Minimum normalized Levenshtein similarity for the label token
pub const DEFAULT_LABEL_SIMILARITY: f64 = 0.75;

/// Box-like aspect ratio range for the shape strategies
pub const DEFAULT_MIN_ASPECT: f32 = 2.0;
pub const DEFAULT_MAX_ASPECT: f32 = 6.0;

/// Minimum box area as a fraction of the searched band
pub const DEFAULT_MIN_AREA_FRACTION: f32 = 0.002;

// ============================================================
// Error Types
// ============================================================

/// Failure of a single strategy
///
/// Never fatal for the extraction: the extractor records it as a diagnostic
/// outcome and keeps the other strategies' results.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Region {0:?} lies outside the page")]
    RegionOutside(PixelRect),

    #[error("Page is empty")]
    EmptyPage,
}

pub type Result<T> = std::result::Result<T, StrategyError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Strategy that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FixedRoi,
    HeaderTemplate,
    Contour,
    Lines,
    Ensemble,
    /// Digit token following the printed label, found by the ensemble pass
    LabelToken,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::FixedRoi => "fixed_roi",
            StrategyKind::HeaderTemplate => "header_template",
            StrategyKind::Contour => "contour",
            StrategyKind::Lines => "lines",
            StrategyKind::Ensemble => "ensemble",
            StrategyKind::LabelToken => "label_token",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strategy's reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatriculaCandidate {
    pub text: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub strategy: StrategyKind,
}

impl MatriculaCandidate {
    pub fn new(text: impl Into<String>, confidence: f32, strategy: StrategyKind) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            strategy,
        }
    }
}

/// What happened to one strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Produced a candidate that passed validation
    Candidate { text: String, confidence: f32 },
    /// Produced text that failed validation
    Rejected { raw: String },
    /// Ran but found nothing
    NoResult,
    /// Not applicable (missing configuration) or not reached
    Skipped,
    /// Returned an error
    Failed { message: String },
}

/// Diagnostic record of one strategy run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyOutcome {
    pub strategy: StrategyKind,
    pub kind: OutcomeKind,
}

/// Final matrícula decision for a page
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MatriculaResult {
    /// Best digit string, empty if nothing validated
    pub text: String,
    pub confidence: f32,
    pub valid: bool,
    pub strategy: Option<StrategyKind>,
    pub outcomes: Vec<StrategyOutcome>,
}

impl MatriculaResult {
    /// No valid reading
    pub fn empty(outcomes: Vec<StrategyOutcome>) -> Self {
        Self {
            outcomes,
            ..Default::default()
        }
    }
}

// ============================================================
// Options
// ============================================================

/// Strategy scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Run every applicable strategy, pick the most confident
    #[default]
    Exhaustive,
    /// Run in order, stop at the first valid candidate
    FirstValid,
}

/// Matrícula extraction options
#[derive(Debug, Clone)]
pub struct MatriculaOptions {
    pub min_length: usize,
    pub max_length: usize,
    /// Literal region of the number on the page
    pub fixed_roi: Option<PixelRect>,
    /// Header template whose match box contains the number
    pub header_template: Option<Arc<Template>>,
    /// Equalize fixed-ROI crops before the digit pipeline
    pub scanned_by_printer: bool,
    pub mode: ExtractionMode,
    /// Segmentation modes tried in order for digit reads
    pub psm_modes: Vec<PageSegMode>,
    /// Fraction of the page height searched by the shape and ensemble
    /// strategies, from the top
    pub search_band: f32,
    /// Header template search options
    pub locate: LocateOptions,
    pub label: String,
    pub label_similarity: f64,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_area_fraction: f32,
    /// Where to save the crops handed to OCR
    pub debug_dir: Option<PathBuf>,
}

impl Default for MatriculaOptions {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            fixed_roi: None,
            header_template: None,
            scanned_by_printer: false,
            mode: ExtractionMode::default(),
            psm_modes: DEFAULT_DIGIT_MODES.to_vec(),
            search_band: 1.0,
            locate: LocateOptions::default(),
            label: DEFAULT_LABEL.to_string(),
            label_similarity: DEFAULT_LABEL_SIMILARITY,
            min_aspect: DEFAULT_MIN_ASPECT,
            max_aspect: DEFAULT_MAX_ASPECT,
            min_area_fraction: DEFAULT_MIN_AREA_FRACTION,
            debug_dir: None,
        }
    }
}

impl MatriculaOptions {
    /// Create a new options builder
    pub fn builder() -> MatriculaOptionsBuilder {
        MatriculaOptionsBuilder::default()
    }

    /// The original cascade: first valid candidate wins
    pub fn cascade() -> Self {
        Self {
            mode: ExtractionMode::FirstValid,
            ..Default::default()
        }
    }

    /// Whether a box of this shape looks like a number field
    pub fn is_box_like(&self, rect: &PixelRect) -> bool {
        let aspect = rect.aspect_ratio();
        aspect >= self.min_aspect && aspect <= self.max_aspect
    }
}

/// Builder for MatriculaOptions
#[derive(Debug, Default)]
pub struct MatriculaOptionsBuilder {
    options: MatriculaOptions,
}

impl MatriculaOptionsBuilder {
    /// Set the accepted length range (min at least 1, max at least min)
    #[must_use]
    pub fn length_range(mut self, min: usize, max: usize) -> Self {
        let min = min.max(1);
        self.options.min_length = min;
        self.options.max_length = max.max(min);
        self
    }

    /// Set the fixed region
    #[must_use]
    pub fn fixed_roi(mut self, roi: PixelRect) -> Self {
        self.options.fixed_roi = Some(roi);
        self
    }

    /// Set the header template
    #[must_use]
    pub fn header_template(mut self, template: Arc<Template>) -> Self {
        self.options.header_template = Some(template);
        self
    }

    #[must_use]
    pub fn scanned_by_printer(mut self, enabled: bool) -> Self {
        self.options.scanned_by_printer = enabled;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Set the segmentation modes (ignored if empty)
    #[must_use]
    pub fn psm_modes(mut self, modes: Vec<PageSegMode>) -> Self {
        if !modes.is_empty() {
            self.options.psm_modes = modes;
        }
        self
    }

    /// Set the searched band (clamped to 0.05-1.0)
    #[must_use]
    pub fn search_band(mut self, band: f32) -> Self {
        self.options.search_band = band.clamp(0.05, 1.0);
        self
    }

    #[must_use]
    pub fn locate(mut self, locate: LocateOptions) -> Self {
        self.options.locate = locate;
        self
    }

    /// Set the label text and its similarity cutoff (clamped to 0-1)
    #[must_use]
    pub fn label(mut self, label: impl Into<String>, similarity: f64) -> Self {
        self.options.label = label.into();
        self.options.label_similarity = similarity.clamp(0.0, 1.0);
        self
    }

    /// Set the box aspect range (min at least 1)
    #[must_use]
    pub fn aspect_range(mut self, min: f32, max: f32) -> Self {
        let min = min.max(1.0);
        self.options.min_aspect = min;
        self.options.max_aspect = max.max(min);
        self
    }

    #[must_use]
    pub fn debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.debug_dir = Some(dir.into());
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> MatriculaOptions {
        self.options
    }
}
