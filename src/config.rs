//! Configuration file support
//!
//! A typed, validated run configuration read from TOML (or JSON for
//! `.json` files). The original application's JSON key names are accepted
//! as aliases, so its `config.json` loads unchanged.
//!
//! Lookup order: an explicit path, then `./gabarito.toml`, then
//! `<user config dir>/gabarito-scan/config.toml`.

use crate::bubble::{
    BubbleOptions, GridSpec, PartialRoiPolicy, Roi, DEFAULT_ALTERNATIVES, DEFAULT_THRESHOLD_FILL,
    MAX_ALTERNATIVES, MIN_ALTERNATIVES,
};
use crate::localize::{LocalizeError, PixelRect, Point, Quadrilateral, Template, TemplateRole};
use crate::matricula::{ExtractionMode, MatriculaOptions, DEFAULT_MAX_LENGTH, DEFAULT_MIN_LENGTH};
use crate::pipeline::{PipelineConfig, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};
use crate::rasterize::{DEFAULT_DPI, MAX_DPI, MIN_DPI};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Config file name searched in the working directory
pub const LOCAL_CONFIG_FILE: &str = "gabarito.toml";

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "gabarito-scan";

// ============================================================
// Error Types
// ============================================================

/// Configuration errors; all of them are fatal for the run
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("No answer grid configured (`grid` / `grid_rois`)")]
    MissingGrid,

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Template error: {0}")]
    Template(#[from] LocalizeError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// File Configuration
// ============================================================

/// Template file with an optional score override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub min_score: Option<f32>,
}

/// Run configuration as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base bubble fill threshold
    #[serde(default = "default_threshold_fill")]
    pub threshold_fill: f32,

    /// Alternatives per question unless an ROI overrides it
    #[serde(default = "default_alternatives")]
    pub alternatives: u32,

    /// Columns of question ROIs, in canvas coordinates
    #[serde(default, alias = "grid_rois")]
    pub grid: Option<Vec<Vec<Roi>>>,

    #[serde(default = "default_canvas_width", alias = "largura_corrigida")]
    pub canvas_width: u32,

    #[serde(default = "default_canvas_height", alias = "altura_corrigida")]
    pub canvas_height: u32,

    #[serde(default)]
    pub answer_template: Option<TemplateConfig>,

    /// Legacy answer template path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,

    /// Four corners of the answer area, any order
    #[serde(default, alias = "pts_ref")]
    pub reference_points: Option<Vec<[f32; 2]>>,

    #[serde(default)]
    pub header_template: Option<TemplateConfig>,

    /// Legacy header template path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matricula_template_path: Option<PathBuf>,

    /// Legacy header template threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matricula_template_threshold: Option<f32>,

    /// Fixed matrícula region on the original page
    #[serde(default)]
    pub matricula_roi: Option<PixelRect>,

    #[serde(default = "default_min_length")]
    pub matricula_min_length: usize,

    #[serde(default = "default_max_length")]
    pub matricula_max_length: usize,

    #[serde(default)]
    pub matricula_mode: ExtractionMode,

    /// Equalize fixed-ROI crops before the digit pipeline
    #[serde(default)]
    pub scanned_by_printer: bool,

    /// Localize every page instead of once per document
    #[serde(default = "default_true")]
    pub localize_each_page: bool,

    #[serde(default = "default_dpi", alias = "dpi_processamento")]
    pub dpi: u32,

    /// Worker threads (CPU count when unset)
    #[serde(default)]
    pub threads: Option<usize>,

    #[serde(default)]
    pub debug_dir: Option<PathBuf>,

    #[serde(default)]
    pub draw_overlay: bool,

    #[serde(default)]
    pub partial_roi: PartialRoiPolicy,

    /// Tesseract language(s)
    #[serde(default)]
    pub ocr_language: Option<String>,

    /// Only the first N pages of each document
    #[serde(default)]
    pub max_pages: Option<usize>,
}

// Default value functions
fn default_threshold_fill() -> f32 {
    DEFAULT_THRESHOLD_FILL
}

fn default_alternatives() -> u32 {
    DEFAULT_ALTERNATIVES
}

fn default_canvas_width() -> u32 {
    DEFAULT_CANVAS_WIDTH
}

fn default_canvas_height() -> u32 {
    DEFAULT_CANVAS_HEIGHT
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_true() -> bool {
    true
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold_fill: default_threshold_fill(),
            alternatives: default_alternatives(),
            grid: None,
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            answer_template: None,
            template_path: None,
            reference_points: None,
            header_template: None,
            matricula_template_path: None,
            matricula_template_threshold: None,
            matricula_roi: None,
            matricula_min_length: default_min_length(),
            matricula_max_length: default_max_length(),
            matricula_mode: ExtractionMode::default(),
            scanned_by_printer: false,
            localize_each_page: true,
            dpi: default_dpi(),
            threads: None,
            debug_dir: None,
            draw_overlay: false,
            partial_roi: PartialRoiPolicy::default(),
            ocr_language: None,
            max_pages: None,
        }
    }
}

impl Config {
    /// Search the default locations; defaults when no file exists
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                debug!(path = %path.display(), "Using config file");
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Default locations, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(CONFIG_DIR_NAME).join("config.toml"));
        }
        paths
    }

    /// Load a specific file; `.json` parses as JSON, anything else as TOML
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Self::from_toml_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply command-line overrides on top of the file values
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(v) = cli.threshold_fill {
            merged.threshold_fill = v;
        }
        if let Some(v) = cli.dpi {
            merged.dpi = v;
        }
        if let Some(v) = cli.threads {
            merged.threads = Some(v);
        }
        if let Some(v) = &cli.debug_dir {
            merged.debug_dir = Some(v.clone());
        }
        if let Some(v) = cli.draw_overlay {
            merged.draw_overlay = v;
        }
        if let Some(v) = cli.localize_each_page {
            merged.localize_each_page = v;
        }
        if let Some(v) = cli.scanned_by_printer {
            merged.scanned_by_printer = v;
        }
        if let Some(v) = cli.matricula_min_length {
            merged.matricula_min_length = v;
        }
        if let Some(v) = cli.matricula_max_length {
            merged.matricula_max_length = v;
        }
        if let Some(v) = cli.matricula_mode {
            merged.matricula_mode = v;
        }
        if let Some(v) = cli.partial_roi {
            merged.partial_roi = v;
        }
        if let Some(v) = &cli.ocr_language {
            merged.ocr_language = Some(v.clone());
        }
        if let Some(v) = cli.max_pages {
            merged.max_pages = Some(v);
        }
        merged
    }

    /// Answer template, with the legacy key as fallback
    pub fn answer_template_config(&self) -> Option<TemplateConfig> {
        self.answer_template.clone().or_else(|| {
            self.template_path.as_ref().map(|path| TemplateConfig {
                path: path.clone(),
                min_score: None,
            })
        })
    }

    /// Header template, with the legacy keys as fallback
    pub fn header_template_config(&self) -> Option<TemplateConfig> {
        self.header_template.clone().or_else(|| {
            self.matricula_template_path.as_ref().map(|path| TemplateConfig {
                path: path.clone(),
                min_score: self.matricula_template_threshold,
            })
        })
    }

    /// Check every value; nothing is loaded from disk here
    pub fn validate(&self) -> Result<()> {
        let grid = self.grid.as_ref().ok_or(ConfigError::MissingGrid)?;
        if grid.iter().all(Vec::is_empty) {
            return Err(ConfigError::MissingGrid);
        }

        if !(self.threshold_fill > 0.0 && self.threshold_fill <= 1.0) {
            return Err(invalid("threshold_fill", format!("{} not in (0, 1]", self.threshold_fill)));
        }
        if !(MIN_ALTERNATIVES..=MAX_ALTERNATIVES).contains(&self.alternatives) {
            return Err(invalid(
                "alternatives",
                format!("{} not in {}..={}", self.alternatives, MIN_ALTERNATIVES, MAX_ALTERNATIVES),
            ));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(invalid(
                "canvas_width/canvas_height",
                format!("{}x{}", self.canvas_width, self.canvas_height),
            ));
        }
        if let Some(points) = &self.reference_points {
            if points.len() != 4 {
                return Err(invalid("reference_points", format!("expected 4 points, got {}", points.len())));
            }
            if points.iter().flatten().any(|v| !v.is_finite()) {
                return Err(invalid("reference_points", "non-finite coordinate".to_string()));
            }
        }
        if self.matricula_min_length == 0 || self.matricula_min_length > self.matricula_max_length {
            return Err(invalid(
                "matricula_min_length/matricula_max_length",
                format!("{}..{}", self.matricula_min_length, self.matricula_max_length),
            ));
        }
        if let Some(roi) = &self.matricula_roi {
            if roi.width == 0 || roi.height == 0 {
                return Err(invalid("matricula_roi", format!("empty region {:?}", roi)));
            }
        }
        if !(MIN_DPI..=MAX_DPI).contains(&self.dpi) {
            return Err(invalid("dpi", format!("{} not in {}..={}", self.dpi, MIN_DPI, MAX_DPI)));
        }
        if self.threads == Some(0) {
            return Err(invalid("threads", "must be at least 1".to_string()));
        }
        if self.max_pages == Some(0) {
            return Err(invalid("max_pages", "must be at least 1".to_string()));
        }
        for (field, template) in [
            ("answer_template.min_score", self.answer_template_config()),
            ("header_template.min_score", self.header_template_config()),
        ] {
            if let Some(score) = template.and_then(|t| t.min_score) {
                if !(-1.0..=1.0).contains(&score) {
                    return Err(invalid(field, format!("{score} not in [-1, 1]")));
                }
            }
        }

        let outside = grid
            .iter()
            .flatten()
            .filter(|roi| {
                roi.x < 0
                    || roi.y < 0
                    || roi.x + roi.width > self.canvas_width as i32
                    || roi.y + roi.height > self.canvas_height as i32
            })
            .count();
        if outside > 0 {
            warn!(count = outside, "ROIs extend past the canvas and will be reported as invalid");
        }
        Ok(())
    }

    /// Grid spec from the configured columns
    pub fn grid_spec(&self) -> Result<GridSpec> {
        let columns = self.grid.clone().ok_or(ConfigError::MissingGrid)?;
        Ok(GridSpec::new(columns, self.alternatives))
    }

    /// Validate, load the templates and build the pipeline settings
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        self.validate()?;

        let bubble = BubbleOptions::builder()
            .threshold_fill(self.threshold_fill)
            .partial_roi(self.partial_roi)
            .build();

        let mut matricula = MatriculaOptions::builder()
            .length_range(self.matricula_min_length, self.matricula_max_length)
            .scanned_by_printer(self.scanned_by_printer)
            .mode(self.matricula_mode);
        if let Some(roi) = self.matricula_roi {
            matricula = matricula.fixed_roi(roi);
        }
        if let Some(header) = self.header_template_config() {
            matricula = matricula.header_template(Arc::new(load_template(&header, TemplateRole::Header)?));
        }

        let mut config = PipelineConfig::new(self.grid_spec()?)
            .with_canvas(self.canvas_width, self.canvas_height)
            .with_bubble(bubble)
            .with_matricula(matricula.build())
            .with_localize_each_page(self.localize_each_page)
            .with_overlay(self.draw_overlay);
        config.dpi = self.dpi;
        config.max_pages = self.max_pages;
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(dir) = &self.debug_dir {
            config = config.with_debug_dir(dir);
        }
        if let Some(answer) = self.answer_template_config() {
            config = config.with_answer_template(Arc::new(load_template(&answer, TemplateRole::AnswerArea)?));
        }
        if let Some(points) = &self.reference_points {
            let corners = [0, 1, 2, 3].map(|i| Point::new(points[i][0], points[i][1]));
            config = config.with_reference_points(Quadrilateral::from_unordered(corners));
        }
        Ok(config)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

fn load_template(config: &TemplateConfig, role: TemplateRole) -> Result<Template> {
    let template = Template::load(&config.path, role)?;
    Ok(match config.min_score {
        Some(score) => template.with_min_score(score),
        None => template,
    })
}

// ============================================================
// CLI Overrides
// ============================================================

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threshold_fill: Option<f32>,
    pub dpi: Option<u32>,
    pub threads: Option<usize>,
    pub debug_dir: Option<PathBuf>,
    pub draw_overlay: Option<bool>,
    pub localize_each_page: Option<bool>,
    pub scanned_by_printer: Option<bool>,
    pub matricula_min_length: Option<usize>,
    pub matricula_max_length: Option<usize>,
    pub matricula_mode: Option<ExtractionMode>,
    pub partial_roi: Option<PartialRoiPolicy>,
    pub ocr_language: Option<String>,
    pub max_pages: Option<usize>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}
