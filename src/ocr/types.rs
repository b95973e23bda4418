//! OCR module core types

use image::GrayImage;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Default Tesseract language
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Character whitelist used for digit-only reads
pub const DIGIT_WHITELIST: &str = "0123456789";

/// Page segmentation modes tried in order for digit reads
pub const DEFAULT_DIGIT_MODES: [PageSegMode; 4] = [
    PageSegMode::SingleLine,
    PageSegMode::SingleWord,
    PageSegMode::SingleBlock,
    PageSegMode::RawLine,
];

// ============================================================
// Error Types
// ============================================================

/// OCR errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not found: {0}")]
    EngineNotFound(String),

    #[error("Region is empty")]
    EmptyRegion,

    #[error("Failed to write OCR input image: {0}")]
    ImageWrite(#[from] image::ImageError),

    #[error("OCR engine failed ({status}): {stderr}")]
    EngineFailed { status: String, stderr: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OcrError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Tesseract page segmentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSegMode {
    /// Fully automatic (3)
    Auto,
    /// Single uniform block of text (6)
    SingleBlock,
    /// Single text line (7)
    SingleLine,
    /// Single word (8)
    SingleWord,
    /// Single character (10)
    SingleChar,
    /// Raw line, bypassing Tesseract-specific hacks (13)
    RawLine,
}

impl PageSegMode {
    /// Numeric `--psm` value
    pub fn as_number(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SingleWord => 8,
            PageSegMode::SingleChar => 10,
            PageSegMode::RawLine => 13,
        }
    }

    /// Parse a numeric `--psm` value
    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            3 => Some(PageSegMode::Auto),
            6 => Some(PageSegMode::SingleBlock),
            7 => Some(PageSegMode::SingleLine),
            8 => Some(PageSegMode::SingleWord),
            10 => Some(PageSegMode::SingleChar),
            13 => Some(PageSegMode::RawLine),
            _ => None,
        }
    }
}

/// One recognized word with its confidence and position
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    /// Engine confidence, 0-100
    pub confidence: f32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Block, paragraph and line numbers, for reading order
    pub line_key: (u32, u32, u32),
    /// Word number within its line
    pub word: u32,
}

/// Tesseract engine options
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Recognition language(s), e.g. `eng` or `por+eng`
    pub language: String,
    /// Explicit `tesseract` executable; looked up on PATH when `None`
    pub executable: Option<PathBuf>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            executable: None,
            tessdata_dir: None,
        }
    }
}

impl OcrOptions {
    /// Portuguese with English fallback
    pub fn portuguese() -> Self {
        Self {
            language: "por+eng".to_string(),
            ..Default::default()
        }
    }
}

// ============================================================
// Engine Trait
// ============================================================

/// OCR over a pixel region
///
/// Implementations may block for seconds per call and must be shareable
/// across worker threads.
pub trait OcrEngine: Send + Sync {
    /// Read the region as plain text
    fn read_text(&self, region: &GrayImage, digits_only: bool, mode: PageSegMode) -> Result<String>;

    /// Read the region as positioned word tokens
    fn read_tokens(&self, region: &GrayImage, mode: PageSegMode) -> Result<Vec<OcrToken>>;
}

/// Stand-in when no OCR engine is installed
///
/// Every read fails, so matrícula strategies report failures while bubble
/// detection carries on.
#[derive(Debug, Clone, Default)]
pub struct UnavailableEngine {
    pub reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl OcrEngine for UnavailableEngine {
    fn read_text(&self, _region: &GrayImage, _digits_only: bool, _mode: PageSegMode) -> Result<String> {
        Err(OcrError::EngineNotFound(self.reason.clone()))
    }

    fn read_tokens(&self, _region: &GrayImage, _mode: PageSegMode) -> Result<Vec<OcrToken>> {
        Err(OcrError::EngineNotFound(self.reason.clone()))
    }
}
