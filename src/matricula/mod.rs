//! Matrícula Extraction module
//!
//! Recovers the printed student ID from the original (un-rectified) page
//! with several independent localization + OCR strategies.
//!
//! # Features
//!
//! - Fixed ROI, header template, contour shape, line geometry and
//!   whole-region ensemble strategies
//! - Digit-oriented preprocessing with adaptive morphology
//! - Confusable-character correction and plausibility validation
//! - Label token search ("MATRÍCULA: 2023001") with fuzzy matching
//! - Exhaustive (parallel) or first-valid scheduling
//! - Per-strategy diagnostic outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{
//!     MatriculaExtractor, MatriculaOptions, OcrOptions, PixelRect, TesseractEngine,
//! };
//!
//! let page = image::open("page.png").unwrap().to_luma8();
//! let ocr = TesseractEngine::new(OcrOptions::default()).unwrap();
//! let options = MatriculaOptions::builder()
//!     .fixed_roi(PixelRect::new(120, 80, 400, 90))
//!     .length_range(5, 10)
//!     .build();
//!
//! let result = MatriculaExtractor::default().extract(&page, &ocr, &options);
//! if result.valid {
//!     println!("Matrícula {} ({:.2})", result.text, result.confidence);
//! }
//! ```

mod extract;
pub mod preprocess;
mod strategies;
mod types;
pub mod validate;

pub use extract::MatriculaExtractor;
pub use strategies::{
    default_strategies, read_digits, search_band, ContourStrategy, EnsembleStrategy,
    FixedRoiStrategy, HeaderTemplateStrategy, LineStrategy, MatriculaStrategy, StrategyContext,
};
pub use types::{
    ExtractionMode, MatriculaCandidate, MatriculaOptions, MatriculaOptionsBuilder,
    MatriculaResult, OutcomeKind, Result, StrategyError, StrategyKind, StrategyOutcome,
    DEFAULT_MAX_LENGTH, DEFAULT_MIN_LENGTH,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let opts = MatriculaOptions::default();
        assert_eq!(opts.min_length, 4);
        assert_eq!(opts.max_length, 10);
        assert_eq!(opts.mode, ExtractionMode::Exhaustive);
        assert_eq!(opts.search_band, 1.0);
        assert!(opts.fixed_roi.is_none());
        assert!(opts.header_template.is_none());
    }

    #[test]
    fn test_error_types() {
        let _err1 = StrategyError::EmptyPage;
        let _err2 = StrategyError::RegionOutside(crate::localize::PixelRect::new(0, 0, 1, 1));
        let _err3: StrategyError = crate::ocr::OcrError::EmptyRegion.into();
    }

    #[test]
    fn test_result_serializes() {
        let result = MatriculaResult {
            text: "2023001".into(),
            confidence: 0.9,
            valid: true,
            strategy: Some(StrategyKind::FixedRoi),
            outcomes: vec![StrategyOutcome {
                strategy: StrategyKind::FixedRoi,
                kind: OutcomeKind::Candidate {
                    text: "2023001".into(),
                    confidence: 0.9,
                },
            }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["strategy"], "fixed_roi");
        assert_eq!(json["outcomes"][0]["kind"]["kind"], "candidate");
    }
}
