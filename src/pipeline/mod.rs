//! Recognition Pipeline module
//!
//! Sequences localization, rectification and bubble detection for each
//! page and reads the matrícula alongside on the original page.
//!
//! # Features
//!
//! - Answer template, reference points or pass-through localization
//! - Bubble detection and matrícula OCR run concurrently per page
//! - Pages processed on a bounded worker pool, results in page order
//! - Optional localize-once-per-document mode
//! - Cooperative cancellation between pages and documents
//! - Per-page debug dumps under a timestamped run directory
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{
//!     FileRasterizer, GridSpec, NoopProgress, OcrOptions, PipelineConfig,
//!     RecognitionPipeline, Roi, TesseractEngine,
//! };
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let grid = GridSpec::from_rois(vec![Roi::new(60, 200, 160, 30)], 4);
//! let ocr = TesseractEngine::new(OcrOptions::portuguese()).unwrap();
//! let pipeline = RecognitionPipeline::new(
//!     PipelineConfig::new(grid),
//!     Arc::new(ocr),
//!     Arc::new(FileRasterizer::default()),
//! )
//! .unwrap();
//!
//! for doc in pipeline.process_batch(&[PathBuf::from("turma_a.pdf")], &NoopProgress) {
//!     for page in &doc.pages {
//!         println!("{}: {} answered", page.page, page.answered_count());
//!     }
//! }
//! ```

mod recognize;
mod types;

pub use recognize::RecognitionPipeline;
pub use types::{
    CancellationToken, DocumentResult, Localization, LocalizationSource, PageId, PageResult,
    PipelineConfig, PipelineError, Result, DEBUG_STAMP_FORMAT, DEFAULT_CANVAS_HEIGHT,
    DEFAULT_CANVAS_WIDTH,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_types() {
        let _err1 = PipelineError::EmptyDocument(PathBuf::from("a.pdf"));
        let _err2 = PipelineError::Cancelled;
        let _err3 = PipelineError::ThreadPool("x".into());
        let _err4 = PipelineError::DebugOutput("x".into());
        let _err5: PipelineError = std::io::Error::other("x").into();
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::EmptyDocument(PathBuf::from("turma.pdf"));
        assert!(err.to_string().contains("turma.pdf"));
    }
}
