//! Progress reporting for batch recognition.
//!
//! A callback trait the pipeline reports through, and the end-of-run
//! summary.

use crate::pipeline::{DocumentResult, LocalizationSource};
use std::fmt::Write as _;

// ============================================================
// Callback
// ============================================================

/// Progress sink for the recognition pipeline
///
/// Called from worker threads; implementations must be thread-safe.
pub trait ProgressCallback: Send + Sync {
    /// A step (document or stage) started
    fn on_step_start(&self, step: &str);

    /// `current` of `total` items done
    fn on_step_progress(&self, current: usize, total: usize);

    /// A step finished
    fn on_step_complete(&self, step: &str, message: &str);

    /// Detail message
    fn on_debug(&self, message: &str);
}

/// Callback that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_step_start(&self, _step: &str) {}
    fn on_step_progress(&self, _current: usize, _total: usize) {}
    fn on_step_complete(&self, _step: &str, _message: &str) {}
    fn on_debug(&self, _message: &str) {}
}

// ============================================================
// Summary
// ============================================================

/// Document and page counts over a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub files: usize,
    pub failed_files: usize,
    pub pages: usize,
    pub questions: usize,
    pub answered: usize,
    pub valid_matriculas: usize,
    pub unlocalized_pages: usize,
}

impl BatchSummary {
    /// Count every document and page of a finished batch
    pub fn from_documents(documents: &[DocumentResult]) -> Self {
        let mut summary = Self::default();
        for doc in documents {
            summary.files += 1;
            if !doc.is_ok() {
                summary.failed_files += 1;
            }
            for page in &doc.pages {
                summary.record_page(
                    page.answers.len(),
                    page.answered_count(),
                    page.matricula.valid,
                    page.localization != LocalizationSource::None,
                );
            }
        }
        summary
    }

    /// Add one page's counts
    pub fn record_page(&mut self, questions: usize, answered: usize, matricula_valid: bool, localized: bool) {
        self.pages += 1;
        self.questions += questions;
        self.answered += answered;
        if matricula_valid {
            self.valid_matriculas += 1;
        }
        if !localized {
            self.unlocalized_pages += 1;
        }
    }

    /// Summary block as printed at the end of a run
    pub fn render(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Recognition Summary");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  Total files:      {}", self.files);
        let _ = writeln!(out, "  Succeeded:        {}", self.files - self.failed_files);
        let _ = writeln!(out, "  Errors:           {}", self.failed_files);
        let _ = writeln!(out, "  Pages:            {}", self.pages);
        let _ = writeln!(out, "  Answered:         {}/{}", self.answered, self.questions);
        let _ = writeln!(out, "  Valid matrículas: {}", self.valid_matriculas);
        let _ = writeln!(out, "  Not localized:    {}", self.unlocalized_pages);
        let _ = writeln!(out, "{rule}");
        out
    }

    pub fn print(&self) {
        println!();
        print!("{}", self.render());
        println!();
    }
}
