//! Per-page recognition and batch scheduling

use super::types::{
    CancellationToken, DocumentResult, Localization, LocalizationSource, PageId, PageResult,
    PipelineConfig, PipelineError, Result, DEBUG_STAMP_FORMAT,
};
use crate::bubble::{draw_grid_overlay, write_debug_images, BubbleGridDetector, QuestionResult};
use crate::localize::TemplateLocalizer;
use crate::matricula::{MatriculaExtractor, MatriculaResult};
use crate::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use crate::rasterize::Rasterizer;
use crate::rectify::PerspectiveRectifier;
use image::{DynamicImage, GrayImage, RgbImage};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Localize → rectify → bubbles, with the matrícula read alongside
pub struct RecognitionPipeline {
    config: PipelineConfig,
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn Rasterizer>,
    extractor: MatriculaExtractor,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
    run_stamp: String,
}

impl RecognitionPipeline {
    /// Build a pipeline with its own worker pool
    pub fn new(config: PipelineConfig, ocr: Arc<dyn OcrEngine>, rasterizer: Arc<dyn Rasterizer>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.thread_count())
            .thread_name(|i| format!("gabarito-{i}"))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
        let run_stamp = chrono::Local::now().format(DEBUG_STAMP_FORMAT).to_string();

        Ok(Self {
            config,
            ocr,
            rasterizer,
            extractor: MatriculaExtractor::default(),
            pool,
            cancel: CancellationToken::new(),
            run_stamp,
        })
    }

    /// Replace the matrícula extractor
    #[must_use]
    pub fn with_extractor(mut self, extractor: MatriculaExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Token that stops the batch before the next page or document
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Debug directory of this run, `<debug_dir>/<timestamp>`
    pub fn debug_run_dir(&self) -> Option<PathBuf> {
        self.config.debug_dir.as_ref().map(|d| d.join(&self.run_stamp))
    }

    // ============================================================
    // Single page
    // ============================================================

    /// Recognize one page, localizing it on its own
    ///
    /// Never fails; problems end up in `diagnostics`.
    pub fn process_page(&self, page: &DynamicImage, id: PageId) -> PageResult {
        let gray = page.to_luma8();
        let localization = self.localize(&gray);
        self.recognize(page, &gray, id, localization)
    }

    /// Answer-area quadrilateral: template, then reference points, then none
    pub fn localize(&self, gray: &GrayImage) -> Localization {
        let mut diagnostics = Vec::new();
        let mut template_score = None;

        if let Some(template) = &self.config.answer_template {
            let found = TemplateLocalizer::locate(gray, template, &self.config.locate);
            template_score = Some(found.score);
            if let Some(quad) = found.accepted(template.min_score) {
                return Localization {
                    quad: Some(quad),
                    source: LocalizationSource::Template,
                    template_score,
                    diagnostics,
                };
            }
            diagnostics.push(format!(
                "answer template score {:.3} below minimum {:.3}",
                found.score, template.min_score
            ));
        }

        if let Some(quad) = self.config.reference_points {
            if self.config.answer_template.is_some() {
                diagnostics.push("using reference points".to_string());
            }
            return Localization {
                quad: Some(quad),
                source: LocalizationSource::ReferencePoints,
                template_score,
                diagnostics,
            };
        }

        diagnostics.push("answer area not localized; grid read in page coordinates".to_string());
        Localization {
            quad: None,
            source: LocalizationSource::None,
            template_score,
            diagnostics,
        }
    }

    /// Recognize a page with a known localization
    #[instrument(skip_all, fields(page = %id))]
    pub fn recognize(&self, page: &DynamicImage, gray: &GrayImage, id: PageId, localization: Localization) -> PageResult {
        let Localization {
            quad,
            mut source,
            template_score,
            mut diagnostics,
        } = localization;
        let page_debug = self.debug_run_dir().map(|d| d.join(id.debug_dir_name()));

        let rgb = page.to_rgb8();
        let canvas = match quad {
            Some(quad) => match PerspectiveRectifier::rectify(
                &rgb,
                &quad,
                self.config.canvas_width,
                self.config.canvas_height,
            ) {
                Ok(canvas) => canvas,
                Err(e) => {
                    warn!(error = %e, "Rectification failed, using the original page");
                    diagnostics.push(format!("rectification failed: {e}"));
                    source = LocalizationSource::None;
                    rgb.clone()
                }
            },
            None => rgb.clone(),
        };

        let mut matricula_options = self.config.matricula.clone();
        if let Some(dir) = &page_debug {
            matricula_options.debug_dir = Some(dir.clone());
        }

        let (answers, matricula): (Vec<QuestionResult>, MatriculaResult) = rayon::join(
            || {
                let canvas_gray = image::imageops::grayscale(&canvas);
                BubbleGridDetector::detect(&canvas_gray, &self.config.grid, &self.config.bubble)
            },
            || self.extractor.extract(gray, self.ocr.as_ref(), &matricula_options),
        );

        if let Some(dir) = &page_debug {
            if let Err(e) = self.write_page_debug(dir, page, &canvas) {
                warn!(dir = %dir.display(), error = %e, "Failed to write debug images");
                diagnostics.push(e.to_string());
            }
        }

        if !matricula.valid {
            diagnostics.push("no valid matrícula".to_string());
        }

        let preview = if self.config.draw_overlay {
            draw_grid_overlay(&canvas, &self.config.grid)
        } else {
            canvas
        };

        let result = PageResult {
            page: id,
            answers,
            matricula,
            preview,
            template_score,
            localization: source,
            diagnostics,
        };
        info!(
            answered = result.answered_count(),
            questions = result.answers.len(),
            matricula = %result.matricula.text,
            localization = ?result.localization,
            "Page recognized"
        );
        result
    }

    fn write_page_debug(&self, dir: &Path, page: &DynamicImage, canvas: &RgbImage) -> Result<()> {
        let image_err = |e: image::ImageError| PipelineError::DebugOutput(e.to_string());
        fs::create_dir_all(dir)?;
        page.save(dir.join("original.png")).map_err(image_err)?;
        canvas.save(dir.join("rectified.png")).map_err(image_err)?;

        let canvas_gray = image::imageops::grayscale(canvas);
        let mask = BubbleGridDetector::binarize(&canvas_gray, &self.config.bubble);
        write_debug_images(dir, &mask, &self.config.grid, &self.config.bubble)
            .map_err(|e| PipelineError::DebugOutput(e.to_string()))?;
        debug!(dir = %dir.display(), "Page debug images written");
        Ok(())
    }

    // ============================================================
    // Documents and batches
    // ============================================================

    /// Recognize already-rendered pages of one document
    ///
    /// Pages run on the worker pool and come back in page order. After a
    /// cancellation the pages that finished are kept and
    /// [`PipelineError::Cancelled`] is returned alongside them.
    pub fn process_pages(
        &self,
        document: &str,
        document_index: usize,
        pages: &[DynamicImage],
        progress: &dyn ProgressCallback,
    ) -> (Vec<PageResult>, Option<PipelineError>) {
        let shared = if self.config.localize_each_page {
            None
        } else {
            pages.first().map(|first| self.localize(&first.to_luma8()))
        };

        let total = pages.len();
        let done = AtomicUsize::new(0);
        let mut results: Vec<PageResult> = self.pool.install(|| {
            pages
                .par_iter()
                .enumerate()
                .filter_map(|(index, page)| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let id = PageId::new(document, document_index, index);
                    let gray = page.to_luma8();
                    let localization = match &shared {
                        Some(l) => l.clone(),
                        None => self.localize(&gray),
                    };
                    let result = self.recognize(page, &gray, id, localization);
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.on_step_progress(n, total);
                    Some(result)
                })
                .collect()
        });
        results.sort_by_key(|r| r.page.page_index);

        if results.len() < total {
            info!(document, finished = results.len(), total, "Document cancelled");
            return (results, Some(PipelineError::Cancelled));
        }
        (results, None)
    }

    /// Rasterize and recognize one document
    ///
    /// Never fails as a whole: render failures and cancellation are
    /// reported in [`DocumentResult::error`] next to any finished pages.
    #[instrument(skip(self, progress), fields(path = %path.display()))]
    pub fn process_document(
        &self,
        path: &Path,
        document_index: usize,
        progress: &dyn ProgressCallback,
    ) -> DocumentResult {
        let failed = |error: PipelineError| DocumentResult {
            path: path.to_path_buf(),
            document_index,
            pages: Vec::new(),
            error: Some(error),
        };
        if self.cancel.is_cancelled() {
            return failed(PipelineError::Cancelled);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        progress.on_step_start(&name);
        let mut pages = self.rasterizer.render(path, self.config.dpi);
        if pages.is_empty() {
            return failed(PipelineError::EmptyDocument(path.to_path_buf()));
        }
        if let Some(max) = self.config.max_pages {
            pages.truncate(max);
        }
        progress.on_debug(&format!("{} page(s) rendered at {} dpi", pages.len(), self.config.dpi));

        let (results, error) = self.process_pages(&name, document_index, &pages, progress);
        progress.on_step_complete(&name, &format!("{} page(s)", results.len()));
        DocumentResult {
            path: path.to_path_buf(),
            document_index,
            pages: results,
            error,
        }
    }

    /// Recognize every document; one failing document never stops the rest
    pub fn process_batch(&self, paths: &[PathBuf], progress: &dyn ProgressCallback) -> Vec<DocumentResult> {
        let mut out = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = paths.len() - index, "Batch cancelled");
                break;
            }
            let doc = self.process_document(path, index, progress);
            if let Some(e) = &doc.error {
                warn!(path = %path.display(), error = %e, pages = doc.pages.len(), "Document failed");
            }
            out.push(doc);
        }
        out
    }
}
