//! Recognition pipeline integration tests
//!
//! End-to-end runs over synthetic answer sheets with a scripted OCR engine.

use gabarito_scan::matricula::OutcomeKind;
use gabarito_scan::ocr::Result as OcrResult;
use gabarito_scan::{
    AnswerValue, BatchReport, ExtractionMode, FileRasterizer, GridSpec, LocalizationSource,
    MatriculaOptions, NoopProgress, OcrEngine, OcrToken, PageSegMode, PipelineConfig, PixelRect,
    RecognitionPipeline, Roi, StrategyKind, Template, TemplateRole, UnavailableEngine,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::sync::Arc;

/// Answers every digit read with the same text
struct ScriptedOcr(&'static str);

impl OcrEngine for ScriptedOcr {
    fn read_text(&self, _: &GrayImage, digits_only: bool, _: PageSegMode) -> OcrResult<String> {
        Ok(if digits_only { self.0.to_string() } else { String::new() })
    }

    fn read_tokens(&self, _: &GrayImage, _: PageSegMode) -> OcrResult<Vec<OcrToken>> {
        Ok(Vec::new())
    }
}

const FORM_X: i32 = 180;
const FORM_Y: i32 = 140;
const FORM_W: u32 = 240;
const FORM_H: u32 = 160;

/// Blank answer form: frame, printed blocks and four bubble outlines
fn draw_form(img: &mut RgbImage, x: i32, y: i32) {
    draw_hollow_rect_mut(img, Rect::at(x, y).of_size(FORM_W, FORM_H), Rgb([20, 20, 20]));
    draw_filled_rect_mut(img, Rect::at(x + 10, y + 10).of_size(60, 25), Rgb([40, 40, 40]));
    draw_filled_rect_mut(img, Rect::at(x + 120, y + 12).of_size(50, 20), Rgb([60, 60, 60]));
    draw_filled_circle_mut(img, (x + 205, y + 30), 14, Rgb([30, 30, 30]));
    for i in 0..4 {
        draw_hollow_rect_mut(img, Rect::at(x + 25 + i * 50, y + 105).of_size(40, 30), Rgb([90, 90, 90]));
    }
}

/// 640x480 page with the form placed and alternative `marked` filled
fn answered_sheet(marked: usize) -> DynamicImage {
    let mut img = RgbImage::from_pixel(640, 480, Rgb([235, 235, 235]));
    draw_form(&mut img, FORM_X, FORM_Y);
    let cell_x = FORM_X + 25 + marked as i32 * 50;
    draw_filled_rect_mut(&mut img, Rect::at(cell_x, FORM_Y + 105).of_size(40, 30), Rgb([15, 15, 15]));
    DynamicImage::ImageRgb8(img)
}

fn form_template() -> Template {
    let mut img = RgbImage::from_pixel(FORM_W, FORM_H, Rgb([235, 235, 235]));
    draw_form(&mut img, 0, 0);
    Template::new("form", TemplateRole::AnswerArea, DynamicImage::ImageRgb8(img).to_luma8())
}

/// One question whose four cells sit on the bubble outlines, in canvas coordinates
fn form_grid() -> GridSpec {
    GridSpec::from_rois(vec![Roi::new(20, 100, 200, 40)], 4)
}

fn templated_config() -> PipelineConfig {
    PipelineConfig::new(form_grid())
        .with_canvas(FORM_W, FORM_H)
        .with_answer_template(Arc::new(form_template()))
        .with_threads(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gabarito_scan::PageId;

    // TC-PIPE-001: template localization, rectification and bubble read
    #[test]
    fn test_templated_sheet_reads_marked_alternative() {
        let pipeline = RecognitionPipeline::new(
            templated_config(),
            Arc::new(ScriptedOcr("2023001")),
            Arc::new(FileRasterizer::default()),
        )
        .unwrap();

        let result = pipeline.process_page(&answered_sheet(2), PageId::new("turma.png", 0, 0));

        assert_eq!(result.localization, LocalizationSource::Template);
        assert!(result.template_score.unwrap() > 0.5);
        assert_eq!(result.preview.dimensions(), (FORM_W, FORM_H));
        assert_eq!(result.answers.len(), 1);
        assert_eq!(result.answers[0].value, AnswerValue::Alternative('C'));
    }

    // TC-PIPE-002: fixed ROI matrícula wins on confidence
    #[test]
    fn test_fixed_roi_matricula_selected() {
        let matricula = MatriculaOptions::builder()
            .fixed_roi(PixelRect::new(20, 20, 200, 60))
            .build();
        let pipeline = RecognitionPipeline::new(
            templated_config().with_matricula(matricula),
            Arc::new(ScriptedOcr("2023001")),
            Arc::new(FileRasterizer::default()),
        )
        .unwrap();

        let result = pipeline.process_page(&answered_sheet(0), PageId::new("turma.png", 0, 0));

        assert!(result.matricula.valid);
        assert_eq!(result.matricula.text, "2023001");
        assert_eq!(result.matricula.strategy, Some(StrategyKind::FixedRoi));
        assert_eq!(result.answers[0].value, AnswerValue::Alternative('A'));
    }

    // TC-PIPE-003: first-valid mode skips the remaining strategies
    #[test]
    fn test_first_valid_mode_skips_later_strategies() {
        let matricula = MatriculaOptions::builder()
            .fixed_roi(PixelRect::new(20, 20, 200, 60))
            .mode(ExtractionMode::FirstValid)
            .build();
        let pipeline = RecognitionPipeline::new(
            templated_config().with_matricula(matricula),
            Arc::new(ScriptedOcr("2023001")),
            Arc::new(FileRasterizer::default()),
        )
        .unwrap();

        let result = pipeline.process_page(&answered_sheet(1), PageId::new("turma.png", 0, 0));

        assert_eq!(result.matricula.strategy, Some(StrategyKind::FixedRoi));
        assert!(result.matricula.outcomes[1..]
            .iter()
            .all(|o| o.kind == OutcomeKind::Skipped));
    }

    // TC-PIPE-004: no OCR engine still yields answers
    #[test]
    fn test_missing_ocr_keeps_answers() {
        let pipeline = RecognitionPipeline::new(
            templated_config(),
            Arc::new(UnavailableEngine::new("tesseract not installed")),
            Arc::new(FileRasterizer::default()),
        )
        .unwrap();

        let result = pipeline.process_page(&answered_sheet(3), PageId::new("turma.png", 0, 0));

        assert_eq!(result.answers[0].value, AnswerValue::Alternative('D'));
        assert!(!result.matricula.valid);
        assert!(result.matricula.text.is_empty());
        assert!(result
            .matricula
            .outcomes
            .iter()
            .all(|o| !matches!(o.kind, OutcomeKind::Candidate { .. })));
    }

    // TC-PIPE-005: image files on disk through the batch API and report
    #[test]
    fn test_batch_over_image_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("aluno_1.png");
        let second = dir.path().join("aluno_2.png");
        answered_sheet(0).save(&first).unwrap();
        answered_sheet(3).save(&second).unwrap();
        let missing = dir.path().join("ausente.png");

        let pipeline = RecognitionPipeline::new(
            templated_config(),
            Arc::new(ScriptedOcr("2023001")),
            Arc::new(FileRasterizer::default()),
        )
        .unwrap();
        let docs = pipeline.process_batch(&[first, missing, second], &NoopProgress);

        assert_eq!(docs.len(), 3);
        assert!(docs[0].is_ok());
        assert!(!docs[1].is_ok());
        assert!(docs[2].is_ok());
        assert_eq!(docs[0].pages[0].answers[0].value, AnswerValue::Alternative('A'));
        assert_eq!(docs[2].pages[0].answers[0].value, AnswerValue::Alternative('D'));
        assert_eq!(docs[2].pages[0].page.document_index, 2);

        let report = BatchReport::from_documents(&docs, false).unwrap();
        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.complete_pages(), 2);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["pages"][1]["answers"][0]["value"], "D");
        assert_eq!(json["pages"][1]["localization"], "template");
    }

    // TC-PIPE-006: a form that is not on the page falls back to page coordinates
    #[test]
    fn test_unmatched_template_passes_through() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 480, Luma([235])));
        let pipeline = RecognitionPipeline::new(
            templated_config(),
            Arc::new(UnavailableEngine::new("none")),
            Arc::new(FileRasterizer::default()),
        )
        .unwrap();

        let result = pipeline.process_page(&blank, PageId::new("branco.png", 0, 0));

        assert_eq!(result.localization, LocalizationSource::None);
        assert_eq!(result.preview.dimensions(), (640, 480));
        assert_eq!(result.answers.len(), 1);
        assert!(result.diagnostics.iter().any(|d| d.contains("template")));
    }
}
