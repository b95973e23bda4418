//! JSON report of recognized pages
//!
//! Serializable projections of [`PageResult`] for export and UI
//! consumers. The rectified preview can be embedded as a base64 PNG.

use crate::bubble::QuestionResult;
use crate::matricula::{MatriculaResult, StrategyOutcome};
use crate::pipeline::{DocumentResult, LocalizationSource, PageId, PageResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Report errors
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to encode preview: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Page identity as reported
#[derive(Debug, Clone, Serialize)]
pub struct PageRef {
    pub document: String,
    pub document_index: usize,
    pub page_index: usize,
    /// Human-readable `<document> p.<n>`
    pub label: String,
}

impl From<&PageId> for PageRef {
    fn from(id: &PageId) -> Self {
        Self {
            document: id.document.clone(),
            document_index: id.document_index,
            page_index: id.page_index,
            label: id.to_string(),
        }
    }
}

/// One question
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReport {
    pub question: u32,
    /// `A`..`E`, `blank`, `multiple` or `invalid-roi`
    pub value: String,
    pub weak: bool,
    pub fill_ratios: Vec<f32>,
    pub max_fill: f32,
    pub threshold: f32,
}

impl AnswerReport {
    pub fn is_answered(&self) -> bool {
        self.value.len() == 1
    }
}

impl From<&QuestionResult> for AnswerReport {
    fn from(q: &QuestionResult) -> Self {
        Self {
            question: q.question,
            value: q.value.to_string(),
            weak: q.weak,
            fill_ratios: q.fill_ratios.clone(),
            max_fill: q.max_fill,
            threshold: q.threshold,
        }
    }
}

/// Selected matrícula
#[derive(Debug, Clone, Serialize)]
pub struct MatriculaReport {
    pub value: String,
    pub confidence: f32,
    pub valid: bool,
    pub strategy: Option<String>,
    /// What every strategy produced
    pub outcomes: Vec<StrategyOutcome>,
}

impl From<&MatriculaResult> for MatriculaReport {
    fn from(m: &MatriculaResult) -> Self {
        Self {
            value: m.text.clone(),
            confidence: m.confidence,
            valid: m.valid,
            strategy: m.strategy.map(|s| s.as_str().to_string()),
            outcomes: m.outcomes.clone(),
        }
    }
}

/// One page
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: PageRef,
    pub answers: Vec<AnswerReport>,
    pub matricula: MatriculaReport,
    pub template_score: Option<f32>,
    pub localization: LocalizationSource,
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_png_base64: Option<String>,
}

impl PageReport {
    /// Project a page result, optionally embedding the preview
    pub fn from_result(result: &PageResult, include_preview: bool) -> Result<Self> {
        let preview_png_base64 = if include_preview {
            Some(encode_png_base64(&result.preview)?)
        } else {
            None
        };
        Ok(Self {
            page: PageRef::from(&result.page),
            answers: result.answers.iter().map(AnswerReport::from).collect(),
            matricula: MatriculaReport::from(&result.matricula),
            template_score: result.template_score,
            localization: result.localization,
            diagnostics: result.diagnostics.clone(),
            preview_png_base64,
        })
    }

    /// Answers as `question -> value`, the shape spreadsheet exporters use
    pub fn answer_map(&self) -> Vec<(u32, &str)> {
        self.answers.iter().map(|a| (a.question, a.value.as_str())).collect()
    }
}

/// Document-level failure
#[derive(Debug, Clone, Serialize)]
pub struct DocumentError {
    pub document: String,
    pub error: String,
}

/// Whole run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: chrono::DateTime<chrono::Local>,
    pub version: &'static str,
    pub pages: Vec<PageReport>,
    pub errors: Vec<DocumentError>,
}

impl BatchReport {
    pub fn from_documents(documents: &[DocumentResult], include_preview: bool) -> Result<Self> {
        let mut pages = Vec::new();
        let mut errors = Vec::new();
        for doc in documents {
            for page in &doc.pages {
                pages.push(PageReport::from_result(page, include_preview)?);
            }
            if let Some(e) = &doc.error {
                errors.push(DocumentError {
                    document: doc.path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
        Ok(Self {
            generated_at: chrono::Local::now(),
            version: env!("CARGO_PKG_VERSION"),
            pages,
            errors,
        })
    }

    /// Pages where every question resolved to a single alternative
    pub fn complete_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.answers.iter().all(AnswerReport::is_answered))
            .count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// PNG-encode and base64 an image
pub fn encode_png_base64(image: &RgbImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(STANDARD.encode(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::AnswerValue;
    use crate::matricula::StrategyKind;
    use image::Rgb;

    fn page_result() -> PageResult {
        PageResult {
            page: PageId::new("turma.pdf", 1, 0),
            answers: vec![
                QuestionResult {
                    question: 1,
                    value: AnswerValue::Alternative('B'),
                    weak: false,
                    fill_ratios: vec![0.05, 0.42, 0.06, 0.07],
                    max_fill: 0.42,
                    threshold: 0.3,
                },
                QuestionResult::invalid(2, 0.3),
            ],
            matricula: MatriculaResult {
                text: "2023001".into(),
                confidence: 0.9,
                valid: true,
                strategy: Some(StrategyKind::FixedRoi),
                outcomes: Vec::new(),
            },
            preview: RgbImage::from_pixel(4, 3, Rgb([255, 255, 255])),
            template_score: Some(0.71),
            localization: LocalizationSource::Template,
            diagnostics: vec![],
        }
    }

    #[test]
    fn test_page_report_fields() {
        let report = PageReport::from_result(&page_result(), false).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["page"]["document"], "turma.pdf");
        assert_eq!(json["page"]["document_index"], 1);
        assert_eq!(json["page"]["label"], "turma.pdf p.1");
        assert_eq!(json["answers"][0]["value"], "B");
        assert_eq!(json["answers"][1]["value"], "invalid-roi");
        assert_eq!(json["matricula"]["value"], "2023001");
        assert_eq!(json["matricula"]["strategy"], "fixed_roi");
        assert_eq!(json["localization"], "template");
        assert!(json.get("preview_png_base64").is_none());
        assert_eq!(report.answer_map(), vec![(1, "B"), (2, "invalid-roi")]);
    }

    #[test]
    fn test_preview_is_png() {
        let report = PageReport::from_result(&page_result(), true).unwrap();
        let encoded = report.preview_png_base64.unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn test_batch_report() {
        let docs = vec![
            DocumentResult {
                path: "turma.pdf".into(),
                document_index: 0,
                pages: vec![page_result()],
                error: None,
            },
            DocumentResult {
                path: "vazio.pdf".into(),
                document_index: 1,
                pages: vec![],
                error: Some(crate::pipeline::PipelineError::EmptyDocument("vazio.pdf".into())),
            },
        ];
        let report = BatchReport::from_documents(&docs, false).unwrap();
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].document, "vazio.pdf");
        assert_eq!(report.complete_pages(), 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relatorio.json");
        report.write_to(&path).unwrap();
        let back: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back["pages"][0]["answers"][0]["question"], 1);
    }
}
