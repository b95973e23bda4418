//! OCR module
//!
//! The [`OcrEngine`] trait the recognition core reads text through, and a
//! default engine backed by the `tesseract` command-line tool.
//!
//! # Features
//!
//! - Plain-text reads with an optional digit whitelist
//! - Word tokens with confidence and bounding boxes (TSV output)
//! - Page segmentation mode per call
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{OcrEngine, OcrOptions, PageSegMode, TesseractEngine};
//!
//! let engine = TesseractEngine::new(OcrOptions::default()).unwrap();
//! let region = image::open("matricula.png").unwrap().to_luma8();
//! let digits = engine.read_text(&region, true, PageSegMode::SingleLine).unwrap();
//! println!("Read: {digits}");
//! ```

mod tesseract;
mod types;

pub use tesseract::{parse_tsv, TesseractEngine};
pub use types::{
    OcrEngine, OcrError, OcrOptions, OcrToken, PageSegMode, Result, UnavailableEngine,
    DEFAULT_DIGIT_MODES, DEFAULT_LANGUAGE, DIGIT_WHITELIST,
};

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    /// Engine returning a fixed string, to check the trait is object safe
    struct Fixed(&'static str);

    impl OcrEngine for Fixed {
        fn read_text(&self, _: &GrayImage, _: bool, _: PageSegMode) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn read_tokens(&self, _: &GrayImage, _: PageSegMode) -> Result<Vec<OcrToken>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_engine_as_trait_object() {
        let engine: Box<dyn OcrEngine> = Box::new(Fixed("12345"));
        let text = engine
            .read_text(&GrayImage::new(1, 1), true, PageSegMode::SingleLine)
            .unwrap();
        assert_eq!(text, "12345");
    }

    #[test]
    fn test_error_types() {
        let _err1 = OcrError::EngineNotFound("tesseract".to_string());
        let _err2 = OcrError::EmptyRegion;
        let _err3: OcrError = std::io::Error::other("test").into();
    }
}
