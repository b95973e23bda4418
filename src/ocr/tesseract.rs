//! Tesseract CLI engine
//!
//! Writes each region to a temporary PNG and runs the `tesseract` binary,
//! reading plain text from stdout or word tokens from its TSV output.

use super::types::{OcrEngine, OcrError, OcrOptions, OcrToken, PageSegMode, Result, DIGIT_WHITELIST};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

/// TSV row level for words
const TSV_WORD_LEVEL: u32 = 5;

/// Number of TSV columns
const TSV_FIELDS: usize = 12;

/// `tesseract` command-line engine
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    options: OcrOptions,
}

impl TesseractEngine {
    /// Resolve the executable and create the engine
    pub fn new(options: OcrOptions) -> Result<Self> {
        let executable = match &options.executable {
            Some(path) if path.exists() => path.clone(),
            Some(path) => return Err(OcrError::EngineNotFound(path.display().to_string())),
            None => which::which("tesseract")
                .map_err(|_| OcrError::EngineNotFound("tesseract".to_string()))?,
        };
        Ok(Self { executable, options })
    }

    /// Whether `tesseract` is on PATH
    pub fn is_available() -> bool {
        which::which("tesseract").is_ok()
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn base_command(&self, input: &Path, mode: PageSegMode) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input).arg("stdout");
        if let Some(dir) = &self.options.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l")
            .arg(&self.options.language)
            .arg("--psm")
            .arg(mode.as_number().to_string());
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<String> {
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn write_region(region: &GrayImage) -> Result<NamedTempFile> {
        if region.width() == 0 || region.height() == 0 {
            return Err(OcrError::EmptyRegion);
        }
        let file = NamedTempFile::with_suffix(".png")?;
        region.save(file.path())?;
        Ok(file)
    }
}

impl OcrEngine for TesseractEngine {
    fn read_text(&self, region: &GrayImage, digits_only: bool, mode: PageSegMode) -> Result<String> {
        let input = Self::write_region(region)?;
        let mut cmd = self.base_command(input.path(), mode);
        if digits_only {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={DIGIT_WHITELIST}"));
        }
        let text = self.run(cmd)?;
        debug!(psm = mode.as_number(), digits_only, text = text.trim(), "Tesseract read");
        Ok(text.trim().to_string())
    }

    fn read_tokens(&self, region: &GrayImage, mode: PageSegMode) -> Result<Vec<OcrToken>> {
        let input = Self::write_region(region)?;
        let mut cmd = self.base_command(input.path(), mode);
        cmd.arg("tsv");
        let tsv = self.run(cmd)?;
        let tokens = parse_tsv(&tsv);
        debug!(psm = mode.as_number(), count = tokens.len(), "Tesseract tokens");
        Ok(tokens)
    }
}

/// Parse Tesseract TSV output into word tokens
///
/// Fields: level, page, block, par, line, word, left, top, width, height,
/// conf, text. Only word rows with text and a non-negative confidence are
/// kept.
pub fn parse_tsv(tsv: &str) -> Vec<OcrToken> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < TSV_FIELDS {
                return None;
            }
            let num = |i: usize| fields[i].trim().parse::<u32>().ok();
            if num(0)? != TSV_WORD_LEVEL {
                return None;
            }
            let confidence: f32 = fields[10].trim().parse().ok()?;
            let text = fields[11].trim();
            if text.is_empty() || confidence < 0.0 {
                return None;
            }
            Some(OcrToken {
                text: text.to_string(),
                confidence,
                left: num(6)?,
                top: num(7)?,
                width: num(8)?,
                height: num(9)?,
                line_key: (num(2)?, num(3)?, num(4)?),
                word: num(5)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t200\t-1\t
4\t1\t1\t1\t1\t0\t20\t30\t400\t40\t-1\t
5\t1\t1\t1\t1\t1\t20\t30\t150\t40\t91.5\tMATRICULA:
5\t1\t1\t1\t1\t2\t190\t30\t120\t40\t88.25\t2023001
5\t1\t1\t1\t1\t3\t320\t30\t20\t40\t-1\t
5\t1\t1\t1\t2\t1\t20\t90\t60\t40\t45\tNome
";

    #[test]
    fn test_parse_tsv_words_only() {
        let tokens = parse_tsv(SAMPLE_TSV);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "MATRICULA:");
        assert_eq!(tokens[0].confidence, 91.5);
        assert_eq!(tokens[1].text, "2023001");
        assert_eq!(tokens[1].left, 190);
        assert_eq!(tokens[1].line_key, (1, 1, 1));
        assert_eq!(tokens[1].word, 2);
        assert_eq!(tokens[2].line_key, (1, 1, 2));
    }

    #[test]
    fn test_parse_tsv_malformed_rows() {
        let tsv = "header\n5\t1\t1\n5\tx\t1\t1\t1\t1\t0\t0\t1\t1\t90\tabc\n";
        // Short row skipped; the page column is not used
        let tokens = parse_tsv(tsv);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "abc");
        assert!(parse_tsv("").is_empty());
    }

    #[test]
    fn test_missing_executable() {
        let options = OcrOptions {
            executable: Some(PathBuf::from("/nonexistent/tesseract")),
            ..Default::default()
        };
        let result = TesseractEngine::new(options);
        assert!(matches!(result, Err(OcrError::EngineNotFound(_))));
    }

    #[test]
    fn test_empty_region_rejected() {
        assert!(matches!(
            TesseractEngine::write_region(&GrayImage::new(0, 5)),
            Err(OcrError::EmptyRegion)
        ));
    }
}
