//! Document Rasterization module
//!
//! Turns input documents into page bitmaps. PDFs are rendered with the
//! Poppler `pdftoppm` tool; image files load directly as one-page documents.
//!
//! Rendering never fails from the caller's point of view: [`Rasterizer::render`]
//! logs the cause and returns an empty list, so a batch can report and skip
//! the document.
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{FileRasterizer, Rasterizer};
//! use std::path::Path;
//!
//! let rasterizer = FileRasterizer::default();
//! let pages = rasterizer.render(Path::new("provas.pdf"), 300);
//! println!("{} pages", pages.len());
//! ```

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================
// Constants
// ============================================================

/// Default rendering resolution
pub const DEFAULT_DPI: u32 = 300;

/// Minimum rendering resolution
pub const MIN_DPI: u32 = 72;

/// Maximum rendering resolution
pub const MAX_DPI: u32 = 1200;

/// Image extensions loaded directly
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// File name prefix of rendered pages inside the temporary directory
const PAGE_PREFIX: &str = "page";

// ============================================================
// Error Types
// ============================================================

/// Rasterization errors
#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("Input not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported input type: {0}")]
    Unsupported(PathBuf),

    #[error("pdftoppm not found on PATH")]
    ToolNotFound,

    #[error("Failed to read PDF: {0}")]
    PdfRead(#[from] lopdf::Error),

    #[error("PDF has no pages")]
    NoPages,

    #[error("pdftoppm failed ({status}): {stderr}")]
    RenderFailed { status: String, stderr: String },

    #[error("Failed to load page image: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RasterizeError>;

// ============================================================
// Input Kind
// ============================================================

/// Kind of input document, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(InputKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(InputKind::Image)
        } else {
            None
        }
    }
}

// ============================================================
// Rasterizer Trait
// ============================================================

/// Document to ordered page bitmaps
pub trait Rasterizer: Send + Sync {
    /// Render every page; empty on any failure
    fn render(&self, path: &Path, dpi: u32) -> Vec<DynamicImage>;
}

/// `pdftoppm`-backed PDF rasterizer
#[derive(Debug, Clone, Default)]
pub struct PdftoppmRasterizer {
    /// Explicit executable; looked up on PATH when `None`
    pub executable: Option<PathBuf>,
    /// Render at most this many pages
    pub max_pages: Option<usize>,
}

impl PdftoppmRasterizer {
    /// Whether `pdftoppm` is on PATH
    pub fn is_available() -> bool {
        which::which("pdftoppm").is_ok()
    }

    /// Page count read from the PDF structure
    pub fn page_count(path: &Path) -> Result<usize> {
        let doc = lopdf::Document::load(path)?;
        Ok(doc.get_pages().len())
    }

    /// Render with error reporting
    pub fn try_render(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>> {
        if !path.exists() {
            return Err(RasterizeError::NotFound(path.to_path_buf()));
        }
        let executable = match &self.executable {
            Some(exe) => exe.clone(),
            None => which::which("pdftoppm").map_err(|_| RasterizeError::ToolNotFound)?,
        };

        let mut pages = Self::page_count(path)?;
        if let Some(max) = self.max_pages {
            pages = pages.min(max);
        }
        if pages == 0 {
            return Err(RasterizeError::NoPages);
        }

        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join(PAGE_PREFIX);
        let dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        debug!(path = %path.display(), pages, dpi, "Rendering PDF");

        let output = Command::new(executable)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(pages.to_string())
            .arg(path)
            .arg(&prefix)
            .output()?;
        if !output.status.success() {
            return Err(RasterizeError::RenderFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut rendered: Vec<(u32, PathBuf)> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|p| rendered_page_number(&p).map(|n| (n, p)))
            .collect();
        rendered.sort_by_key(|(n, _)| *n);

        rendered
            .into_iter()
            .map(|(_, p)| image::open(&p).map_err(RasterizeError::from))
            .collect()
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn render(&self, path: &Path, dpi: u32) -> Vec<DynamicImage> {
        match self.try_render(path, dpi) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "PDF rasterization failed");
                Vec::new()
            }
        }
    }
}

/// Page number of a `pdftoppm` output file (`page-01.png`, `page-1.png`)
fn rendered_page_number(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (prefix, number) = stem.rsplit_once('-')?;
    if prefix != PAGE_PREFIX {
        return None;
    }
    number.parse().ok()
}

/// Load an image file as a single-page document
pub fn load_image_document(path: &Path) -> Result<Vec<DynamicImage>> {
    if !path.exists() {
        return Err(RasterizeError::NotFound(path.to_path_buf()));
    }
    Ok(vec![image::open(path)?])
}

/// Rasterizer dispatching on the input extension
#[derive(Debug, Clone, Default)]
pub struct FileRasterizer {
    pub pdf: PdftoppmRasterizer,
}

impl FileRasterizer {
    /// Render with error reporting
    pub fn try_render(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>> {
        match InputKind::from_path(path) {
            Some(InputKind::Pdf) => self.pdf.try_render(path, dpi),
            Some(InputKind::Image) => load_image_document(path),
            None => Err(RasterizeError::Unsupported(path.to_path_buf())),
        }
    }
}

impl Rasterizer for FileRasterizer {
    fn render(&self, path: &Path, dpi: u32) -> Vec<DynamicImage> {
        match self.try_render(path, dpi) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load document");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_input_kind() {
        assert_eq!(InputKind::from_path(Path::new("a.PDF")), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_path(Path::new("a.jpeg")), Some(InputKind::Image));
        assert_eq!(InputKind::from_path(Path::new("a.TIFF")), Some(InputKind::Image));
        assert_eq!(InputKind::from_path(Path::new("a.docx")), None);
        assert_eq!(InputKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_rendered_page_number() {
        assert_eq!(rendered_page_number(Path::new("/tmp/x/page-01.png")), Some(1));
        assert_eq!(rendered_page_number(Path::new("/tmp/x/page-12.png")), Some(12));
        assert_eq!(rendered_page_number(Path::new("/tmp/x/page-3.png")), Some(3));
        assert_eq!(rendered_page_number(Path::new("/tmp/x/other-3.png")), None);
        assert_eq!(rendered_page_number(Path::new("/tmp/x/page-3.ppm")), None);
    }

    #[test]
    fn test_load_image_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sheet.png");
        RgbImage::from_pixel(8, 6, Rgb([255, 255, 255])).save(&path).unwrap();

        let pages = FileRasterizer::default().render(&path, DEFAULT_DPI);
        assert_eq!(pages.len(), 1);
        assert_eq!((pages[0].width(), pages[0].height()), (8, 6));
    }

    #[test]
    fn test_missing_and_unsupported_inputs_are_empty() {
        let rasterizer = FileRasterizer::default();
        assert!(rasterizer.render(Path::new("/nonexistent/provas.pdf"), 300).is_empty());
        assert!(rasterizer.render(Path::new("/nonexistent/sheet.png"), 300).is_empty());
        assert!(rasterizer.render(Path::new("notes.txt"), 300).is_empty());
    }

    #[test]
    fn test_invalid_pdf_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let rasterizer = PdftoppmRasterizer {
            executable: Some(PathBuf::from("/bin/true")),
            max_pages: None,
        };
        assert!(matches!(rasterizer.try_render(&path, 300), Err(RasterizeError::PdfRead(_))));
        assert!(rasterizer.render(&path, 300).is_empty());
    }
}
