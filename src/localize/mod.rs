//! Template Localization module
//!
//! Finds a reference template (answer area or header) on a scanned page.
//!
//! # Features
//!
//! - Zero-mean normalized cross-correlation (scores in [-1, 1])
//! - Grid search over page scale (0.7x-1.3x) and rotation (-2..+2 degrees)
//! - Coarse search in parallel, refinement of the winner at higher resolution
//! - Oversized templates are shrunk to fit instead of failing
//! - Corner mapping back to page coordinates, consistently ordered
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{LocateOptions, Template, TemplateLocalizer, TemplateRole};
//! use std::path::Path;
//!
//! let template = Template::load(Path::new("gabarito.png"), TemplateRole::AnswerArea).unwrap();
//! let page = image::open("page_001.png").unwrap().to_luma8();
//!
//! let result = TemplateLocalizer::locate(&page, &template, &LocateOptions::default());
//! match result.accepted(template.min_score) {
//!     Some(quad) => println!("Found at {:?} (score {:.3})", quad, result.score),
//!     None => println!("Low score {:.3}, use reference points", result.score),
//! }
//! ```

mod matcher;
mod types;

pub use matcher::TemplateLocalizer;
pub use types::{
    LocalizeError, LocateOptions, LocateOptionsBuilder, LocateResult, PixelRect, Point,
    Quadrilateral, Result, Template, TemplateRole, DEFAULT_ANSWER_MIN_SCORE,
    DEFAULT_HEADER_MIN_SCORE,
};
