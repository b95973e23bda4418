//! Bubble Grid Detection module
//!
//! Reads which alternative is filled for each question of a rectified sheet.
//!
//! # Features
//!
//! - CLAHE + blended Otsu/adaptive binarization for uneven illumination
//! - 3x3 open/close clean-up of speckle and broken pen strokes
//! - Per-alternative fill ratios with an adaptive threshold
//! - Dominance check between near-tied marks, never a silent guess
//! - Per-ROI bounds safety: bad ROIs become `invalid-roi`, never a panic
//! - Results sorted by logical question number
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{BubbleGridDetector, BubbleOptions, GridSpec, Roi};
//!
//! let canvas = image::open("rectified.png").unwrap().to_luma8();
//! let grid = GridSpec::new(
//!     vec![vec![Roi::new(60, 100, 160, 28), Roi::new(60, 140, 160, 28)]],
//!     4,
//! );
//! let options = BubbleOptions::builder().threshold_fill(0.3).build();
//!
//! for result in BubbleGridDetector::detect(&canvas, &grid, &options) {
//!     println!("Q{}: {}", result.question, result.value);
//! }
//! ```

mod debug;
mod decision;
mod detect;
mod types;

pub use debug::{draw_grid_overlay, write_debug_images, OVERLAY_COLOR};
pub use decision::Decision;
pub use detect::BubbleGridDetector;
pub use types::{
    AnswerValue, BubbleError, BubbleOptions, BubbleOptionsBuilder, DecisionPolicy, GridQuestion,
    GridSpec, PartialRoiPolicy, QuestionResult, Result, Roi, RoiLayout, ALTERNATIVE_LABELS,
    DEFAULT_ALTERNATIVES, DEFAULT_THRESHOLD_FILL, MAX_ALTERNATIVES, MIN_ALTERNATIVES,
};
