//! Bubble module core types
//!
//! Grid definitions, per-question results and the decision policy.

use crate::image_ops::{BlendOptions, ClaheOptions};
use crate::localize::PixelRect;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Default base fill threshold
pub const DEFAULT_THRESHOLD_FILL: f32 = 0.3;

/// Default number of alternatives per question
pub const DEFAULT_ALTERNATIVES: u32 = 4;

/// Fewest alternatives a question may have
pub const MIN_ALTERNATIVES: u32 = 2;

/// Most alternatives a question may have
pub const MAX_ALTERNATIVES: u32 = 5;

/// Labels for alternatives, in sub-region order
pub const ALTERNATIVE_LABELS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// Minimum base threshold (clamp for builder setters)
pub const MIN_THRESHOLD_FILL: f32 = 0.01;

/// Maximum base threshold (clamp for builder setters)
pub const MAX_THRESHOLD_FILL: f32 = 1.0;

// ============================================================
// Error Types
// ============================================================

/// Bubble debug output errors
///
/// Detection itself never fails; bad ROIs become
/// [`AnswerValue::InvalidRoi`].
#[derive(Debug, Error)]
pub enum BubbleError {
    #[error("Failed to write debug image {path}: {source}")]
    DebugWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BubbleError>;

// ============================================================
// Grid
// ============================================================

/// One question's bubble group, in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    #[serde(default, deserialize_with = "nullable_dimension")]
    pub width: i32,
    #[serde(default, deserialize_with = "nullable_dimension")]
    pub height: i32,
    /// Overrides the grid's alternatives count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<u32>,
    /// Explicit logical question number (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<u32>,
}

impl Roi {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            alternatives: None,
            question: None,
        }
    }

    #[must_use]
    pub fn with_question(mut self, question: u32) -> Self {
        self.question = Some(question);
        self
    }

    #[must_use]
    pub fn with_alternatives(mut self, alternatives: u32) -> Self {
        self.alternatives = Some(alternatives);
        self
    }

    /// Clip against the canvas and split into alternative cells
    ///
    /// The last cell absorbs the division remainder.
    pub fn layout(
        &self,
        canvas_width: u32,
        canvas_height: u32,
        alternatives: u32,
        partial: PartialRoiPolicy,
    ) -> Option<RoiLayout> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        if !(MIN_ALTERNATIVES..=MAX_ALTERNATIVES).contains(&alternatives) {
            return None;
        }

        let x0 = i64::from(self.x);
        let y0 = i64::from(self.y);
        let x1 = x0 + i64::from(self.width);
        let y1 = y0 + i64::from(self.height);
        let cx0 = x0.max(0);
        let cy0 = y0.max(0);
        let cx1 = x1.min(i64::from(canvas_width));
        let cy1 = y1.min(i64::from(canvas_height));
        if cx1 <= cx0 || cy1 <= cy0 {
            return None;
        }
        let clipped = (cx0, cy0, cx1, cy1) != (x0, y0, x1, y1);
        if clipped && partial == PartialRoiPolicy::Reject {
            return None;
        }

        let width = (cx1 - cx0) as u32;
        let height = (cy1 - cy0) as u32;
        if width < alternatives {
            return None;
        }

        let rect = PixelRect::new(cx0 as u32, cy0 as u32, width, height);
        let cell_w = width / alternatives;
        let cells = (0..alternatives)
            .map(|i| {
                let w = if i + 1 == alternatives {
                    width - i * cell_w
                } else {
                    cell_w
                };
                PixelRect::new(rect.x + i * cell_w, rect.y, w, height)
            })
            .collect();

        Some(RoiLayout {
            rect,
            cells,
            clipped,
        })
    }
}

/// Missing or `null` dimensions read as 0, which marks the ROI invalid
fn nullable_dimension<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or(0))
}

/// Canvas-space geometry of a valid ROI
#[derive(Debug, Clone, PartialEq)]
pub struct RoiLayout {
    /// The (possibly clipped) ROI rectangle
    pub rect: PixelRect,
    /// One rectangle per alternative, left to right
    pub cells: Vec<PixelRect>,
    /// Whether the ROI was clipped to the canvas
    pub clipped: bool,
}

/// A question bound to its ROI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridQuestion {
    /// Logical question number (1-based)
    pub question: u32,
    pub roi: Roi,
    pub alternatives: u32,
}

/// Columns of ROIs, one ROI per question
///
/// Questions are numbered column-major (down the first column, then the
/// next) unless an ROI carries an explicit number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub columns: Vec<Vec<Roi>>,
    pub alternatives: u32,
}

impl GridSpec {
    pub fn new(columns: Vec<Vec<Roi>>, alternatives: u32) -> Self {
        Self {
            columns,
            alternatives,
        }
    }

    /// Single-column grid
    pub fn from_rois(rois: Vec<Roi>, alternatives: u32) -> Self {
        Self::new(vec![rois], alternatives)
    }

    /// Number of questions
    pub fn len(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Questions in raster (column-major) order
    pub fn questions(&self) -> Vec<GridQuestion> {
        self.columns
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, roi)| GridQuestion {
                question: roi.question.unwrap_or(i as u32 + 1),
                roi: *roi,
                alternatives: roi.alternatives.unwrap_or(self.alternatives),
            })
            .collect()
    }
}

// ============================================================
// Results
// ============================================================

/// Resolved value of one question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerValue {
    /// A single marked alternative
    Alternative(char),
    /// Nothing marked
    Blank,
    /// Several comparable marks
    Multiple,
    /// The ROI could not be measured
    InvalidRoi,
}

impl AnswerValue {
    pub fn is_answered(&self) -> bool {
        matches!(self, AnswerValue::Alternative(_))
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Alternative(c) => write!(f, "{c}"),
            AnswerValue::Blank => f.write_str("blank"),
            AnswerValue::Multiple => f.write_str("multiple"),
            AnswerValue::InvalidRoi => f.write_str("invalid-roi"),
        }
    }
}

/// Per-question detection outcome
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionResult {
    /// Logical question number (1-based)
    pub question: u32,
    pub value: AnswerValue,
    /// Chosen by dominance among several marks
    pub weak: bool,
    /// Fill ratio of each alternative cell
    pub fill_ratios: Vec<f32>,
    pub max_fill: f32,
    /// Effective threshold after the adaptive adjustment
    pub threshold: f32,
}

impl QuestionResult {
    /// Result for an ROI that could not be measured
    pub fn invalid(question: u32, threshold: f32) -> Self {
        Self {
            question,
            value: AnswerValue::InvalidRoi,
            weak: false,
            fill_ratios: Vec::new(),
            max_fill: 0.0,
            threshold,
        }
    }
}

// ============================================================
// Options
// ============================================================

/// How an ROI extending past the canvas is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialRoiPolicy {
    /// Report it as invalid
    #[default]
    Reject,
    /// Measure the part inside the canvas
    Clip,
}

/// Ratio cutoffs of the adaptive decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    /// Below `base * light_band` the sheet counts as lightly marked
    pub light_band: f32,
    /// Effective threshold factor for lightly marked sheets
    pub light_factor: f32,
    /// Above `base * dark_band` the sheet counts as dark
    pub dark_band: f32,
    /// Effective threshold factor for dark sheets
    pub dark_factor: f32,
    /// A mark must reach this fraction of the maximum
    pub relative_floor: f32,
    /// A lone mark at or above this fraction of the maximum dominates
    pub dominance: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            light_band: 0.5,
            light_factor: 0.6,
            dark_band: 3.0,
            dark_factor: 1.5,
            relative_floor: 0.6,
            dominance: 0.85,
        }
    }
}

/// Bubble detection options
#[derive(Debug, Clone)]
pub struct BubbleOptions {
    /// Base fill threshold
    pub threshold_fill: f32,
    pub policy: DecisionPolicy,
    pub partial_roi: PartialRoiPolicy,
    /// Local contrast before binarization
    pub clahe: ClaheOptions,
    /// Global/adaptive binarization blend
    pub blend: BlendOptions,
}

impl Default for BubbleOptions {
    fn default() -> Self {
        Self {
            threshold_fill: DEFAULT_THRESHOLD_FILL,
            policy: DecisionPolicy::default(),
            partial_roi: PartialRoiPolicy::default(),
            clahe: ClaheOptions::default(),
            blend: BlendOptions::default(),
        }
    }
}

impl BubbleOptions {
    /// Create a new options builder
    pub fn builder() -> BubbleOptionsBuilder {
        BubbleOptionsBuilder::default()
    }

    /// Lower threshold for light pencil marks
    pub fn lenient() -> Self {
        Self {
            threshold_fill: 0.2,
            ..Default::default()
        }
    }

    /// Higher threshold for noisy scans
    pub fn strict() -> Self {
        Self {
            threshold_fill: 0.4,
            ..Default::default()
        }
    }
}

/// Builder for BubbleOptions
#[derive(Debug, Default)]
pub struct BubbleOptionsBuilder {
    options: BubbleOptions,
}

impl BubbleOptionsBuilder {
    /// Set the base fill threshold (clamped to 0.01-1.0)
    #[must_use]
    pub fn threshold_fill(mut self, threshold: f32) -> Self {
        self.options.threshold_fill = threshold.clamp(MIN_THRESHOLD_FILL, MAX_THRESHOLD_FILL);
        self
    }

    /// Set the decision policy
    #[must_use]
    pub fn policy(mut self, policy: DecisionPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    /// Set the partial-ROI policy
    #[must_use]
    pub fn partial_roi(mut self, partial: PartialRoiPolicy) -> Self {
        self.options.partial_roi = partial;
        self
    }

    /// Set CLAHE options
    #[must_use]
    pub fn clahe(mut self, clahe: ClaheOptions) -> Self {
        self.options.clahe = clahe;
        self
    }

    /// Set binarization options
    #[must_use]
    pub fn blend(mut self, blend: BlendOptions) -> Self {
        self.options.blend = blend;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> BubbleOptions {
        self.options
    }
}
