//! Localize module core types
//!
//! Geometry primitives shared by the localizer, the rectifier and the
//! matrícula strategies, plus templates and search options.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Smallest page scale tried by the search
pub const DEFAULT_SCALE_MIN: f32 = 0.7;

/// Largest page scale tried by the search
pub const DEFAULT_SCALE_MAX: f32 = 1.3;

/// Scale step
pub const DEFAULT_SCALE_STEP: f32 = 0.1;

/// Most negative rotation tried (degrees)
pub const DEFAULT_ANGLE_MIN: f32 = -2.0;

/// Most positive rotation tried (degrees)
pub const DEFAULT_ANGLE_MAX: f32 = 2.0;

/// Rotation step (degrees)
pub const DEFAULT_ANGLE_STEP: f32 = 1.0;

/// Longest page side during the coarse grid search
pub const DEFAULT_COARSE_MAX_DIMENSION: u32 = 160;

/// Longest page side during refinement of the winning trial
pub const DEFAULT_MATCH_MAX_DIMENSION: u32 = 500;

/// Refinement search radius around the coarse hit (refinement pixels)
pub const DEFAULT_REFINE_RADIUS: u32 = 6;

/// Default minimum score for the answer-area template
pub const DEFAULT_ANSWER_MIN_SCORE: f32 = 0.5;

/// Default minimum score for the header template
pub const DEFAULT_HEADER_MIN_SCORE: f32 = 0.25;

/// Fraction of the page an oversized template is shrunk to
pub const TEMPLATE_FIT_MARGIN: f32 = 0.9;

/// Minimum analysis side (clamp for builder setters)
pub const MIN_ANALYSIS_DIMENSION: u32 = 32;

/// Maximum analysis side (clamp for builder setters)
pub const MAX_ANALYSIS_DIMENSION: u32 = 4096;

// ============================================================
// Error Types
// ============================================================

/// Template loading errors
#[derive(Debug, Error)]
pub enum LocalizeError {
    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Failed to decode template {path}: {source}")]
    TemplateDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Template is empty: {0}")]
    EmptyTemplate(String),
}

pub type Result<T> = std::result::Result<T, LocalizeError>;

// ============================================================
// Geometry
// ============================================================

/// 2-D point in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Rotate about `center` by `radians` (clockwise on screen, y down)
    pub fn rotate_about(self, center: Point, radians: f32) -> Point {
        let (sin, cos) = radians.sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Point::new(
            center.x + dx * cos - dy * sin,
            center.y + dx * sin + dy * cos,
        )
    }

    /// Multiply both coordinates
    pub fn scaled(self, factor: f32) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Axis-aligned integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    #[serde(alias = "w")]
    pub width: u32,
    #[serde(alias = "h")]
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with an image of the given size; `None` when nothing remains
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Width divided by height (0.0 for an empty rectangle)
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// Four corners in top-left, top-right, bottom-right, bottom-left order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub points: [Point; 4],
}

impl Quadrilateral {
    /// Build from corners that are already in canonical order
    pub const fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self {
            points: [top_left, top_right, bottom_right, bottom_left],
        }
    }

    /// Axis-aligned rectangle as a quadrilateral
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        )
    }

    /// Restore canonical order from any permutation of the corners
    ///
    /// Top-left has the smallest `x + y`, bottom-right the largest; top-right
    /// has the smallest `y - x`, bottom-left the largest.
    pub fn from_unordered(points: [Point; 4]) -> Self {
        let by = |key: fn(&Point) -> f32, largest: bool| {
            let mut best = points[0];
            for p in &points[1..] {
                let better = if largest {
                    key(p) > key(&best)
                } else {
                    key(p) < key(&best)
                };
                if better {
                    best = *p;
                }
            }
            best
        };
        let sum = |p: &Point| p.x + p.y;
        let diff = |p: &Point| p.y - p.x;
        Self::new(by(sum, false), by(diff, false), by(sum, true), by(diff, true))
    }

    pub fn top_left(&self) -> Point {
        self.points[0]
    }

    pub fn top_right(&self) -> Point {
        self.points[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.points[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.points[3]
    }

    /// Shoelace area
    pub fn area(&self) -> f32 {
        let mut acc = 0.0f32;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            acc += a.x * b.y - b.x * a.y;
        }
        acc.abs() / 2.0
    }

    /// Enclosing rectangle clamped to an image, `None` if it falls outside
    pub fn bounding_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        let min_x = self.points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = self.points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_x = self.points.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let max_y = self.points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = max_x.ceil().max(0.0) as u32;
        let y1 = max_y.ceil().max(0.0) as u32;
        PixelRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)).clamp_to(width, height)
    }

    /// Points as `(x, y)` tuples, the layout `imageproc` projections expect
    pub fn as_tuples(&self) -> [(f32, f32); 4] {
        self.points.map(|p| (p.x, p.y))
    }
}

// ============================================================
// Templates
// ============================================================

/// What a template is used to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateRole {
    /// The answer-bubble area of the sheet
    AnswerArea,
    /// The header holding the printed matrícula
    Header,
}

impl TemplateRole {
    /// Minimum score a match must reach to be trusted by default
    pub fn default_min_score(self) -> f32 {
        match self {
            TemplateRole::AnswerArea => DEFAULT_ANSWER_MIN_SCORE,
            TemplateRole::Header => DEFAULT_HEADER_MIN_SCORE,
        }
    }
}

/// Immutable reference bitmap with its role and acceptance threshold
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub role: TemplateRole,
    pub min_score: f32,
    pub image: GrayImage,
}

impl Template {
    /// Create a template with the role's default minimum score
    pub fn new(name: impl Into<String>, role: TemplateRole, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            role,
            min_score: role.default_min_score(),
            image,
        }
    }

    /// Override the minimum score (clamped to [-1, 1])
    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(-1.0, 1.0);
        self
    }

    /// Load a template image from disk as grayscale
    pub fn load(path: &Path, role: TemplateRole) -> Result<Self> {
        if !path.exists() {
            return Err(LocalizeError::TemplateNotFound(path.to_path_buf()));
        }
        let image = image::open(path)
            .map_err(|source| LocalizeError::TemplateDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_luma8();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if image.width() == 0 || image.height() == 0 {
            return Err(LocalizeError::EmptyTemplate(name));
        }
        Ok(Self::new(name, role, image))
    }

    /// Whether a match score is good enough to trust
    pub fn accepts(&self, score: f32) -> bool {
        score >= self.min_score
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

// ============================================================
// Options
// ============================================================

/// Template search options
#[derive(Debug, Clone)]
pub struct LocateOptions {
    /// Smallest page scale
    pub scale_min: f32,
    /// Largest page scale
    pub scale_max: f32,
    /// Scale step
    pub scale_step: f32,
    /// Most negative rotation (degrees)
    pub angle_min: f32,
    /// Most positive rotation (degrees)
    pub angle_max: f32,
    /// Rotation step (degrees)
    pub angle_step: f32,
    /// Denoise, equalize and CLAHE the page before matching
    pub enhance: bool,
    /// Longest page side for the coarse grid search
    pub coarse_max_dimension: u32,
    /// Longest page side for refinement
    pub match_max_dimension: u32,
    /// Refinement radius in refinement pixels
    pub refine_radius: u32,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            scale_min: DEFAULT_SCALE_MIN,
            scale_max: DEFAULT_SCALE_MAX,
            scale_step: DEFAULT_SCALE_STEP,
            angle_min: DEFAULT_ANGLE_MIN,
            angle_max: DEFAULT_ANGLE_MAX,
            angle_step: DEFAULT_ANGLE_STEP,
            enhance: true,
            coarse_max_dimension: DEFAULT_COARSE_MAX_DIMENSION,
            match_max_dimension: DEFAULT_MATCH_MAX_DIMENSION,
            refine_radius: DEFAULT_REFINE_RADIUS,
        }
    }
}

impl LocateOptions {
    /// Create a new options builder
    pub fn builder() -> LocateOptionsBuilder {
        LocateOptionsBuilder::default()
    }

    /// Scale search only, no rotation
    pub fn fast() -> Self {
        Self {
            angle_min: 0.0,
            angle_max: 0.0,
            ..Default::default()
        }
    }

    /// Finer scale and rotation steps
    pub fn thorough() -> Self {
        Self {
            scale_step: 0.05,
            angle_step: 0.5,
            coarse_max_dimension: 240,
            ..Default::default()
        }
    }

    /// Scales to try, ascending
    pub fn scales(&self) -> Vec<f32> {
        steps(self.scale_min, self.scale_max, self.scale_step)
    }

    /// Angles to try in degrees, ascending
    pub fn angles(&self) -> Vec<f32> {
        steps(self.angle_min, self.angle_max, self.angle_step)
    }
}

/// Inclusive range with a fixed step, rounded to 1/1000 so that 1.0 and
/// 0.0 come out exact
fn steps(min: f32, max: f32, step: f32) -> Vec<f32> {
    if step <= 0.0 || max < min {
        return vec![min];
    }
    let count = ((max - min) / step + 1e-3).floor() as usize + 1;
    (0..count)
        .map(|i| ((min + i as f32 * step) * 1000.0).round() / 1000.0)
        .collect()
}

/// Builder for LocateOptions
#[derive(Debug, Default)]
pub struct LocateOptionsBuilder {
    options: LocateOptions,
}

impl LocateOptionsBuilder {
    /// Set the scale range (each bound clamped to 0.1-4.0)
    #[must_use]
    pub fn scale_range(mut self, min: f32, max: f32) -> Self {
        let min = min.clamp(0.1, 4.0);
        self.options.scale_min = min;
        self.options.scale_max = max.clamp(min, 4.0);
        self
    }

    /// Set the scale step (clamped to 0.01-1.0)
    #[must_use]
    pub fn scale_step(mut self, step: f32) -> Self {
        self.options.scale_step = step.clamp(0.01, 1.0);
        self
    }

    /// Set the rotation range in degrees (each bound clamped to +-15)
    #[must_use]
    pub fn angle_range(mut self, min: f32, max: f32) -> Self {
        let min = min.clamp(-15.0, 15.0);
        self.options.angle_min = min;
        self.options.angle_max = max.clamp(min, 15.0);
        self
    }

    /// Set the rotation step in degrees (clamped to 0.1-5.0)
    #[must_use]
    pub fn angle_step(mut self, step: f32) -> Self {
        self.options.angle_step = step.clamp(0.1, 5.0);
        self
    }

    /// Enable or disable page enhancement
    #[must_use]
    pub fn enhance(mut self, enhance: bool) -> Self {
        self.options.enhance = enhance;
        self
    }

    /// Set the coarse search resolution (clamped to 32-4096)
    #[must_use]
    pub fn coarse_max_dimension(mut self, dim: u32) -> Self {
        self.options.coarse_max_dimension = dim.clamp(MIN_ANALYSIS_DIMENSION, MAX_ANALYSIS_DIMENSION);
        self
    }

    /// Set the refinement resolution (clamped to 32-4096)
    #[must_use]
    pub fn match_max_dimension(mut self, dim: u32) -> Self {
        self.options.match_max_dimension = dim.clamp(MIN_ANALYSIS_DIMENSION, MAX_ANALYSIS_DIMENSION);
        self
    }

    /// Set the refinement radius (clamped to 0-64)
    #[must_use]
    pub fn refine_radius(mut self, radius: u32) -> Self {
        self.options.refine_radius = radius.min(64);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> LocateOptions {
        self.options
    }
}

// ============================================================
// Result
// ============================================================

/// Outcome of a template search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateResult {
    /// Matched region in page coordinates, `None` if nothing was usable
    pub quad: Option<Quadrilateral>,
    /// Best zero-mean normalized correlation score, in [-1, 1]
    pub score: f32,
    /// Page scale of the winning trial
    pub scale: f32,
    /// Page rotation of the winning trial (degrees)
    pub angle: f32,
}

impl LocateResult {
    /// No usable match
    pub fn none(score: f32) -> Self {
        Self {
            quad: None,
            score,
            scale: 1.0,
            angle: 0.0,
        }
    }

    /// The quadrilateral if the score clears `min_score`
    pub fn accepted(&self, min_score: f32) -> Option<Quadrilateral> {
        self.quad.filter(|_| self.score >= min_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid() {
        let opts = LocateOptions::default();
        let scales = opts.scales();
        assert_eq!(scales.len(), 7);
        assert_eq!(scales[0], 0.7);
        assert!(scales.contains(&1.0));
        assert_eq!(scales[6], 1.3);
        assert_eq!(opts.angles(), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LocateOptions::fast().angles(), vec![0.0]);
        let thorough = LocateOptions::thorough();
        assert_eq!(thorough.scales().len(), 13);
        assert_eq!(thorough.angles().len(), 9);
    }

    #[test]
    fn test_builder_clamping() {
        let opts = LocateOptions::builder()
            .scale_range(0.0, 10.0)
            .scale_step(5.0)
            .angle_range(-90.0, 90.0)
            .coarse_max_dimension(1)
            .refine_radius(1000)
            .build();
        assert_eq!(opts.scale_min, 0.1);
        assert_eq!(opts.scale_max, 4.0);
        assert_eq!(opts.scale_step, 1.0);
        assert_eq!(opts.angle_min, -15.0);
        assert_eq!(opts.angle_max, 15.0);
        assert_eq!(opts.coarse_max_dimension, MIN_ANALYSIS_DIMENSION);
        assert_eq!(opts.refine_radius, 64);
    }

    #[test]
    fn test_quad_from_unordered() {
        let tl = Point::new(10.0, 12.0);
        let tr = Point::new(110.0, 8.0);
        let br = Point::new(112.0, 90.0);
        let bl = Point::new(9.0, 95.0);
        let quad = Quadrilateral::from_unordered([br, tl, bl, tr]);
        assert_eq!(quad, Quadrilateral::new(tl, tr, br, bl));
    }

    #[test]
    fn test_quad_area_and_bounds() {
        let quad = Quadrilateral::from_rect(10.0, 20.0, 30.0, 40.0);
        assert!((quad.area() - 1200.0).abs() < 1e-3);

        let rect = quad.bounding_rect(1000, 1000).unwrap();
        assert_eq!(rect, PixelRect::new(10, 20, 30, 40));

        let clipped = quad.bounding_rect(25, 100).unwrap();
        assert_eq!(clipped, PixelRect::new(10, 20, 15, 40));

        assert!(quad.bounding_rect(5, 5).is_none());
    }

    #[test]
    fn test_point_rotation_round_trip() {
        let c = Point::new(50.0, 50.0);
        let p = Point::new(80.0, 40.0);
        let back = p.rotate_about(c, 0.3).rotate_about(c, -0.3);
        assert!((back.x - p.x).abs() < 1e-3);
        assert!((back.y - p.y).abs() < 1e-3);
    }

    #[test]
    fn test_pixel_rect_clamp() {
        let r = PixelRect::new(90, 90, 20, 20);
        assert_eq!(r.clamp_to(100, 100), Some(PixelRect::new(90, 90, 10, 10)));
        assert_eq!(r.clamp_to(50, 50), None);
        assert_eq!(PixelRect::new(0, 0, 30, 10).aspect_ratio(), 3.0);
    }

    #[test]
    fn test_template_roles() {
        let t = Template::new("answers", TemplateRole::AnswerArea, GrayImage::new(4, 4));
        assert_eq!(t.min_score, 0.5);
        assert!(t.accepts(0.5));
        assert!(!t.accepts(0.49));

        let h = Template::new("header", TemplateRole::Header, GrayImage::new(4, 4)).with_min_score(2.0);
        assert_eq!(h.min_score, 1.0);
    }

    #[test]
    fn test_template_load_missing() {
        let result = Template::load(Path::new("/nonexistent/template.png"), TemplateRole::Header);
        assert!(matches!(result, Err(LocalizeError::TemplateNotFound(_))));
    }

    #[test]
    fn test_locate_result_accepted() {
        let quad = Quadrilateral::from_rect(0.0, 0.0, 1.0, 1.0);
        let result = LocateResult {
            quad: Some(quad),
            score: 0.4,
            scale: 1.0,
            angle: 0.0,
        };
        assert!(result.accepted(0.5).is_none());
        assert!(result.accepted(0.25).is_some());
        assert!(LocateResult::none(0.0).accepted(0.0).is_none());
    }
}
