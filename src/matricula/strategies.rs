//! Matrícula localization + OCR strategies
//!
//! Each strategy finds a region its own way, runs the digit pipeline and
//! returns its best corrected reading. Validation happens in the extractor,
//! so a strategy may hand back text that later gets rejected.

use super::preprocess::{self, OCR_PADDING};
use super::types::{
    MatriculaCandidate, MatriculaOptions, Result, StrategyError, StrategyKind, CONTOUR_CONFIDENCE,
    ENSEMBLE_CONFIDENCE, FIXED_ROI_CONFIDENCE, LABEL_CONFIDENCE, LINE_CONFIDENCE,
};
use super::validate::{correct_common_errors, is_valid, matches_label};
use crate::image_ops::{self, Polarity};
use crate::localize::{PixelRect, TemplateLocalizer};
use crate::ocr::{OcrEngine, OcrError, OcrToken, PageSegMode};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use imageproc::point::Point as ContourPoint;
use tracing::{debug, warn};

/// Polygon approximation tolerance, as a fraction of the contour perimeter
const POLY_EPSILON_FRACTION: f64 = 0.02;

/// Canny hysteresis thresholds
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Hough non-maximum suppression radius
const HOUGH_SUPPRESSION_RADIUS: u32 = 8;

/// Hough vote threshold as a fraction of the band's shorter side
const HOUGH_VOTE_FRACTION: f32 = 0.1;

/// Lower bound on the Hough vote threshold
const MIN_HOUGH_VOTES: u32 = 20;

/// Angular tolerance for near-horizontal / near-vertical lines (degrees)
const LINE_ANGLE_TOLERANCE: u32 = 10;

// ============================================================
// Strategy Trait
// ============================================================

/// Everything a strategy may use besides the page
pub struct StrategyContext<'a> {
    pub ocr: &'a dyn OcrEngine,
    pub options: &'a MatriculaOptions,
}

/// One independent way of finding and reading the matrícula
pub trait MatriculaStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether the options carry what this strategy needs
    fn applies(&self, _options: &MatriculaOptions) -> bool {
        true
    }

    /// Best reading on the original page, or `None` if nothing was found
    fn extract(&self, page: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<MatriculaCandidate>>;
}

// ============================================================
// Shared helpers
// ============================================================

/// Read digits with each configured segmentation mode in turn
///
/// Returns the first reading that validates, otherwise the last non-empty
/// corrected reading. An OCR error on one mode does not stop the others;
/// it is returned only if no mode produced any text.
pub fn read_digits(image: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<String>> {
    let opts = ctx.options;
    let mut fallback = None;
    let mut last_error: Option<OcrError> = None;
    for &mode in &opts.psm_modes {
        match ctx.ocr.read_text(image, true, mode) {
            Ok(text) => {
                let corrected = correct_common_errors(&text);
                if is_valid(&corrected, opts.min_length, opts.max_length) {
                    return Ok(Some(corrected));
                }
                if !corrected.is_empty() {
                    fallback = Some(corrected);
                }
            }
            Err(e) => {
                debug!(psm = mode.as_number(), error = %e, "Digit read failed");
                last_error = Some(e);
            }
        }
    }
    match (fallback, last_error) {
        (None, Some(e)) => Err(e.into()),
        (fallback, _) => Ok(fallback),
    }
}

/// Crop `rect`, run the digit pipeline and read it
fn read_region(
    page: &GrayImage,
    rect: PixelRect,
    equalize_first: bool,
    ctx: &StrategyContext<'_>,
    label: &str,
) -> Result<Option<String>> {
    let (w, h) = page.dimensions();
    let clamped = rect.clamp_to(w, h).ok_or(StrategyError::RegionOutside(rect))?;
    let crop = image_ops::crop_gray(page, clamped.x, clamped.y, clamped.width, clamped.height);
    save_debug_crop(ctx.options, label, &crop);
    let prepared = preprocess::digit_pipeline(&crop, equalize_first);
    read_digits(&prepared, ctx)
}

fn save_debug_crop(options: &MatriculaOptions, label: &str, crop: &GrayImage) {
    let Some(dir) = &options.debug_dir else {
        return;
    };
    let path = dir.join(format!("matricula_roi_{label}.png"));
    if let Err(e) = std::fs::create_dir_all(dir).map_err(image::ImageError::IoError).and_then(|_| crop.save(&path)) {
        warn!(path = %path.display(), error = %e, "Failed to write matrícula debug crop");
    }
}

/// Top band of the page searched by the shape and ensemble strategies
pub fn search_band(page: &GrayImage, options: &MatriculaOptions) -> PixelRect {
    let (w, h) = page.dimensions();
    let band_h = ((h as f32 * options.search_band).ceil() as u32).clamp(1.min(h), h);
    PixelRect::new(0, 0, w, band_h)
}

fn candidate(text: Option<String>, confidence: f32, kind: StrategyKind) -> Option<MatriculaCandidate> {
    text.map(|t| MatriculaCandidate::new(t, confidence, kind))
}

// ============================================================
// Fixed ROI
// ============================================================

/// Literal region from the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRoiStrategy;

impl MatriculaStrategy for FixedRoiStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FixedRoi
    }

    fn applies(&self, options: &MatriculaOptions) -> bool {
        options.fixed_roi.is_some()
    }

    fn extract(&self, page: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<MatriculaCandidate>> {
        let Some(roi) = ctx.options.fixed_roi else {
            return Ok(None);
        };
        let text = read_region(page, roi, ctx.options.scanned_by_printer, ctx, "fixed")?;
        Ok(candidate(text, FIXED_ROI_CONFIDENCE, self.kind()))
    }
}

// ============================================================
// Header template
// ============================================================

/// Box located by matching the header template
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderTemplateStrategy;

impl MatriculaStrategy for HeaderTemplateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HeaderTemplate
    }

    fn applies(&self, options: &MatriculaOptions) -> bool {
        options.header_template.is_some()
    }

    fn extract(&self, page: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<MatriculaCandidate>> {
        let Some(template) = &ctx.options.header_template else {
            return Ok(None);
        };
        let located = TemplateLocalizer::locate(page, template, &ctx.options.locate);
        let Some(quad) = located.accepted(template.min_score) else {
            debug!(score = located.score, min = template.min_score, "Header template not accepted");
            return Ok(None);
        };
        let (w, h) = page.dimensions();
        let Some(rect) = quad.bounding_rect(w, h) else {
            return Ok(None);
        };
        let text = read_region(page, rect, false, ctx, "template")?;
        Ok(candidate(text, located.score, self.kind()))
    }
}

// ============================================================
// Contour shape
// ============================================================

/// Largest box-like four-sided outer contour
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourStrategy;

impl ContourStrategy {
    /// Locate the number box; coordinates are page coordinates
    pub fn find_box(page: &GrayImage, options: &MatriculaOptions) -> Option<PixelRect> {
        let band = search_band(page, options);
        let gray = image_ops::crop_gray(page, band.x, band.y, band.width, band.height);
        let mask = image_ops::binarize_otsu(&image_ops::denoise_median(&gray, 1), Polarity::DarkInk);
        let min_area = (band.area() as f64 * f64::from(options.min_area_fraction)) as u64;

        let contours = find_contours::<u32>(&mask);
        debug!(count = contours.len(), "Contours found");

        contours
            .iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .filter_map(|c| {
                let rect = bounding_box(&c.points)?;
                (rect.area() >= min_area && options.is_box_like(&rect) && is_four_sided(&c.points))
                    .then_some(rect)
            })
            .fold(None, |best: Option<PixelRect>, rect| match best {
                Some(b) if b.area() >= rect.area() => Some(b),
                _ => Some(rect),
            })
    }
}

impl MatriculaStrategy for ContourStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Contour
    }

    fn extract(&self, page: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<MatriculaCandidate>> {
        if page.width() == 0 || page.height() == 0 {
            return Err(StrategyError::EmptyPage);
        }
        let Some(rect) = Self::find_box(page, ctx.options) else {
            return Ok(None);
        };
        debug!(?rect, "Contour box");
        let text = read_region(page, rect, false, ctx, "contour")?;
        Ok(candidate(text, CONTOUR_CONFIDENCE, self.kind()))
    }
}

fn bounding_box(points: &[ContourPoint<u32>]) -> Option<PixelRect> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(PixelRect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Whether a closed contour simplifies to four vertices
fn is_four_sided(points: &[ContourPoint<u32>]) -> bool {
    if points.len() < 4 {
        return false;
    }
    let epsilon = arc_length(points, true) * POLY_EPSILON_FRACTION;
    if epsilon <= 0.0 {
        return false;
    }
    let approx = approximate_polygon_dp(points, epsilon, true);

    // The simplification may keep the start point next to its neighbour
    let mut vertices: Vec<(f64, f64)> = Vec::with_capacity(approx.len());
    for p in &approx {
        let v = (f64::from(p.x), f64::from(p.y));
        if vertices.last().map_or(true, |&last| distance(last, v) > epsilon) {
            vertices.push(v);
        }
    }
    while vertices.len() > 1 {
        let (first, last) = (vertices[0], vertices[vertices.len() - 1]);
        if distance(first, last) > epsilon {
            break;
        }
        vertices.pop();
    }
    vertices.len() == 4
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

// ============================================================
// Line geometry
// ============================================================

/// Box framed by the extreme long horizontal and vertical lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LineStrategy;

impl LineStrategy {
    /// Locate the number box; coordinates are page coordinates
    pub fn find_box(page: &GrayImage, options: &MatriculaOptions) -> Option<PixelRect> {
        let band = search_band(page, options);
        let gray = image_ops::crop_gray(page, band.x, band.y, band.width, band.height);
        let (w, h) = gray.dimensions();
        let edges = canny(&image_ops::denoise_gaussian(&gray, 1.0), CANNY_LOW, CANNY_HIGH);

        let vote_threshold = ((w.min(h) as f32 * HOUGH_VOTE_FRACTION) as u32).max(MIN_HOUGH_VOTES);
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold,
                suppression_radius: HOUGH_SUPPRESSION_RADIUS,
            },
        );
        let center = (w as f32 / 2.0, h as f32 / 2.0);
        let (rows, cols) = split_lines(&lines, center);
        debug!(lines = lines.len(), horizontal = rows.len(), vertical = cols.len(), vote_threshold, "Hough lines");
        if rows.len() < 2 || cols.len() < 2 {
            return None;
        }

        let top = rows.iter().copied().fold(f32::INFINITY, f32::min).max(0.0);
        let bottom = rows.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let left = cols.iter().copied().fold(f32::INFINITY, f32::min).max(0.0);
        let right = cols.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if bottom <= top || right <= left {
            return None;
        }

        let rect = PixelRect::new(
            left.round() as u32,
            top.round() as u32,
            (right - left).round() as u32,
            (bottom - top).round() as u32,
        )
        .clamp_to(w, h)?;
        let min_area = (band.area() as f64 * f64::from(options.min_area_fraction)) as u64;
        (rect.area() >= min_area && options.is_box_like(&rect)).then_some(rect)
    }
}

impl MatriculaStrategy for LineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lines
    }

    fn extract(&self, page: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<MatriculaCandidate>> {
        if page.width() == 0 || page.height() == 0 {
            return Err(StrategyError::EmptyPage);
        }
        let Some(rect) = Self::find_box(page, ctx.options) else {
            return Ok(None);
        };
        debug!(?rect, "Line box");
        let text = read_region(page, rect, false, ctx, "lines")?;
        Ok(candidate(text, LINE_CONFIDENCE, self.kind()))
    }
}

/// Positions of near-horizontal lines (y) and near-vertical lines (x),
/// measured through the band centre
///
/// A polar line satisfies `x cos(a) + y sin(a) = r`: angle 90 is
/// horizontal, angles 0 and 180 are vertical.
fn split_lines(lines: &[PolarLine], center: (f32, f32)) -> (Vec<f32>, Vec<f32>) {
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for line in lines {
        let angle = line.angle_in_degrees;
        let theta = (angle as f32).to_radians();
        if angle.abs_diff(90) <= LINE_ANGLE_TOLERANCE {
            rows.push((line.r - center.0 * theta.cos()) / theta.sin());
        } else if angle <= LINE_ANGLE_TOLERANCE || angle >= 180 - LINE_ANGLE_TOLERANCE {
            cols.push((line.r - center.1 * theta.sin()) / theta.cos());
        }
    }
    (rows, cols)
}

// ============================================================
// Ensemble
// ============================================================

/// Majority vote over preprocessing variants, plus the printed label
///
/// The region is the fixed ROI when one is configured, otherwise the
/// search band. A digit token right after a word reading like the label
/// outranks the vote.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleStrategy;

impl EnsembleStrategy {
    fn region(page: &GrayImage, options: &MatriculaOptions) -> PixelRect {
        let (w, h) = page.dimensions();
        options
            .fixed_roi
            .and_then(|roi| roi.clamp_to(w, h))
            .unwrap_or_else(|| search_band(page, options))
    }

    /// Digit token following the label, in reading order
    pub fn label_reading(tokens: &[OcrToken], options: &MatriculaOptions) -> Option<String> {
        let mut ordered: Vec<&OcrToken> = tokens.iter().collect();
        ordered.sort_by_key(|t| (t.line_key, t.word));

        for (i, token) in ordered.iter().enumerate() {
            if !matches_label(&token.text, &options.label, options.label_similarity) {
                continue;
            }
            // "MATRICULA:2023001" in a single word
            if let Some(pos) = token.text.find(|c: char| c.is_ascii_digit()) {
                let text = correct_common_errors(&token.text[pos..]);
                if is_valid(&text, options.min_length, options.max_length) {
                    return Some(text);
                }
            }
            if let Some(next) = ordered.get(i + 1).filter(|next| next.line_key == token.line_key) {
                let text = correct_common_errors(next.text.trim_matches(|c: char| !c.is_alphanumeric()));
                if is_valid(&text, options.min_length, options.max_length) {
                    return Some(text);
                }
            }
        }
        None
    }

    /// Most frequent reading; ties go to the longer string, then the first seen
    pub fn vote(readings: &[String]) -> Option<String> {
        let mut tally: Vec<(&String, usize)> = Vec::new();
        for reading in readings {
            match tally.iter_mut().find(|(text, _)| *text == reading) {
                Some(entry) => entry.1 += 1,
                None => tally.push((reading, 1)),
            }
        }
        let mut best: Option<(&String, usize)> = None;
        for (text, count) in tally {
            let better = match best {
                None => true,
                Some((b, c)) => (count, text.len()) > (c, b.len()),
            };
            if better {
                best = Some((text, count));
            }
        }
        best.map(|(text, _)| text.clone())
    }
}

impl MatriculaStrategy for EnsembleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ensemble
    }

    fn extract(&self, page: &GrayImage, ctx: &StrategyContext<'_>) -> Result<Option<MatriculaCandidate>> {
        if page.width() == 0 || page.height() == 0 {
            return Err(StrategyError::EmptyPage);
        }
        let opts = ctx.options;
        let rect = Self::region(page, opts);
        let region = image_ops::crop_gray(page, rect.x, rect.y, rect.width, rect.height);
        save_debug_crop(opts, "ensemble", &region);

        match ctx.ocr.read_tokens(&preprocess::pad_white(&region, OCR_PADDING), PageSegMode::Auto) {
            Ok(tokens) => {
                if let Some(text) = Self::label_reading(&tokens, opts) {
                    debug!(text = %text, "Label token reading");
                    return Ok(Some(MatriculaCandidate::new(text, LABEL_CONFIDENCE, StrategyKind::LabelToken)));
                }
            }
            Err(e) => warn!(error = %e, "Token read failed, continuing with variants"),
        }

        let variants = preprocess::ensemble_variants(&region, opts.scanned_by_printer, &opts.psm_modes);
        let mut valid = Vec::new();
        let mut first_raw = None;
        let mut failures = 0;
        let mut last_error = None;
        for variant in &variants {
            match ctx.ocr.read_text(&variant.image, true, variant.mode) {
                Ok(text) => {
                    let corrected = correct_common_errors(&text);
                    debug!(variant = variant.name, text = %corrected, "Ensemble read");
                    if is_valid(&corrected, opts.min_length, opts.max_length) {
                        valid.push(corrected);
                    } else if first_raw.is_none() && !corrected.is_empty() {
                        first_raw = Some(corrected);
                    }
                }
                Err(e) => {
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }
        if failures == variants.len() {
            if let Some(e) = last_error {
                return Err(e.into());
            }
        }

        let text = Self::vote(&valid).or(first_raw);
        Ok(candidate(text, ENSEMBLE_CONFIDENCE, self.kind()))
    }
}

/// Strategies in cascade order
pub fn default_strategies() -> Vec<Box<dyn MatriculaStrategy>> {
    vec![
        Box::new(FixedRoiStrategy),
        Box::new(HeaderTemplateStrategy),
        Box::new(ContourStrategy),
        Box::new(LineStrategy),
        Box::new(EnsembleStrategy),
    ]
}
