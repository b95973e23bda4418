//! Template Localizer Implementation
//!
//! Multi-scale, multi-rotation zero-mean normalized cross-correlation.

use super::types::{LocateOptions, LocateResult, Point, Quadrilateral, Template, TEMPLATE_FIT_MARGIN};
use crate::image_ops::{self, ClaheOptions, IntegralImage, PAPER_WHITE};
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

/// Variance below which a window is treated as flat
const FLAT_VARIANCE: f64 = 1e-6;

/// Template localizer
pub struct TemplateLocalizer;

/// One point of the scale/rotation grid
#[derive(Debug, Clone, Copy)]
struct Trial {
    index: usize,
    scale: f32,
    angle: f32,
}

/// Best correlation peak found in one trial
#[derive(Debug, Clone, Copy)]
struct Peak {
    x: u32,
    y: u32,
    score: f32,
}

/// Page and template prepared for one search level
struct Level {
    page: GrayImage,
    template: GrayImage,
    /// Level pixels per original page pixel
    factor: f32,
}

impl TemplateLocalizer {
    /// Locate `template` on `page`
    ///
    /// Never fails: a missing or poor match is reported through
    /// [`LocateResult::quad`] being `None` or a low score.
    #[instrument(skip_all, fields(template = %template.name))]
    pub fn locate(page: &GrayImage, template: &Template, options: &LocateOptions) -> LocateResult {
        let (pw, ph) = page.dimensions();
        let (tw, th) = template.dimensions();
        if pw == 0 || ph == 0 || tw == 0 || th == 0 {
            warn!("Empty page or template, skipping localization");
            return LocateResult::none(0.0);
        }

        let prepared = if options.enhance {
            Self::enhance_page(page)
        } else {
            page.clone()
        };
        let (prepared, tmpl, fit_factor) = Self::fit_template(prepared, &template.image);

        let trials = Self::trials(options);
        let coarse = Self::level(&prepared, &tmpl, fit_factor, options.coarse_max_dimension);

        // Strictly-greater score wins; equal scores keep the lowest trial index
        let best = trials
            .par_iter()
            .filter_map(|trial| Self::run_trial(&coarse, trial, None).map(|peak| (*trial, peak)))
            .max_by(|(ta, a), (tb, b)| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(tb.index.cmp(&ta.index))
            });

        let Some((trial, coarse_peak)) = best else {
            warn!("No trial produced a usable correlation map");
            return LocateResult::none(0.0);
        };
        debug!(
            scale = trial.scale,
            angle = trial.angle,
            score = coarse_peak.score,
            "Coarse match"
        );

        let fine = Self::level(&prepared, &tmpl, fit_factor, options.match_max_dimension);
        let (level, peak) = if fine.factor > coarse.factor {
            let ratio = fine.factor / coarse.factor;
            let window = Self::refine_window(coarse_peak, ratio, options.refine_radius);
            match Self::run_trial(&fine, &trial, Some(window)) {
                Some(refined) => (&fine, refined),
                None => (&coarse, coarse_peak),
            }
        } else {
            (&coarse, coarse_peak)
        };

        let quad = Self::map_back(level, &trial, peak);
        debug!(score = peak.score, ?quad, "Template located");

        LocateResult {
            quad: Some(quad),
            score: peak.score,
            scale: trial.scale,
            angle: trial.angle,
        }
    }

    /// Denoise, equalize and apply local contrast to a page
    pub fn enhance_page(page: &GrayImage) -> GrayImage {
        let denoised = image_ops::denoise_median(page, 1);
        let equalized = image_ops::equalize(&denoised);
        image_ops::clahe(&equalized, &ClaheOptions::default())
    }

    /// Zero-mean normalized correlation peak of `template` over `image`
    ///
    /// Scores lie in [-1, 1]; flat windows or a flat template score 0.
    /// Returns `None` when the template does not fit.
    pub fn best_match(image: &GrayImage, template: &GrayImage) -> Option<(u32, u32, f32)> {
        Self::correlate(image, template).map(|p| (p.x, p.y, p.score))
    }

    /// Shrink an oversized template to fit with a margin; if rounding still
    /// leaves it too large, enlarge the page instead
    ///
    /// Returns the page, the template and the page enlargement factor.
    fn fit_template(page: GrayImage, template: &GrayImage) -> (GrayImage, GrayImage, f32) {
        let (pw, ph) = page.dimensions();
        let (tw, th) = template.dimensions();
        if tw <= pw && th <= ph {
            return (page, template.clone(), 1.0);
        }

        let shrink = (pw as f32 / tw as f32).min(ph as f32 / th as f32) * TEMPLATE_FIT_MARGIN;
        let tmpl = image_ops::resize_gray(template, shrink);
        debug!(shrink, from = ?(tw, th), to = ?tmpl.dimensions(), "Template larger than page, downscaled");

        let (tw, th) = tmpl.dimensions();
        if tw <= pw && th <= ph {
            return (page, tmpl, 1.0);
        }

        let grow = (tw as f32 / pw as f32).max(th as f32 / ph as f32) / TEMPLATE_FIT_MARGIN;
        debug!(grow, "Template still too large, upscaling page");
        (image_ops::resize_gray(&page, grow), tmpl, grow)
    }

    fn level(page: &GrayImage, template: &GrayImage, fit_factor: f32, max_dimension: u32) -> Level {
        let longest = page.width().max(page.height()) as f32;
        let factor = (max_dimension as f32 / longest).min(1.0);
        Level {
            page: image_ops::resize_gray(page, factor),
            template: image_ops::resize_gray(template, factor),
            factor: factor * fit_factor,
        }
    }

    fn trials(options: &LocateOptions) -> Vec<Trial> {
        let angles = options.angles();
        options
            .scales()
            .into_iter()
            .flat_map(|scale| angles.iter().map(move |&angle| (scale, angle)))
            .enumerate()
            .map(|(index, (scale, angle))| Trial { index, scale, angle })
            .collect()
    }

    fn transform(page: &GrayImage, trial: &Trial) -> GrayImage {
        let scaled = image_ops::resize_gray(page, trial.scale);
        if trial.angle == 0.0 {
            return scaled;
        }
        rotate_about_center(
            &scaled,
            trial.angle.to_radians(),
            Interpolation::Bilinear,
            Luma([PAPER_WHITE]),
        )
    }

    /// Run one trial; `window` restricts the search to `(x0, y0, x1, y1)`
    /// template origins
    fn run_trial(level: &Level, trial: &Trial, window: Option<(u32, u32, u32, u32)>) -> Option<Peak> {
        let image = Self::transform(&level.page, trial);
        let (iw, ih) = image.dimensions();
        let (tw, th) = level.template.dimensions();
        if tw > iw || th > ih {
            return None;
        }

        let peak = match window {
            None => Self::correlate(&image, &level.template),
            Some((x0, y0, x1, y1)) => {
                let x0 = x0.min(iw - tw);
                let y0 = y0.min(ih - th);
                let x1 = x1.clamp(x0, iw - tw);
                let y1 = y1.clamp(y0, ih - th);
                let region = image_ops::crop_gray(&image, x0, y0, x1 - x0 + tw, y1 - y0 + th);
                Self::correlate(&region, &level.template).map(|p| Peak {
                    x: p.x + x0,
                    y: p.y + y0,
                    score: p.score,
                })
            }
        };
        if let Some(p) = peak {
            debug!(index = trial.index, scale = trial.scale, angle = trial.angle, score = p.score, "Trial");
        }
        peak
    }

    fn refine_window(peak: Peak, ratio: f32, radius: u32) -> (u32, u32, u32, u32) {
        let cx = (peak.x as f32 * ratio).round() as u32;
        let cy = (peak.y as f32 * ratio).round() as u32;
        let r = radius + ratio.ceil() as u32;
        (cx.saturating_sub(r), cy.saturating_sub(r), cx + r, cy + r)
    }

    /// Undo rotation, trial scale and level scale for the template corners
    fn map_back(level: &Level, trial: &Trial, peak: Peak) -> Quadrilateral {
        let (tw, th) = level.template.dimensions();
        let (lw, lh) = level.page.dimensions();
        let sw = ((lw as f32 * trial.scale).round()).max(1.0);
        let sh = ((lh as f32 * trial.scale).round()).max(1.0);
        let center = Point::new(sw / 2.0, sh / 2.0);
        let theta = -trial.angle.to_radians();
        let to_page = 1.0 / (trial.scale * level.factor);

        let (x, y) = (peak.x as f32, peak.y as f32);
        let corner = |px: f32, py: f32| {
            Point::new(px, py)
                .rotate_about(center, theta)
                .scaled(to_page)
        };
        Quadrilateral::new(
            corner(x, y),
            corner(x + tw as f32, y),
            corner(x + tw as f32, y + th as f32),
            corner(x, y + th as f32),
        )
    }

    fn correlate(image: &GrayImage, template: &GrayImage) -> Option<Peak> {
        let (iw, ih) = image.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > iw || th > ih {
            return None;
        }

        let n = f64::from(tw) * f64::from(th);
        let (sum_t, sum_t2) = template.pixels().fold((0.0f64, 0.0f64), |(s, s2), p| {
            let v = f64::from(p.0[0]);
            (s + v, s2 + v * v)
        });
        let var_t = sum_t2 - sum_t * sum_t / n;
        if var_t <= FLAT_VARIANCE {
            return Some(Peak { x: 0, y: 0, score: 0.0 });
        }

        let cross = match_template(image, template, MatchTemplateMethod::CrossCorrelation);
        let integral = IntegralImage::new(image);

        let mut best: Option<Peak> = None;
        for (x, y, p) in cross.enumerate_pixels() {
            let s1 = integral.sum(x, y, tw, th) as f64;
            let s2 = integral.sum_squares(x, y, tw, th) as f64;
            let var_i = s2 - s1 * s1 / n;
            let score = if var_i <= FLAT_VARIANCE {
                0.0
            } else {
                let num = f64::from(p.0[0]) - sum_t * s1 / n;
                (num / (var_i * var_t).sqrt()).clamp(-1.0, 1.0) as f32
            };
            if best.map_or(true, |b| score > b.score) {
                best = Some(Peak { x, y, score });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localize::TemplateRole;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    /// Page with a distinctive block pattern at (x, y), size 120x80
    fn page_with_pattern(w: u32, h: u32, x: i32, y: i32) -> GrayImage {
        let mut page = GrayImage::from_pixel(w, h, Luma([235]));
        draw_pattern(&mut page, x, y);
        page
    }

    fn draw_pattern(img: &mut GrayImage, x: i32, y: i32) {
        draw_hollow_rect_mut(img, Rect::at(x, y).of_size(120, 80), Luma([20]));
        draw_filled_rect_mut(img, Rect::at(x + 10, y + 10).of_size(30, 20), Luma([40]));
        draw_filled_rect_mut(img, Rect::at(x + 70, y + 45).of_size(35, 25), Luma([60]));
        draw_filled_circle_mut(img, (x + 85, y + 20), 10, Luma([30]));
        draw_filled_rect_mut(img, Rect::at(x + 15, y + 55).of_size(40, 8), Luma([50]));
    }

    fn pattern_template() -> Template {
        let mut img = GrayImage::from_pixel(120, 80, Luma([235]));
        draw_pattern(&mut img, 0, 0);
        Template::new("pattern", TemplateRole::AnswerArea, img)
    }

    fn exact_options() -> LocateOptions {
        LocateOptions::builder().enhance(false).build()
    }

    #[test]
    fn test_best_match_exact_position() {
        let page = page_with_pattern(200, 150, 37, 41);
        let template = pattern_template();
        let (x, y, score) = TemplateLocalizer::best_match(&page, &template.image).unwrap();
        assert_eq!((x, y), (37, 41));
        assert!(score > 0.99, "score {score}");
    }

    #[test]
    fn test_best_match_flat_template_scores_zero() {
        let page = page_with_pattern(100, 100, 0, 0);
        let flat = GrayImage::from_pixel(10, 10, Luma([128]));
        let (_, _, score) = TemplateLocalizer::best_match(&page, &flat).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_best_match_template_too_large() {
        let page = GrayImage::new(10, 10);
        let big = GrayImage::new(20, 5);
        assert!(TemplateLocalizer::best_match(&page, &big).is_none());
    }

    #[test]
    fn test_locate_finds_pattern() {
        let page = page_with_pattern(400, 300, 150, 100);
        let result = TemplateLocalizer::locate(&page, &pattern_template(), &exact_options());

        let quad = result.quad.expect("quad");
        assert!(result.score > 0.8, "score {}", result.score);
        let tl = quad.top_left();
        let br = quad.bottom_right();
        assert!((tl.x - 150.0).abs() < 6.0, "tl {tl:?}");
        assert!((tl.y - 100.0).abs() < 6.0, "tl {tl:?}");
        assert!((br.x - 270.0).abs() < 8.0, "br {br:?}");
        assert!((br.y - 180.0).abs() < 8.0, "br {br:?}");
    }

    #[test]
    fn test_locate_large_page_uses_refinement() {
        let page = page_with_pattern(900, 700, 400, 300);
        let result = TemplateLocalizer::locate(&page, &pattern_template(), &exact_options());
        let quad = result.quad.expect("quad");
        let tl = quad.top_left();
        assert!((tl.x - 400.0).abs() < 8.0, "tl {tl:?}");
        assert!((tl.y - 300.0).abs() < 8.0, "tl {tl:?}");
    }

    #[test]
    fn test_locate_template_larger_than_page() {
        // TC-LOC-004: oversized template is downscaled before searching
        let page = page_with_pattern(100, 70, 0, 0);
        let mut big = GrayImage::from_pixel(300, 200, Luma([235]));
        draw_pattern(&mut big, 10, 10);
        let template = Template::new("big", TemplateRole::AnswerArea, big);

        let result = TemplateLocalizer::locate(&page, &template, &LocateOptions::default());
        assert!(result.score.is_finite());
        assert!((-1.0..=1.0).contains(&result.score));
    }

    #[test]
    fn test_locate_rotated_page() {
        // TC-LOC-005: page scanned 2° off is undone by the +2° trial
        let page = page_with_pattern(400, 300, 150, 100);
        let rotated = rotate_about_center(
            &page,
            (-2.0f32).to_radians(),
            Interpolation::Bilinear,
            Luma([235]),
        );
        let result = TemplateLocalizer::locate(&rotated, &pattern_template(), &exact_options());

        assert_eq!(result.angle, 2.0);
        assert!(result.score > 0.8, "score {}", result.score);

        // Where the pattern corner (150, 100) lands after rotating about (200, 150)
        let (sin, cos) = (-2.0f32).to_radians().sin_cos();
        let (dx, dy) = (150.0 - 200.0, 100.0 - 150.0);
        let expect = (200.0 + dx * cos - dy * sin, 150.0 + dx * sin + dy * cos);

        let tl = result.quad.expect("quad").top_left();
        assert!((tl.x - expect.0).abs() < 6.0, "tl {tl:?} expect {expect:?}");
        assert!((tl.y - expect.1).abs() < 6.0, "tl {tl:?} expect {expect:?}");
    }

    #[test]
    fn test_locate_empty_inputs() {
        let template = pattern_template();
        let result = TemplateLocalizer::locate(&GrayImage::new(0, 0), &template, &exact_options());
        assert!(result.quad.is_none());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_locate_is_deterministic() {
        let page = page_with_pattern(300, 240, 60, 90);
        let template = pattern_template();
        let a = TemplateLocalizer::locate(&page, &template, &exact_options());
        let b = TemplateLocalizer::locate(&page, &template, &exact_options());
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_template_shrinks_with_margin() {
        let page = GrayImage::new(100, 50);
        let template = GrayImage::new(200, 200);
        let (_, tmpl, grow) = TemplateLocalizer::fit_template(page, &template);
        assert_eq!(grow, 1.0);
        // min(100/200, 50/200) * 0.9 = 0.225
        assert_eq!(tmpl.dimensions(), (45, 45));
    }

    #[test]
    fn test_trials_order() {
        let trials = TemplateLocalizer::trials(&LocateOptions::default());
        assert_eq!(trials.len(), 35);
        assert_eq!(trials[0].scale, 0.7);
        assert_eq!(trials[0].angle, -2.0);
        assert_eq!(trials[34].index, 34);
    }
}
