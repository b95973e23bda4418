//! Perspective Rectification module
//!
//! Maps a detected quadrilateral onto a canonical `W x H` canvas with a
//! projective transform and bilinear resampling. Areas outside the source
//! page are filled with white paper.
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::{PerspectiveRectifier, Quadrilateral};
//!
//! let page = image::open("page_001.png").unwrap().to_rgb8();
//! let quad = Quadrilateral::from_rect(120.0, 300.0, 1900.0, 2600.0);
//! let canvas = PerspectiveRectifier::rectify(&page, &quad, 800, 1200).unwrap();
//! canvas.save("rectified.png").unwrap();
//! ```

use crate::image_ops::PAPER_WHITE;
use crate::localize::Quadrilateral;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use thiserror::Error;
use tracing::debug;

// ============================================================
// Constants
// ============================================================

/// Smallest triangle area (px^2) spanned by any three corners
const MIN_CORNER_TRIANGLE_AREA: f32 = 1.0;

// ============================================================
// Error Types
// ============================================================

/// Rectification errors
#[derive(Debug, Error, PartialEq)]
pub enum RectifyError {
    #[error("Target size must be positive, got {width}x{height}")]
    ZeroTarget { width: u32, height: u32 },

    #[error("Quadrilateral has non-finite coordinates")]
    NonFinite,

    #[error("Quadrilateral is degenerate (collinear corners)")]
    Degenerate,
}

pub type Result<T> = std::result::Result<T, RectifyError>;

// ============================================================
// Rectifier
// ============================================================

/// Projective page rectifier
pub struct PerspectiveRectifier;

impl PerspectiveRectifier {
    /// Rectify an RGB page
    pub fn rectify(page: &RgbImage, quad: &Quadrilateral, width: u32, height: u32) -> Result<RgbImage> {
        let projection = Self::projection(quad, width, height)?;
        let mut out = RgbImage::new(width, height);
        warp_into(
            page,
            &projection,
            Interpolation::Bilinear,
            Rgb([PAPER_WHITE; 3]),
            &mut out,
        );
        debug!(width, height, "Page rectified");
        Ok(out)
    }

    /// Rectify a grayscale page
    pub fn rectify_gray(page: &GrayImage, quad: &Quadrilateral, width: u32, height: u32) -> Result<GrayImage> {
        let projection = Self::projection(quad, width, height)?;
        let mut out = GrayImage::new(width, height);
        warp_into(
            page,
            &projection,
            Interpolation::Bilinear,
            Luma([PAPER_WHITE]),
            &mut out,
        );
        Ok(out)
    }

    /// Projection taking the quad (source) onto `[(0,0),(W,0),(W,H),(0,H)]`
    pub fn projection(quad: &Quadrilateral, width: u32, height: u32) -> Result<Projection> {
        if width == 0 || height == 0 {
            return Err(RectifyError::ZeroTarget { width, height });
        }
        if quad.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(RectifyError::NonFinite);
        }
        if Self::is_degenerate(quad) {
            return Err(RectifyError::Degenerate);
        }

        let (w, h) = (width as f32, height as f32);
        let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        Projection::from_control_points(quad.as_tuples(), dest).ok_or(RectifyError::Degenerate)
    }

    /// Any three corners (nearly) collinear
    fn is_degenerate(quad: &Quadrilateral) -> bool {
        let p = &quad.points;
        (0..4).any(|skip| {
            let tri: Vec<_> = (0..4).filter(|&i| i != skip).map(|i| p[i]).collect();
            let cross = (tri[1].x - tri[0].x) * (tri[2].y - tri[0].y)
                - (tri[2].x - tri[0].x) * (tri[1].y - tri[0].y);
            cross.abs() / 2.0 < MIN_CORNER_TRIANGLE_AREA
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localize::Point;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn page() -> RgbImage {
        let mut img = RgbImage::from_pixel(200, 150, Rgb([250, 250, 250]));
        // Dark block in the top-left of the region (10,10)-(110,60)
        draw_filled_rect_mut(&mut img, Rect::at(10, 10).of_size(20, 10), Rgb([10, 10, 10]));
        img
    }

    #[test]
    fn test_axis_aligned_crop() {
        let quad = Quadrilateral::from_rect(10.0, 10.0, 100.0, 50.0);
        let out = PerspectiveRectifier::rectify(&page(), &quad, 100, 50).unwrap();
        assert_eq!(out.dimensions(), (100, 50));
        assert!(out.get_pixel(5, 5)[0] < 50);
        assert!(out.get_pixel(60, 30)[0] > 200);
    }

    #[test]
    fn test_scaling_to_canvas() {
        let quad = Quadrilateral::from_rect(10.0, 10.0, 100.0, 50.0);
        let out = PerspectiveRectifier::rectify(&page(), &quad, 200, 100).unwrap();
        // Block covers the first 20% x 20% of the canvas
        assert!(out.get_pixel(20, 10)[0] < 50);
        assert!(out.get_pixel(60, 40)[0] > 200);
    }

    #[test]
    fn test_outside_source_is_white() {
        let quad = Quadrilateral::from_rect(150.0, 100.0, 100.0, 100.0);
        let out = PerspectiveRectifier::rectify(&page(), &quad, 50, 50).unwrap();
        assert_eq!(out.get_pixel(49, 49), &Rgb([PAPER_WHITE; 3]));
    }

    #[test]
    fn test_corner_order_matters() {
        // Swapping left and right corners mirrors the output
        let q = Quadrilateral::from_rect(10.0, 10.0, 100.0, 50.0);
        let mirrored = Quadrilateral::new(q.points[1], q.points[0], q.points[3], q.points[2]);
        let out = PerspectiveRectifier::rectify(&page(), &mirrored, 100, 50).unwrap();
        assert!(out.get_pixel(94, 5)[0] < 50);
        assert!(out.get_pixel(5, 5)[0] > 200);
    }

    #[test]
    fn test_degenerate_quad() {
        let collinear = Quadrilateral::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(30.0, 0.0),
        );
        let result = PerspectiveRectifier::rectify(&page(), &collinear, 100, 100);
        assert_eq!(result.unwrap_err(), RectifyError::Degenerate);
    }

    #[test]
    fn test_zero_target() {
        let quad = Quadrilateral::from_rect(0.0, 0.0, 10.0, 10.0);
        let result = PerspectiveRectifier::rectify(&page(), &quad, 0, 10);
        assert!(matches!(result, Err(RectifyError::ZeroTarget { .. })));
    }

    #[test]
    fn test_non_finite() {
        let mut quad = Quadrilateral::from_rect(0.0, 0.0, 10.0, 10.0);
        quad.points[2].x = f32::NAN;
        let result = PerspectiveRectifier::rectify_gray(&GrayImage::new(20, 20), &quad, 10, 10);
        assert_eq!(result.unwrap_err(), RectifyError::NonFinite);
    }

    #[test]
    fn test_deterministic() {
        let quad = Quadrilateral::new(
            Point::new(12.0, 8.0),
            Point::new(115.0, 14.0),
            Point::new(110.0, 66.0),
            Point::new(8.0, 58.0),
        );
        let a = PerspectiveRectifier::rectify(&page(), &quad, 80, 40).unwrap();
        let b = PerspectiveRectifier::rectify(&page(), &quad, 80, 40).unwrap();
        assert_eq!(a, b);
    }
}
