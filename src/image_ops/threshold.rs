//! Global, adaptive and blended binarization
//!
//! All binarizers return masks where ink is [`FOREGROUND`] and paper is
//! [`BACKGROUND`], whatever the polarity of the source.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

use super::integral::IntegralImage;
use super::{BACKGROUND, FOREGROUND};

// ============================================================
// Constants
// ============================================================

/// Default adaptive window radius (11x11 block)
pub const DEFAULT_BLOCK_RADIUS: u32 = 5;

/// Default constant subtracted from the local mean
pub const DEFAULT_OFFSET: f32 = 2.0;

/// Re-threshold level applied after blending two masks
pub const BLEND_CUTOFF: u8 = 127;

// ============================================================
// Options
// ============================================================

/// Which side of the threshold is ink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Dark marks on light paper (pencil, pen, printed digits)
    #[default]
    DarkInk,
    /// Light marks on dark background
    LightInk,
}

/// Local threshold estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptiveMethod {
    /// Box mean of the window
    #[default]
    Mean,
    /// Gaussian-weighted mean of the window
    Gaussian,
}

/// Options for [`binarize_blended`]
#[derive(Debug, Clone, Copy)]
pub struct BlendOptions {
    /// Local estimator for the adaptive half
    pub method: AdaptiveMethod,
    /// Adaptive window radius
    pub block_radius: u32,
    /// Constant subtracted from the local estimate
    pub offset: f32,
    /// Ink polarity
    pub polarity: Polarity,
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self {
            method: AdaptiveMethod::Gaussian,
            block_radius: DEFAULT_BLOCK_RADIUS,
            offset: DEFAULT_OFFSET,
            polarity: Polarity::DarkInk,
        }
    }
}

// ============================================================
// Global thresholds
// ============================================================

/// Otsu's global threshold level
pub fn otsu_level(gray: &GrayImage) -> u8 {
    if gray.width() == 0 || gray.height() == 0 {
        return 127;
    }
    imageproc::contrast::otsu_level(gray)
}

/// Fixed-level binarization
///
/// With [`Polarity::DarkInk`] pixels at or below `level` become foreground;
/// with [`Polarity::LightInk`] pixels strictly above it do.
pub fn threshold_binary(gray: &GrayImage, level: u8, polarity: Polarity) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        let ink = match polarity {
            Polarity::DarkInk => src.0[0] <= level,
            Polarity::LightInk => src.0[0] > level,
        };
        dst.0[0] = if ink { FOREGROUND } else { BACKGROUND };
    }
    out
}

/// Otsu binarization
pub fn binarize_otsu(gray: &GrayImage, polarity: Polarity) -> GrayImage {
    threshold_binary(gray, otsu_level(gray), polarity)
}

// ============================================================
// Adaptive thresholds
// ============================================================

/// Local-mean binarization over a `(2r+1) x (2r+1)` window
///
/// A dark-ink pixel is foreground when it is at or below `local - offset`.
pub fn adaptive_threshold(
    gray: &GrayImage,
    method: AdaptiveMethod,
    block_radius: u32,
    offset: f32,
    polarity: Polarity,
) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let radius = block_radius.max(1);

    let local: Box<dyn Fn(u32, u32) -> f32> = match method {
        AdaptiveMethod::Mean => {
            let integral = IntegralImage::new(gray);
            Box::new(move |x, y| {
                let x0 = x.saturating_sub(radius);
                let y0 = y.saturating_sub(radius);
                let x1 = (x + radius + 1).min(w);
                let y1 = (y + radius + 1).min(h);
                integral.mean(x0, y0, x1 - x0, y1 - y0) as f32
            })
        }
        AdaptiveMethod::Gaussian => {
            let ksize = (2 * radius + 1) as f32;
            let sigma = 0.3 * ((ksize - 1.0) * 0.5 - 1.0) + 0.8;
            let blurred = gaussian_blur_f32(gray, sigma);
            Box::new(move |x, y| f32::from(blurred.get_pixel(x, y).0[0]))
        }
    };

    for (x, y, p) in out.enumerate_pixels_mut() {
        let v = f32::from(gray.get_pixel(x, y).0[0]);
        let t = local(x, y);
        let ink = match polarity {
            Polarity::DarkInk => v <= t - offset,
            Polarity::LightInk => v > t + offset,
        };
        *p = Luma([if ink { FOREGROUND } else { BACKGROUND }]);
    }
    out
}

// ============================================================
// Blending
// ============================================================

/// Equal-weight blend of two masks, `(a + b + 1) / 2` per pixel
///
/// The output has the dimensions of `a`; pixels missing from `b` count as
/// background.
pub fn blend_binary(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let va = u16::from(a.get_pixel(x, y).0[0]);
        let vb = b
            .get_pixel_checked(x, y)
            .map(|p| u16::from(p.0[0]))
            .unwrap_or(u16::from(BACKGROUND));
        Luma([((va + vb + 1) / 2) as u8])
    })
}

/// Otsu and adaptive binarization blended at equal weight, then
/// re-thresholded at [`BLEND_CUTOFF`]
///
/// A pixel flagged by either method survives the cutoff, so faint marks
/// missed globally are kept by the local half and vice versa.
pub fn binarize_blended(gray: &GrayImage, options: &BlendOptions) -> GrayImage {
    let global = binarize_otsu(gray, options.polarity);
    let local = adaptive_threshold(
        gray,
        options.method,
        options.block_radius,
        options.offset,
        options.polarity,
    );
    threshold_binary(&blend_binary(&global, &local), BLEND_CUTOFF, Polarity::LightInk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn sheet_with_mark() -> GrayImage {
        let mut img = GrayImage::from_pixel(60, 40, Luma([230]));
        draw_filled_rect_mut(&mut img, Rect::at(20, 10).of_size(12, 12), Luma([30]));
        img
    }

    #[test]
    fn test_threshold_binary_polarity() {
        let img = GrayImage::from_raw(3, 1, vec![10, 127, 200]).unwrap();
        let dark = threshold_binary(&img, 127, Polarity::DarkInk);
        assert_eq!(dark.as_raw(), &vec![255, 255, 0]);
        let light = threshold_binary(&img, 127, Polarity::LightInk);
        assert_eq!(light.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn test_otsu_separates_mark() {
        let img = sheet_with_mark();
        let level = otsu_level(&img);
        assert!((30..230).contains(&level));

        let mask = binarize_otsu(&img, Polarity::DarkInk);
        assert_eq!(mask.get_pixel(25, 15)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(2, 2)[0], BACKGROUND);
    }

    #[test]
    fn test_adaptive_mean_flags_mark_edges() {
        let img = sheet_with_mark();
        let mask = adaptive_threshold(&img, AdaptiveMethod::Mean, 5, 2.0, Polarity::DarkInk);
        // Uniform paper stays background
        assert_eq!(mask.get_pixel(2, 2)[0], BACKGROUND);
        // Mark boundary is darker than its neighbourhood mean
        assert_eq!(mask.get_pixel(20, 15)[0], FOREGROUND);
    }

    #[test]
    fn test_adaptive_uniform_is_background() {
        let img = GrayImage::from_pixel(20, 20, Luma([120]));
        for method in [AdaptiveMethod::Mean, AdaptiveMethod::Gaussian] {
            let mask = adaptive_threshold(&img, method, 3, 2.0, Polarity::DarkInk);
            assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        }
    }

    #[test]
    fn test_blend_binary_is_union_after_cutoff() {
        let a = GrayImage::from_raw(4, 1, vec![0, 255, 0, 255]).unwrap();
        let b = GrayImage::from_raw(4, 1, vec![0, 0, 255, 255]).unwrap();
        let blended = blend_binary(&a, &b);
        assert_eq!(blended.as_raw(), &vec![0, 128, 128, 255]);

        let cut = threshold_binary(&blended, BLEND_CUTOFF, Polarity::LightInk);
        assert_eq!(cut.as_raw(), &vec![0, 255, 255, 255]);
    }

    #[test]
    fn test_binarize_blended_marks_fill() {
        let img = sheet_with_mark();
        let mask = binarize_blended(&img, &BlendOptions::default());
        assert_eq!(mask.get_pixel(25, 15)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(2, 2)[0], BACKGROUND);
        assert_eq!(mask.get_pixel(55, 35)[0], BACKGROUND);
    }

    #[test]
    fn test_empty_image() {
        let img = GrayImage::new(0, 0);
        assert_eq!(otsu_level(&img), 127);
        assert_eq!(binarize_blended(&img, &BlendOptions::default()).dimensions(), (0, 0));
    }
}
