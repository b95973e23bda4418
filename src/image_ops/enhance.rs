//! Grayscale conversion, denoising and contrast enhancement

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::{gaussian_blur_f32, median_filter};

// ============================================================
// Constants
// ============================================================

/// Default CLAHE clip limit (multiples of the uniform bin height)
pub const DEFAULT_CLIP_LIMIT: f32 = 2.0;

/// Default CLAHE tile grid (tiles per axis)
pub const DEFAULT_TILE_GRID: u32 = 8;

/// Number of gray levels
const LEVELS: usize = 256;

// ============================================================
// Conversion
// ============================================================

/// Convert any bitmap to 8-bit grayscale
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Crop a grayscale region, clamped to the image bounds
pub fn crop_gray(gray: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let x0 = x.min(w);
    let y0 = y.min(h);
    let cw = width.min(w - x0);
    let ch = height.min(h - y0);
    imageops::crop_imm(gray, x0, y0, cw, ch).to_image()
}

/// Crop an RGB region, clamped to the image bounds
pub fn crop_rgb(rgb: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let x0 = x.min(w);
    let y0 = y.min(h);
    let cw = width.min(w - x0);
    let ch = height.min(h - y0);
    imageops::crop_imm(rgb, x0, y0, cw, ch).to_image()
}

/// Resize a grayscale image by a uniform factor (at least 1x1)
pub fn resize_gray(gray: &GrayImage, factor: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let nw = ((w as f32 * factor).round() as u32).max(1);
    let nh = ((h as f32 * factor).round() as u32).max(1);
    if (nw, nh) == (w, h) {
        return gray.clone();
    }
    imageops::resize(gray, nw, nh, FilterType::Triangle)
}

// ============================================================
// Denoising
// ============================================================

/// Median filter denoise (removes salt-and-pepper scan noise)
pub fn denoise_median(gray: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return gray.clone();
    }
    median_filter(gray, radius, radius)
}

/// Gaussian denoise
pub fn denoise_gaussian(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return gray.clone();
    }
    gaussian_blur_f32(gray, sigma)
}

// ============================================================
// Contrast
// ============================================================

/// Global histogram equalization
pub fn equalize(gray: &GrayImage) -> GrayImage {
    equalize_histogram(gray)
}

/// Linear contrast stretch around mid-gray
///
/// `factor` > 1.0 increases contrast, < 1.0 flattens it.
pub fn boost_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let mut lut = [0u8; LEVELS];
    for (v, entry) in lut.iter_mut().enumerate() {
        let stretched = (v as f32 - 128.0) * factor + 128.0;
        *entry = stretched.round().clamp(0.0, 255.0) as u8;
    }
    apply_lut(gray, &lut)
}

/// Invert a grayscale image
pub fn invert(gray: &GrayImage) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    out
}

fn apply_lut(gray: &GrayImage, lut: &[u8; LEVELS]) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

// ============================================================
// Local contrast (CLAHE)
// ============================================================

/// Contrast-limited adaptive histogram equalization options
#[derive(Debug, Clone, Copy)]
pub struct ClaheOptions {
    /// Clip limit relative to a uniform histogram bin
    pub clip_limit: f32,
    /// Tiles per axis
    pub tile_grid: u32,
}

impl Default for ClaheOptions {
    fn default() -> Self {
        Self {
            clip_limit: DEFAULT_CLIP_LIMIT,
            tile_grid: DEFAULT_TILE_GRID,
        }
    }
}

/// Tiled local contrast enhancement with bilinear blending between tiles
pub fn clahe(gray: &GrayImage, options: &ClaheOptions) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }

    let tile_w = w.div_ceil(options.tile_grid.clamp(1, w));
    let tile_h = h.div_ceil(options.tile_grid.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(gray, x0, y0, x1, y1, options.clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let ty0 = (fy.floor().max(0.0) as u32).min(tiles_y - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        for x in 0..w {
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let tx0 = (fx.floor().max(0.0) as u32).min(tiles_x - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let ax = (fx - tx0 as f32).clamp(0.0, 1.0);

            let v = gray.get_pixel(x, y).0[0] as usize;
            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty0)[v] as f32 * ax;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty1)[v] as f32 * ax;
            let value = top * (1.0 - ay) + bottom * ay;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; LEVELS] {
    let mut hist = [0u32; LEVELS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let count = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; LEVELS];
    if count == 0 {
        for (v, entry) in lut.iter_mut().enumerate() {
            *entry = v as u8;
        }
        return lut;
    }

    // Clip and redistribute the excess uniformly
    let limit = ((clip_limit * count as f32 / LEVELS as f32) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / LEVELS as u32;
    let remainder = (excess % LEVELS as u32) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut cdf = 0u32;
    for (v, entry) in lut.iter_mut().enumerate() {
        cdf += hist[v];
        *entry = ((cdf as f32 * 255.0) / count as f32).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([(100 + x % 50) as u8]))
    }

    #[test]
    fn test_crop_gray_clamps() {
        let img = GrayImage::new(100, 100);
        let cropped = crop_gray(&img, 90, 95, 50, 50);
        assert_eq!(cropped.dimensions(), (10, 5));

        let outside = crop_gray(&img, 200, 200, 10, 10);
        assert_eq!(outside.dimensions(), (0, 0));
    }

    #[test]
    fn test_resize_gray_factor() {
        let img = GrayImage::new(200, 100);
        assert_eq!(resize_gray(&img, 0.5).dimensions(), (100, 50));
        assert_eq!(resize_gray(&img, 0.001).dimensions(), (1, 1));
    }

    #[test]
    fn test_boost_contrast_stretches() {
        let img = GrayImage::from_raw(3, 1, vec![100, 128, 156]).unwrap();
        let boosted = boost_contrast(&img, 2.0);
        assert_eq!(boosted.get_pixel(0, 0)[0], 72);
        assert_eq!(boosted.get_pixel(1, 0)[0], 128);
        assert_eq!(boosted.get_pixel(2, 0)[0], 184);
    }

    #[test]
    fn test_invert() {
        let img = GrayImage::from_raw(2, 1, vec![0, 200]).unwrap();
        let inv = invert(&img);
        assert_eq!(inv.get_pixel(0, 0)[0], 255);
        assert_eq!(inv.get_pixel(1, 0)[0], 55);
    }

    #[test]
    fn test_clahe_preserves_dimensions() {
        let img = gradient(64, 48);
        let out = clahe(&img, &ClaheOptions::default());
        assert_eq!(out.dimensions(), (64, 48));
    }

    #[test]
    fn test_clahe_keeps_order_within_tile() {
        let img = GrayImage::from_fn(64, 48, |x, _| Luma([if x < 32 { 120 } else { 130 }]));
        let options = ClaheOptions {
            clip_limit: 2.0,
            tile_grid: 1,
        };
        let out = clahe(&img, &options);
        assert!(out.get_pixel(0, 0)[0] < out.get_pixel(63, 0)[0]);
    }

    #[test]
    fn test_clahe_uniform_stays_uniform() {
        let img = GrayImage::from_pixel(40, 40, Luma([77]));
        let out = clahe(&img, &ClaheOptions::default());
        let (min, max) = min_max(&out);
        assert_eq!(min, max);
    }

    #[test]
    fn test_clahe_tiny_image() {
        let img = GrayImage::from_pixel(3, 2, Luma([90]));
        let out = clahe(&img, &ClaheOptions::default());
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_denoise_median_removes_speck() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([255]));
        img.put_pixel(4, 4, Luma([0]));
        let out = denoise_median(&img, 1);
        assert_eq!(out.get_pixel(4, 4)[0], 255);
    }

    fn min_max(img: &GrayImage) -> (u8, u8) {
        let min = img.pixels().map(|p| p[0]).min().unwrap_or(0);
        let max = img.pixels().map(|p| p[0]).max().unwrap_or(0);
        (min, max)
    }
}
