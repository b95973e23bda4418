//! Morphological clean-up of binary masks
//!
//! Square 3x3 operations delegate to `imageproc::morphology`; rectangular
//! kernels (2x2, 2x1, ...) are separable max/min passes with the anchor at
//! `(kw / 2, kh / 2)`. Erosion uses the reflected window so that even-sized
//! openings and closings do not shift the mask. Pixels outside the image
//! are ignored.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

use super::BACKGROUND;

/// 3x3 opening (erode then dilate), removes isolated specks
pub fn open3(mask: &GrayImage) -> GrayImage {
    morphology::open(mask, Norm::LInf, 1)
}

/// 3x3 closing (dilate then erode), reconnects broken strokes
pub fn close3(mask: &GrayImage) -> GrayImage {
    morphology::close(mask, Norm::LInf, 1)
}

/// Dilate with a `kw x kh` rectangle
pub fn dilate_rect(mask: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let horizontal = sweep(mask, kw, Axis::X, false, u8::max);
    sweep(&horizontal, kh, Axis::Y, false, u8::max)
}

/// Erode with a `kw x kh` rectangle
pub fn erode_rect(mask: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let horizontal = sweep(mask, kw, Axis::X, true, u8::min);
    sweep(&horizontal, kh, Axis::Y, true, u8::min)
}

/// Opening with a `kw x kh` rectangle
pub fn open_rect(mask: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    dilate_rect(&erode_rect(mask, kw, kh), kw, kh)
}

/// Closing with a `kw x kh` rectangle
pub fn close_rect(mask: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    erode_rect(&dilate_rect(mask, kw, kh), kw, kh)
}

/// Count foreground pixels inside a window (clamped to the mask)
pub fn count_foreground(mask: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> u64 {
    let (w, h) = mask.dimensions();
    let x1 = x.saturating_add(width).min(w);
    let y1 = y.saturating_add(height).min(h);
    let mut count = 0u64;
    for yy in y.min(h)..y1 {
        for xx in x.min(w)..x1 {
            if mask.get_pixel(xx, yy).0[0] != BACKGROUND {
                count += 1;
            }
        }
    }
    count
}

/// Fraction of foreground pixels in the whole mask
pub fn foreground_ratio(mask: &GrayImage) -> f64 {
    let (w, h) = mask.dimensions();
    let area = u64::from(w) * u64::from(h);
    if area == 0 {
        return 0.0;
    }
    count_foreground(mask, 0, 0, w, h) as f64 / area as f64
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

fn sweep(mask: &GrayImage, size: u32, axis: Axis, reflect: bool, pick: fn(u8, u8) -> u8) -> GrayImage {
    if size <= 1 {
        return mask.clone();
    }
    let (w, h) = mask.dimensions();
    let anchor = if reflect { size - 1 - size / 2 } else { size / 2 };
    GrayImage::from_fn(w, h, |x, y| {
        let (pos, limit) = match axis {
            Axis::X => (x, w),
            Axis::Y => (y, h),
        };
        let start = pos.saturating_sub(anchor);
        let end = (pos + size - anchor).min(limit);
        let mut acc = mask.get_pixel(x, y).0[0];
        for i in start..end {
            let v = match axis {
                Axis::X => mask.get_pixel(i, y).0[0],
                Axis::Y => mask.get_pixel(x, i).0[0],
            };
            acc = pick(acc, v);
        }
        image::Luma([acc])
    })
}
