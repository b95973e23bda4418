//! Digit-oriented preprocessing for matrícula crops
//!
//! Every output is paper-white with dark digits and a white margin, the
//! layout Tesseract reads best.

use crate::image_ops::{
    self, AdaptiveMethod, Polarity, DEFAULT_BLOCK_RADIUS, DEFAULT_OFFSET, PAPER_WHITE,
};
use crate::ocr::PageSegMode;
use image::{GrayImage, Luma};

/// White margin added around OCR input (pixels)
pub const OCR_PADDING: u32 = 10;

/// Contrast factor applied before binarization
const CONTRAST_BOOST: f32 = 1.5;

/// Above this paper fraction a crop is opened to thicken thin digits
const MOSTLY_WHITE: f64 = 0.5;

/// Below this paper fraction a crop is closed to separate blotted digits
const MOSTLY_DARK: f64 = 0.2;

/// One preprocessed image and the segmentation mode to read it with
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: &'static str,
    pub image: GrayImage,
    pub mode: PageSegMode,
}

/// Denoise, boost contrast, binarize and reconnect broken strokes
///
/// With `equalize_first` the crop is histogram-equalized before anything
/// else, which helps with the washed-out output of office printers'
/// scanners.
pub fn digit_pipeline(crop: &GrayImage, equalize_first: bool) -> GrayImage {
    pad_white(&paper_from_ink(&ink_mask(crop, equalize_first)), OCR_PADDING)
}

/// Ink mask (255 = ink) after denoise, contrast boost, Otsu and a 2x2 close
pub fn ink_mask(crop: &GrayImage, equalize_first: bool) -> GrayImage {
    let base = if equalize_first {
        image_ops::equalize(crop)
    } else {
        crop.clone()
    };
    let denoised = image_ops::denoise_median(&base, 1);
    let boosted = image_ops::boost_contrast(&denoised, CONTRAST_BOOST);
    let ink = image_ops::binarize_otsu(&boosted, Polarity::DarkInk);
    image_ops::close_rect(&ink, 2, 2)
}

/// Paper-white image from an ink mask, with adaptive clean-up
fn paper_from_ink(ink: &GrayImage) -> GrayImage {
    adaptive_morphology(&image_ops::invert(ink))
}

/// Open a mostly-white binary image (2x2), close a mostly-dark one (2x1)
pub fn adaptive_morphology(paper: &GrayImage) -> GrayImage {
    let white = image_ops::foreground_ratio(paper);
    if white > MOSTLY_WHITE {
        image_ops::open_rect(paper, 2, 2)
    } else if white < MOSTLY_DARK {
        image_ops::close_rect(paper, 2, 1)
    } else {
        paper.clone()
    }
}

/// Surround with a white border
pub fn pad_white(gray: &GrayImage, pad: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::from_pixel(w + 2 * pad, h + 2 * pad, Luma([PAPER_WHITE]));
    image::imageops::replace(&mut out, gray, i64::from(pad), i64::from(pad));
    out
}

/// Independent preprocessing variants for the ensemble vote
///
/// `modes[0]` reads every variant; the base image is read once more with
/// `modes[1]` (or single word when only one mode is configured).
pub fn ensemble_variants(region: &GrayImage, equalize_first: bool, modes: &[PageSegMode]) -> Vec<Variant> {
    let primary = modes.first().copied().unwrap_or(PageSegMode::SingleLine);
    let alternate = modes.get(1).copied().unwrap_or(PageSegMode::SingleWord);

    let ink = ink_mask(region, equalize_first);
    let base = pad_white(&paper_from_ink(&ink), OCR_PADDING);
    let dilated = pad_white(&image_ops::invert(&image_ops::dilate_rect(&ink, 2, 2)), OCR_PADDING);
    let eroded = pad_white(&image_ops::invert(&image_ops::erode_rect(&ink, 2, 2)), OCR_PADDING);
    let adaptive_ink = image_ops::adaptive_threshold(
        &image_ops::denoise_median(region, 1),
        AdaptiveMethod::Gaussian,
        DEFAULT_BLOCK_RADIUS,
        DEFAULT_OFFSET,
        Polarity::DarkInk,
    );
    let adaptive = pad_white(&paper_from_ink(&adaptive_ink), OCR_PADDING);
    let inverted = image_ops::invert(&base);

    vec![
        Variant { name: "base", image: base.clone(), mode: primary },
        Variant { name: "inverted", image: inverted, mode: primary },
        Variant { name: "dilated", image: dilated, mode: primary },
        Variant { name: "eroded", image: eroded, mode: primary },
        Variant { name: "adaptive", image: adaptive, mode: primary },
        Variant { name: "alternate_psm", image: base, mode: alternate },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn digits_like() -> GrayImage {
        let mut img = GrayImage::from_pixel(120, 40, Luma([235]));
        for i in 0..5 {
            draw_filled_rect_mut(&mut img, Rect::at(10 + i * 22, 8).of_size(6, 24), Luma([30]));
        }
        img
    }

    #[test]
    fn test_digit_pipeline_is_paper_white() {
        let out = digit_pipeline(&digits_like(), false);
        assert_eq!(out.dimensions(), (120 + 2 * OCR_PADDING, 40 + 2 * OCR_PADDING));
        assert_eq!(out.get_pixel(0, 0).0[0], PAPER_WHITE);
        // Stroke centre stays dark, gap between strokes stays white
        assert_eq!(out.get_pixel(OCR_PADDING + 13, OCR_PADDING + 20).0[0], 0);
        assert_eq!(out.get_pixel(OCR_PADDING + 24, OCR_PADDING + 20).0[0], PAPER_WHITE);
    }

    #[test]
    fn test_pad_white() {
        let img = GrayImage::from_pixel(3, 2, Luma([0]));
        let out = pad_white(&img, 2);
        assert_eq!(out.dimensions(), (7, 6));
        assert_eq!(out.get_pixel(1, 1).0[0], 255);
        assert_eq!(out.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn test_adaptive_morphology_bands() {
        // Mostly dark: 2x1 close fills a one-pixel white gap
        let mut dark = GrayImage::new(10, 10);
        dark.put_pixel(5, 5, Luma([255]));
        dark.put_pixel(6, 5, Luma([255]));
        let closed = adaptive_morphology(&dark);
        assert_eq!(closed.get_pixel(5, 5).0[0], 255);

        // Mostly white: 2x2 open removes an isolated white pixel in a dark patch
        let mut white = GrayImage::from_pixel(10, 10, Luma([255]));
        draw_filled_rect_mut(&mut white, Rect::at(2, 2).of_size(5, 5), Luma([0]));
        white.put_pixel(4, 4, Luma([255]));
        let opened = adaptive_morphology(&white);
        assert_eq!(opened.get_pixel(4, 4).0[0], 0);
        assert_eq!(opened.get_pixel(9, 9).0[0], 255);
    }

    #[test]
    fn test_ensemble_variants() {
        let variants = ensemble_variants(
            &digits_like(),
            false,
            &[PageSegMode::SingleLine, PageSegMode::SingleBlock],
        );
        let names: Vec<&str> = variants.iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["base", "inverted", "dilated", "eroded", "adaptive", "alternate_psm"]);
        assert_eq!(variants[0].mode, PageSegMode::SingleLine);
        assert_eq!(variants[5].mode, PageSegMode::SingleBlock);
        assert_eq!(variants[1].image.get_pixel(0, 0).0[0], 0);
    }
}
