//! Image operations module
//!
//! Pure functions over bitmaps shared by every recognition stage.
//!
//! # Features
//!
//! - Grayscale conversion, median/Gaussian denoising
//! - Global histogram equalization and tiled local contrast (CLAHE)
//! - Otsu, adaptive and blended binarization
//! - Morphological open/close/dilate/erode
//! - Summed-area tables for fast window statistics
//!
//! No function here mutates its input; every operation returns a new bitmap.
//!
//! # Example
//!
//! ```rust,no_run
//! use gabarito_scan::image_ops::{self, ClaheOptions};
//!
//! let page = image::open("page.png").unwrap();
//! let gray = image_ops::to_gray(&page);
//! let enhanced = image_ops::clahe(&gray, &ClaheOptions::default());
//! let marks = image_ops::binarize_blended(&enhanced, &Default::default());
//! println!("ink ratio: {:.3}", image_ops::foreground_ratio(&marks));
//! ```

mod enhance;
mod integral;
mod morphology;
mod threshold;

pub use enhance::{
    boost_contrast, clahe, crop_gray, crop_rgb, denoise_gaussian, denoise_median, equalize,
    invert, resize_gray, to_gray, ClaheOptions,
};
pub use integral::IntegralImage;
pub use morphology::{
    close3, close_rect, count_foreground, dilate_rect, erode_rect, foreground_ratio, open3,
    open_rect,
};
pub use threshold::{
    adaptive_threshold, binarize_blended, binarize_otsu, blend_binary, otsu_level,
    threshold_binary, AdaptiveMethod, BlendOptions, Polarity, BLEND_CUTOFF, DEFAULT_BLOCK_RADIUS,
    DEFAULT_OFFSET,
};

/// Pixel value used for foreground (ink) in binary masks
pub const FOREGROUND: u8 = 255;

/// Pixel value used for background in binary masks
pub const BACKGROUND: u8 = 0;

/// Pixel value of blank paper, used as fill for resampling borders
pub const PAPER_WHITE: u8 = 255;
