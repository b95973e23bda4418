//! Debug images for bubble detection

use super::types::{BubbleError, BubbleOptions, GridSpec, Result, ALTERNATIVE_LABELS};
use crate::image_ops;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Overlay color for ROI rectangles
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Write the mark mask, each ROI crop and each alternative crop
///
/// Layout: `bin/binarized.png`, `rois/roi_<q>.png`,
/// `subrois/roi_<q>_alt_<label>.png`.
pub fn write_debug_images(dir: &Path, mask: &GrayImage, grid: &GridSpec, options: &BubbleOptions) -> Result<()> {
    let bin_dir = dir.join("bin");
    let rois_dir = dir.join("rois");
    let sub_dir = dir.join("subrois");
    fs::create_dir_all(&bin_dir)?;
    fs::create_dir_all(&rois_dir)?;
    fs::create_dir_all(&sub_dir)?;

    save(mask, &bin_dir.join("binarized.png"))?;

    let (w, h) = mask.dimensions();
    for q in grid.questions() {
        let Some(layout) = q.roi.layout(w, h, q.alternatives, options.partial_roi) else {
            continue;
        };
        let r = layout.rect;
        let crop = image_ops::crop_gray(mask, r.x, r.y, r.width, r.height);
        save(&crop, &rois_dir.join(format!("roi_{}.png", q.question)))?;

        for (cell, label) in layout.cells.iter().zip(ALTERNATIVE_LABELS) {
            let crop = image_ops::crop_gray(mask, cell.x, cell.y, cell.width, cell.height);
            save(&crop, &sub_dir.join(format!("roi_{}_alt_{}.png", q.question, label)))?;
        }
    }
    debug!(dir = %dir.display(), "Bubble debug images written");
    Ok(())
}

/// Copy of `image` with every ROI outlined (2 px)
pub fn draw_grid_overlay(image: &RgbImage, grid: &GridSpec) -> RgbImage {
    let mut out = image.clone();
    for q in grid.questions() {
        let roi = q.roi;
        if roi.width <= 0 || roi.height <= 0 {
            continue;
        }
        for inset in 0..2i32 {
            let w = roi.width - 2 * inset;
            let h = roi.height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(roi.x + inset, roi.y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut out, rect, OVERLAY_COLOR);
        }
    }
    out
}

fn save(image: &GrayImage, path: &Path) -> Result<()> {
    image.save(path).map_err(|source| BubbleError::DebugWrite {
        path: path.to_path_buf(),
        source,
    })
}
