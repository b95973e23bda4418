//! Bubble Grid Detection Implementation
//!
//! Binarizes the rectified canvas once, then measures every ROI of the grid.

use super::types::{BubbleOptions, GridQuestion, GridSpec, QuestionResult};
use crate::image_ops;
use image::GrayImage;
use tracing::{debug, instrument};

/// Grid-based bubble fill detector
pub struct BubbleGridDetector;

impl BubbleGridDetector {
    /// Detect answers on a rectified canvas
    ///
    /// Always yields one result per ROI, sorted by question number.
    #[instrument(skip_all, fields(questions = grid.len()))]
    pub fn detect(canvas: &GrayImage, grid: &GridSpec, options: &BubbleOptions) -> Vec<QuestionResult> {
        let mask = Self::binarize(canvas, options);
        Self::measure(&mask, grid, options)
    }

    /// Mark mask of a canvas: CLAHE, blended Otsu/adaptive threshold, then a
    /// 3x3 open and close
    pub fn binarize(canvas: &GrayImage, options: &BubbleOptions) -> GrayImage {
        let enhanced = image_ops::clahe(canvas, &options.clahe);
        let binary = image_ops::binarize_blended(&enhanced, &options.blend);
        image_ops::close3(&image_ops::open3(&binary))
    }

    /// Measure every ROI of the grid on an existing mark mask
    pub fn measure(mask: &GrayImage, grid: &GridSpec, options: &BubbleOptions) -> Vec<QuestionResult> {
        let mut results: Vec<QuestionResult> = grid
            .questions()
            .iter()
            .map(|q| Self::measure_question(mask, q, options))
            .collect();
        results.sort_by_key(|r| r.question);
        results
    }

    fn measure_question(mask: &GrayImage, q: &GridQuestion, options: &BubbleOptions) -> QuestionResult {
        let (w, h) = mask.dimensions();
        let Some(layout) = q.roi.layout(w, h, q.alternatives, options.partial_roi) else {
            debug!(question = q.question, roi = ?q.roi, "Invalid ROI");
            return QuestionResult::invalid(q.question, options.threshold_fill);
        };

        let fill_ratios: Vec<f32> = layout
            .cells
            .iter()
            .map(|cell| {
                let area = cell.area();
                if area == 0 {
                    return 0.0;
                }
                let count = image_ops::count_foreground(mask, cell.x, cell.y, cell.width, cell.height);
                (count as f64 / area as f64) as f32
            })
            .collect();

        let decision = options.policy.resolve(&fill_ratios, options.threshold_fill);
        debug!(
            question = q.question,
            ?fill_ratios,
            threshold = decision.threshold,
            value = %decision.value,
            "Question measured"
        );

        QuestionResult {
            question: q.question,
            value: decision.value,
            weak: decision.weak,
            fill_ratios,
            max_fill: decision.max_fill,
            threshold: decision.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::{AnswerValue, PartialRoiPolicy, Roi};
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

    const CELL: i32 = 30;

    /// Canvas with `rows` questions of 4 bubbles; `marks[i]` fills a bubble
    fn sheet(marks: &[Option<usize>]) -> (GrayImage, GridSpec) {
        let mut canvas = GrayImage::from_pixel(300, 40 + marks.len() as u32 * 40, Luma([240]));
        let mut rois = Vec::new();
        for (row, mark) in marks.iter().enumerate() {
            let y = 20 + row as i32 * 40;
            for alt in 0..4 {
                let cx = 40 + alt * CELL + CELL / 2;
                let cy = y + CELL / 2;
                draw_hollow_circle_mut(&mut canvas, (cx, cy), 10, Luma([120]));
                if *mark == Some(alt as usize) {
                    draw_filled_circle_mut(&mut canvas, (cx, cy), 11, Luma([15]));
                }
            }
            rois.push(Roi::new(40, y, 4 * CELL, CELL));
        }
        (canvas, GridSpec::from_rois(rois, 4))
    }

    #[test]
    fn test_detects_marked_bubbles() {
        let (canvas, grid) = sheet(&[Some(1), Some(3), None, Some(0)]);
        let results = BubbleGridDetector::detect(&canvas, &grid, &BubbleOptions::default());
        let values: Vec<AnswerValue> = results.iter().map(|r| r.value).collect();
        assert_eq!(
            values,
            vec![
                AnswerValue::Alternative('B'),
                AnswerValue::Alternative('D'),
                AnswerValue::Blank,
                AnswerValue::Alternative('A'),
            ]
        );
        assert_eq!(results[0].fill_ratios.len(), 4);
    }

    #[test]
    fn test_idempotent() {
        let (canvas, grid) = sheet(&[Some(2), None]);
        let options = BubbleOptions::default();
        let a = BubbleGridDetector::detect(&canvas, &grid, &options);
        let b = BubbleGridDetector::detect(&canvas, &grid, &options);
        assert_eq!(a, b);
    }

    #[test]
    fn test_results_sorted_by_question() {
        let (canvas, mut grid) = sheet(&[Some(0), Some(1), Some(2)]);
        // Raster order 3, 1, 2
        grid.columns[0][0].question = Some(3);
        grid.columns[0][1].question = Some(1);
        grid.columns[0][2].question = Some(2);

        let results = BubbleGridDetector::detect(&canvas, &grid, &BubbleOptions::default());
        let order: Vec<u32> = results.iter().map(|r| r.question).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(results[2].value, AnswerValue::Alternative('A'));
        assert_eq!(results[0].value, AnswerValue::Alternative('B'));
    }

    #[test]
    fn test_out_of_canvas_rois_are_invalid() {
        let (canvas, mut grid) = sheet(&[Some(0)]);
        let (w, h) = canvas.dimensions();
        grid.columns[0].push(Roi::new(w as i32 - 10, 10, 100, 20));
        grid.columns[0].push(Roi::new(w as i32 + 50, h as i32 + 50, 100, 20));
        grid.columns[0].push(Roi::new(10, 10, 0, 20));

        let results = BubbleGridDetector::detect(&canvas, &grid, &BubbleOptions::default());
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].value, AnswerValue::Alternative('A'));
        for r in &results[1..] {
            assert_eq!(r.value, AnswerValue::InvalidRoi);
            assert!(r.fill_ratios.is_empty());
        }
    }

    #[test]
    fn test_clip_policy_measures_inside_part() {
        let (canvas, mut grid) = sheet(&[Some(0)]);
        let (w, _) = canvas.dimensions();
        grid.columns[0].push(Roi::new(w as i32 - 40, 10, 100, 20));

        let options = BubbleOptions::builder().partial_roi(PartialRoiPolicy::Clip).build();
        let results = BubbleGridDetector::detect(&canvas, &grid, &options);
        assert_ne!(results[1].value, AnswerValue::InvalidRoi);
        assert_eq!(results[1].fill_ratios.len(), 4);
    }

    #[test]
    fn test_invalid_alternatives_count() {
        let (canvas, mut grid) = sheet(&[Some(0)]);
        grid.columns[0][0].alternatives = Some(7);
        let results = BubbleGridDetector::detect(&canvas, &grid, &BubbleOptions::default());
        assert_eq!(results[0].value, AnswerValue::InvalidRoi);
    }

    #[test]
    fn test_measure_on_prepared_mask() {
        let mut mask = GrayImage::new(40, 10);
        for y in 0..10 {
            for x in 10..20 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let grid = GridSpec::from_rois(vec![Roi::new(0, 0, 40, 10)], 4);
        let results = BubbleGridDetector::measure(&mask, &grid, &BubbleOptions::default());
        assert_eq!(results[0].value, AnswerValue::Alternative('B'));
        assert_eq!(results[0].fill_ratios, vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(results[0].max_fill, 1.0);
    }
}
