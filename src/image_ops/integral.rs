//! Summed-area tables
//!
//! Window sums and sums of squares in O(1) per query, used by the adaptive
//! threshold and by the zero-mean correlation score of the localizer.

use image::GrayImage;

/// Integral image of pixel values and squared pixel values.
///
/// `sums[y * (width + 1) + x]` holds the sum of all pixels in the rectangle
/// `[0, x) x [0, y)`; the table has a zero-padded first row and column.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: u32,
    height: u32,
    sums: Vec<u64>,
    squares: Vec<u64>,
}

impl IntegralImage {
    /// Build the tables for a grayscale image
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let stride = (width + 1) as usize;
        let mut sums = vec![0u64; stride * (height + 1) as usize];
        let mut squares = vec![0u64; stride * (height + 1) as usize];

        for y in 0..height as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width as usize {
                let v = u64::from(gray.get_pixel(x as u32, y as u32).0[0]);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sums[idx] = sums[idx - stride] + row_sum;
                squares[idx] = squares[idx - stride] + row_sq;
            }
        }

        Self {
            width,
            height,
            sums,
            squares,
        }
    }

    /// Source image dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sum of pixels in the window at `(x, y)` of size `w x h` (clamped)
    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::window(&self.sums, self.stride(), self.clamp(x, y, w, h))
    }

    /// Sum of squared pixels in the window (clamped)
    pub fn sum_squares(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::window(&self.squares, self.stride(), self.clamp(x, y, w, h))
    }

    /// Mean of the window, 0.0 for an empty window
    pub fn mean(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let (x0, y0, x1, y1) = self.clamp(x, y, w, h);
        let area = u64::from(x1 - x0) * u64::from(y1 - y0);
        if area == 0 {
            return 0.0;
        }
        Self::window(&self.sums, self.stride(), (x0, y0, x1, y1)) as f64 / area as f64
    }

    fn stride(&self) -> usize {
        (self.width + 1) as usize
    }

    fn clamp(&self, x: u32, y: u32, w: u32, h: u32) -> (u32, u32, u32, u32) {
        let x0 = x.min(self.width);
        let y0 = y.min(self.height);
        let x1 = x.saturating_add(w).min(self.width);
        let y1 = y.saturating_add(h).min(self.height);
        (x0, y0, x1, y1)
    }

    fn window(table: &[u64], stride: usize, (x0, y0, x1, y1): (u32, u32, u32, u32)) -> u64 {
        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_window_sums_match_brute_force() {
        let img = GrayImage::from_fn(7, 5, |x, y| Luma([(x * 10 + y * 3) as u8]));
        let integral = IntegralImage::new(&img);

        let mut expected = 0u64;
        let mut expected_sq = 0u64;
        for y in 1..4 {
            for x in 2..6 {
                let v = u64::from(img.get_pixel(x, y)[0]);
                expected += v;
                expected_sq += v * v;
            }
        }

        assert_eq!(integral.sum(2, 1, 4, 3), expected);
        assert_eq!(integral.sum_squares(2, 1, 4, 3), expected_sq);
    }

    #[test]
    fn test_window_clamped_to_bounds() {
        let img = GrayImage::from_pixel(4, 4, Luma([1]));
        let integral = IntegralImage::new(&img);
        assert_eq!(integral.sum(2, 2, 100, 100), 4);
        assert_eq!(integral.sum(10, 10, 5, 5), 0);
        assert_eq!(integral.mean(10, 10, 5, 5), 0.0);
        assert_eq!(integral.mean(0, 0, 4, 4), 1.0);
    }
}
