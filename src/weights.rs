//! Adaptive bilateral support weights.
//!
//! For every pixel, the optimizer and the median filter need a P×P table
//! of weights combining color similarity and spatial proximity. Storing
//! that table for every pixel of the image costs `O(H * W * P^2)` — for a
//! 450x375 image with `P = 35` that is roughly 210 MB of `f32`. Instead,
//! this factors the table per the design note: a single shared proximity
//! table (independent of the patch center) is precomputed once, and the
//! color term is evaluated on demand against the source image for whichever
//! pixel is currently being processed. The optimizer still only computes a
//! patch's weight table once per pixel per pass and reuses it across that
//! pixel's propagation/search/view-propagation candidates.

use itertools::iproduct;

use crate::image::Image;

/// The spatial-proximity half of the bilateral weight, shared by every
/// pixel in an image (the term does not depend on the patch center).
#[derive(Clone, Debug)]
pub struct ProximityTable {
    data: Vec<f32>,
    patch_width: usize,
}

impl ProximityTable {
    /// Builds the `P x P` proximity table `exp(-||(dy, dx)|| / gamma_proximity)`.
    pub fn build(patch_radius: usize, gamma_proximity: f32) -> Self {
        let patch_width = 2 * patch_radius + 1;
        let r = patch_radius as f32;
        let mut data = vec![0.0; patch_width * patch_width];
        for dy in 0..patch_width {
            for dx in 0..patch_width {
                let fy = dy as f32 - r;
                let fx = dx as f32 - r;
                let dist = (fy * fy + fx * fx).sqrt();
                data[dy * patch_width + dx] = (-dist / gamma_proximity).exp();
            }
        }
        ProximityTable { data, patch_width }
    }

    /// Looks up the proximity weight at offset `(dy, dx)` from the patch
    /// center, where `dy, dx` are already shifted into `[0, patch_width)`.
    #[inline]
    fn get(&self, dy: usize, dx: usize) -> f32 {
        self.data[dy * self.patch_width + dx]
    }

    /// Whether every entry is finite. Used as a cheap guard against a
    /// non-finite `gamma_proximity` slipping past configuration validation.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Computes bilateral weights on demand against a source image.
#[derive(Clone, Copy, Debug)]
pub struct BilateralWeights<'a> {
    proximity: &'a ProximityTable,
    patch_radius: usize,
    gamma_color: f32,
}

impl<'a> BilateralWeights<'a> {
    /// Creates a weight evaluator over the given shared proximity table.
    pub fn new(proximity: &'a ProximityTable, patch_radius: usize, gamma_color: f32) -> Self {
        BilateralWeights {
            proximity,
            patch_radius,
            gamma_color,
        }
    }

    /// Patch width `P = 2R + 1`.
    pub fn patch_width(&self) -> usize {
        2 * self.patch_radius + 1
    }

    /// Computes the full P×P weight table for the patch centered at
    /// `(yc, xc)` in `image`. Out-of-image sample positions are left at
    /// zero. Row-major, index `(y - yc + R) * P + (x - xc + R)`.
    pub fn window(&self, image: &Image, yc: usize, xc: usize) -> Vec<f32> {
        let p = self.patch_width();
        let r = self.patch_radius as isize;
        let mut out = vec![0.0f32; p * p];
        let height = image.height() as isize;
        let width = image.width() as isize;
        let yb = (yc as isize - r).max(0);
        let ye = (yc as isize + r).min(height - 1);
        let xb = (xc as isize - r).max(0);
        let xe = (xc as isize + r).min(width - 1);

        for (y, x) in iproduct!(yb..=ye, xb..=xe) {
            let dy = (y - yc as isize + r) as usize;
            let dx = (x - xc as isize + r) as usize;
            let color_dist = image.l1_distance((yc, xc), (y as usize, x as usize));
            let color_w = (-color_dist / self.gamma_color).exp();
            out[dy * p + dx] = color_w * self.proximity.get(dy, dx);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> Image {
        let mut data = vec![0u8; 10 * 10 * 3];
        for y in 0..10 {
            for x in 0..10 {
                let idx = (y * 10 + x) * 3;
                data[idx] = ((y * 23 + x * 7) % 256) as u8;
                data[idx + 1] = ((y * 11 + x * 3) % 256) as u8;
                data[idx + 2] = ((y * 5 + x * 41) % 256) as u8;
            }
        }
        Image::from_vec(10, 10, 3, data)
    }

    #[test]
    fn center_weight_is_one() {
        let prox = ProximityTable::build(3, 25.0);
        let weights = BilateralWeights::new(&prox, 3, 10.0);
        let image = test_image();
        let window = weights.window(&image, 5, 5);
        let p = weights.patch_width();
        assert!((window[3 * p + 3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_bounds_positions_are_zero() {
        let prox = ProximityTable::build(3, 25.0);
        let weights = BilateralWeights::new(&prox, 3, 10.0);
        let image = test_image();
        let window = weights.window(&image, 0, 0);
        let p = weights.patch_width();
        // Position (dy=0, dx=0) corresponds to (y=-3, x=-3), out of bounds.
        assert_eq!(window[0], 0.0);
        // Position (dy=3, dx=3) is the center, always in bounds and positive.
        assert!(window[3 * p + 3] > 0.0);
    }

    #[test]
    fn in_bounds_weights_are_strictly_positive() {
        let prox = ProximityTable::build(2, 25.0);
        let weights = BilateralWeights::new(&prox, 2, 10.0);
        let image = test_image();
        let window = weights.window(&image, 5, 5);
        for v in window {
            assert!(v > 0.0);
        }
    }
}
