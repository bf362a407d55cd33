//! Plane matching cost functionals.
//!
//! Two cost functionals are provided: a DSI-indexed cost that looks up a
//! precomputed per-disparity cost tensor, and a raw-image photometric cost
//! that interpolates between two columns of the other view. Both are pure:
//! they only read the plane, the precomputed patch weights, and the
//! image/DSI data passed in.

use itertools::iproduct;

use crate::dsi::Dsi;
use crate::image::Image;
use crate::plane::Plane;

/// Evaluates the DSI-based cost of `plane` at `(yc, xc)`.
///
/// For every in-bounds `(y, x)` in the `P x P` window centered at
/// `(yc, xc)`: the plane's rounded disparity `d` at `(y, x)` is looked up
/// in the DSI and weighted by `weights[y, x]`; if `d` falls outside
/// `[0, ndisps)`, `bad_plane_penalty` is added instead. Out-of-bounds
/// samples contribute nothing.
pub fn dsi_plane_cost(
    plane: &Plane,
    yc: usize,
    xc: usize,
    dsi: &Dsi,
    weights: &[f32],
    patch_radius: usize,
    bad_plane_penalty: f32,
) -> f32 {
    let p = 2 * patch_radius + 1;
    let r = patch_radius as isize;
    let height = dsi.height() as isize;
    let width = dsi.width() as isize;
    let ndisps = dsi.ndisps();

    let yb = (yc as isize - r).max(0);
    let ye = (yc as isize + r).min(height - 1);
    let xb = (xc as isize - r).max(0);
    let xe = (xc as isize + r).min(width - 1);

    let mut cost = 0.0f32;
    for (y, x) in iproduct!(yb..=ye, xb..=xe) {
        let d = (plane.disparity_at(y as usize, x as usize) + 0.5).floor();
        let dy = (y - yc as isize + r) as usize;
        let dx = (x - xc as isize + r) as usize;
        let w = weights[dy * p + dx];
        if d < 0.0 || d as usize >= ndisps {
            cost += bad_plane_penalty;
        } else {
            cost += w * dsi.get(y as usize, x as usize, d as usize);
        }
    }
    cost
}

/// Evaluates the raw-image photometric cost of `plane` at `(yc, xc)` in
/// `image_self`, matching against `image_other` with view sign `sign`.
///
/// For every in-bounds `(y, x)`: the plane's real-valued disparity `d` at
/// `(y, x)` is projected into the other view as
/// `x' = clamp(x + sign*d, 0, W-1)`; the cost linearly interpolates the L1
/// color distance between the left floor `xL = floor(x')` and
/// `xR = floor(x' + 0.5)`, with weights `wL = xR - x'`, `wR = 1 - wL` (this
/// swaps the naive left/right naming but still yields valid convex weights
/// in `[0, 1]`, and is preserved bit-for-bit from the reference
/// implementation). Out-of-range disparities add `bad_plane_penalty`
/// instead.
pub fn image_plane_cost(
    plane: &Plane,
    yc: usize,
    xc: usize,
    image_self: &Image,
    image_other: &Image,
    weights: &[f32],
    patch_radius: usize,
    bad_plane_penalty: f32,
    ndisps: usize,
    sign: i32,
) -> f32 {
    let p = 2 * patch_radius + 1;
    let r = patch_radius as isize;
    let height = image_self.height() as isize;
    let width = image_self.width() as isize;

    let yb = (yc as isize - r).max(0);
    let ye = (yc as isize + r).min(height - 1);
    let xb = (xc as isize - r).max(0);
    let xe = (xc as isize + r).min(width - 1);

    let dmax = (ndisps - 1) as f32;
    let mut cost = 0.0f32;
    for (y, x) in iproduct!(yb..=ye, xb..=xe) {
        let d = plane.disparity_at(y as usize, x as usize);
        let dy = (y - yc as isize + r) as usize;
        let dx = (x - xc as isize + r) as usize;
        let w = weights[dy * p + dx];
        if d < 0.0 || d > dmax {
            cost += bad_plane_penalty;
        } else {
            let xm = (x as f32 + sign as f32 * d).clamp(0.0, width as f32 - 1.0);
            let x_left = xm.floor() as usize;
            let x_right = (xm + 0.5).floor() as usize;
            let x_right = x_right.min(width as usize - 1);
            let w_left = x_right as f32 - xm;
            let w_right = 1.0 - w_left;
            let cost_left = image_self.l1_distance_cross((y as usize, x as usize), image_other, (y as usize, x_left));
            let cost_right = image_self.l1_distance_cross((y as usize, x as usize), image_other, (y as usize, x_right));
            cost += w * (w_left * cost_left + w_right * cost_right);
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{BilateralWeights, ProximityTable};

    #[test]
    fn bad_plane_penalty_scales_with_patch_area() {
        // A plane whose disparity at every sample is far outside [0, ndisps)
        // costs exactly P^2 * bad_plane_penalty, when the full patch is
        // in-bounds.
        let height = 40;
        let width = 40;
        let dsi = Dsi::new(height, width, 4);
        let plane = Plane::fronto_parallel(20, 20, 1000.0);
        let patch_radius = 3;
        let p = 2 * patch_radius + 1;
        let weights = vec![1.0f32; p * p]; // weight value is irrelevant when every sample is a bad plane
        let cost = dsi_plane_cost(&plane, 20, 20, &dsi, &weights, patch_radius, 120.0);
        assert_eq!(cost, (p * p) as f32 * 120.0);
    }

    #[test]
    fn zero_disparity_plane_on_identical_images_has_near_zero_cost() {
        let height = 30;
        let width = 30;
        let mut data = vec![0u8; height * width * 3];
        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) * 3;
                data[idx] = ((y * 13 + x * 7) % 256) as u8;
                data[idx + 1] = data[idx];
                data[idx + 2] = data[idx];
            }
        }
        let image = Image::from_vec(height, width, 3, data);
        let prox = ProximityTable::build(3, 25.0);
        let bw = BilateralWeights::new(&prox, 3, 10.0);
        let window = bw.window(&image, 15, 15);
        let plane = Plane::fronto_parallel(15, 15, 0.0);
        let cost = image_plane_cost(&plane, 15, 15, &image, &image, &window, 3, 120.0, 16, -1);
        assert!(cost.abs() < 1e-4);
    }
}
