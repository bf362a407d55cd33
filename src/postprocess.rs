//! Disparity map materialization, cross-view consistency checking, and
//! weighted median filtering.

use itertools::iproduct;
use rayon::prelude::*;

use crate::image::Grid;
use crate::plane::PlaneField;
use crate::weights::BilateralWeights;

/// Materializes a disparity map by evaluating each pixel's own plane at its
/// own coordinate.
pub fn planes_to_disparity(planes: &PlaneField) -> Grid<f32> {
    let height = planes.height();
    let width = planes.width();
    let mut disp = Grid::new(height, width);
    for (y, x) in iproduct!(0..height, 0..width) {
        disp.set(y, x, planes.get(y, x).disparity_at(y, x));
    }
    disp
}

/// Checks cross-view consistency between a view's disparity map and the
/// other view's, marking a pixel valid when the two views agree on
/// disparity within one pixel.
///
/// The projected coordinate is clamped to `[0, width]`, not `[0, width-1]`
/// — preserved from the reference implementation. A projection landing
/// exactly on `width` is out of bounds and is treated as invalid rather
/// than read (the original performs this read, which is technically
/// undefined; see the crate's design notes).
pub fn cross_check(disp_self: &Grid<f32>, disp_other: &Grid<f32>, sign: i32) -> Grid<bool> {
    let height = disp_self.height();
    let width = disp_self.width();
    let mut valid = Grid::new(height, width);
    for (y, x) in iproduct!(0..height, 0..width) {
        let d = disp_self.get(y, x);
        let projected = (x as f32 + sign as f32 * d).clamp(0.0, width as f32);
        let is_valid = if projected >= width as f32 {
            false
        } else {
            let xq = projected as usize;
            (d - disp_other.get(y, xq)).abs() <= 1.0
        };
        valid.set(y, x, is_valid);
    }
    valid
}

/// Fills an invalid pixel by scanning its scanline for the nearest valid
/// neighbor in each direction and choosing the one with the lower
/// disparity evaluated at `(y, x)` (ties and one-sided availability favor
/// the left neighbor, matching the reference implementation).
pub fn fill_hole(y: usize, x: usize, valid: &Grid<bool>, planes: &PlaneField) -> crate::plane::Plane {
    let width = planes.width();
    let mut xl = x as isize - 1;
    while xl >= 0 && !valid.get(y, xl as usize) {
        xl -= 1;
    }
    let mut xr = x + 1;
    while xr < width && !valid.get(y, xr) {
        xr += 1;
    }

    let mut best_x = x;
    let mut best_is_left = false;
    if xl >= 0 {
        best_x = xl as usize;
        best_is_left = true;
    }
    if xr < width {
        if best_is_left {
            let d_l = planes.get(y, xl as usize).disparity_at(y, x);
            let d_r = planes.get(y, xr).disparity_at(y, x);
            if d_r < d_l {
                best_x = xr;
            }
        } else {
            best_x = xr;
        }
    }
    planes.get(y, best_x)
}

/// Computes the weighted median of the disparities in the `P x P`
/// neighborhood of `(yc, xc)` (patch radius `patch_radius`), weighted by
/// the precomputed bilateral `weights` window, reading from `disp` without
/// mutating it. Returns `None` if the neighborhood contributes no samples
/// (e.g. every neighbor is invalid and `use_invalid_pixels` is `false`).
fn weighted_median_value(
    yc: usize,
    xc: usize,
    disp: &Grid<f32>,
    weights: &[f32],
    valid: &Grid<bool>,
    patch_radius: usize,
    use_invalid_pixels: bool,
) -> Option<f32> {
    let r = patch_radius as isize;
    let p = 2 * patch_radius + 1;
    let height = disp.height() as isize;
    let width = disp.width() as isize;
    let yb = (yc as isize - r).max(0);
    let ye = (yc as isize + r).min(height - 1);
    let xb = (xc as isize - r).max(0);
    let xe = (xc as isize + r).min(width - 1);

    let mut pairs: Vec<(f32, f32)> = Vec::new();
    for y in yb..=ye {
        for x in xb..=xe {
            if use_invalid_pixels || valid.get(y as usize, x as usize) {
                let dy = (y - yc as isize + r) as usize;
                let dx = (x - xc as isize + r) as usize;
                pairs.push((disp.get(y as usize, x as usize), weights[dy * p + dx]));
            }
        }
    }
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.partial_cmp(b).expect("disparity and weight values are always finite"));

    let wsum: f32 = pairs.iter().map(|&(_, w)| w).sum();
    let mut acc = 0.0f32;
    for i in 0..pairs.len() {
        acc += pairs[i].1;
        if acc >= wsum / 2.0 {
            return Some(if i > 0 { (pairs[i - 1].0 + pairs[i].0) / 2.0 } else { pairs[i].0 });
        }
    }
    None
}

/// Replaces `disp[yc, xc]` with the weighted median of the disparities in
/// its `P x P` neighborhood (patch radius `patch_radius`), weighted by the
/// precomputed bilateral `weights` window. When `use_invalid_pixels` is
/// `false`, only neighbors marked valid in `valid` contribute. Leaves
/// `disp[yc, xc]` untouched if the neighborhood contributes no samples.
pub fn weighted_median_filter(
    yc: usize,
    xc: usize,
    disp: &mut Grid<f32>,
    weights: &[f32],
    valid: &Grid<bool>,
    patch_radius: usize,
    use_invalid_pixels: bool,
) {
    if let Some(value) = weighted_median_value(yc, xc, disp, weights, valid, patch_radius, use_invalid_pixels) {
        disp.set(yc, xc, value);
    }
}

/// Runs the full post-processing pipeline for one view against the other:
/// optionally fills scanline holes, cross-checks against the other view's
/// plane-materialized disparity, and runs `median_rounds` weighted median
/// filtering passes over invalid pixels.
///
/// Each round re-materializes both views' disparity maps directly from
/// their plane fields before cross-checking, rather than carrying forward
/// the previous round's filtered values — mirroring the reference
/// implementation, where `median_rounds` only matters through the
/// per-round `use_invalid_pixels_in_median_last_round` switch, not through
/// accumulated filtering. Returns the final disparity map and validity
/// mask for `planes_self`.
#[allow(clippy::too_many_arguments)]
pub fn post_process_view(
    planes_self: &PlaneField,
    planes_other: &PlaneField,
    image_self: &crate::image::Image,
    proximity: &crate::weights::ProximityTable,
    sign: i32,
    patch_radius: usize,
    gamma_color: f32,
    hole_fill: bool,
    median_rounds: usize,
    use_invalid_pixels_in_median_last_round: bool,
) -> (Grid<f32>, Grid<bool>) {
    let height = planes_self.height();
    let width = planes_self.width();
    let bw = BilateralWeights::new(proximity, patch_radius, gamma_color);

    let mut filled = None;
    if hole_fill {
        let disp = planes_to_disparity(planes_self);
        let disp_other = planes_to_disparity(planes_other);
        let valid = cross_check(&disp, &disp_other, sign);
        let mut filled_planes = planes_self.clone();
        for (y, x) in iproduct!(0..height, 0..width) {
            if !valid.get(y, x) {
                filled_planes.set(y, x, fill_hole(y, x, &valid, planes_self));
            }
        }
        filled = Some(filled_planes);
    }
    let source_planes = filled.as_ref().unwrap_or(planes_self);

    let mut disp = planes_to_disparity(source_planes);
    let disp_other = planes_to_disparity(planes_other);
    let mut valid = cross_check(&disp, &disp_other, sign);

    // median_rounds == 0 disables the filter without disabling the
    // cross-check above.
    for round in 0..median_rounds {
        disp = planes_to_disparity(source_planes);
        let disp_other = planes_to_disparity(planes_other);
        valid = cross_check(&disp, &disp_other, sign);
        let use_invalid = if round + 1 == median_rounds {
            use_invalid_pixels_in_median_last_round
        } else {
            true
        };

        let snapshot = disp.clone();
        let targets: Vec<(usize, usize)> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (y, x)))
            .filter(|&(y, x)| !valid.get(y, x))
            .collect();
        let updates: Vec<((usize, usize), Option<f32>)> = targets
            .into_par_iter()
            .map(|(y, x)| {
                let window = bw.window(image_self, y, x);
                let value = weighted_median_value(y, x, &snapshot, &window, &valid, patch_radius, use_invalid);
                ((y, x), value)
            })
            .collect();
        for ((y, x), value) in updates {
            if let Some(v) = value {
                disp.set(y, x, v);
            }
        }
    }
    (disp, valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::Plane;

    fn constant_planes(height: usize, width: usize, z: f32) -> PlaneField {
        let mut pf = PlaneField::new(height, width);
        for y in 0..height {
            for x in 0..width {
                pf.set(y, x, Plane::fronto_parallel(y, x, z));
            }
        }
        pf
    }

    #[test]
    fn planes_to_disparity_reads_back_constant_plane() {
        let pf = constant_planes(5, 5, 3.0);
        let disp = planes_to_disparity(&pf);
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(disp.get(y, x), 3.0);
            }
        }
    }

    #[test]
    fn cross_check_agrees_when_disparities_match_exactly() {
        let height = 10;
        let width = 10;
        let pl = constant_planes(height, width, 2.0);
        let pr = constant_planes(height, width, 2.0);
        let disp_l = planes_to_disparity(&pl);
        let disp_r = planes_to_disparity(&pr);
        let valid_l = cross_check(&disp_l, &disp_r, -1);
        for y in 0..height {
            for x in 2..width {
                assert!(valid_l.get(y, x), "expected valid at ({y}, {x})");
            }
        }
    }

    #[test]
    fn cross_check_projection_landing_on_width_is_invalid() {
        let height = 1;
        let width = 4;
        let mut disp_l = Grid::new(height, width);
        disp_l.set(0, 0, -4.0); // projected = 0 - (-4) = 4 == width, with sign=+1
        let disp_r = Grid::new(height, width);
        let valid = cross_check(&disp_l, &disp_r, 1);
        assert!(!valid.get(0, 0));
    }

    #[test]
    fn weighted_median_filter_uses_only_valid_neighbors_when_requested() {
        let mut disp = Grid::new(3, 3);
        // Center is an outlier the filter should overwrite using its
        // (all-valid) neighbors.
        let values = [[10.0, 10.0, 10.0], [10.0, 999.0, 10.0], [10.0, 10.0, 10.0]];
        for y in 0..3 {
            for x in 0..3 {
                disp.set(y, x, values[y][x]);
            }
        }
        let mut valid = Grid::filled(3, 3, true);
        valid.set(1, 1, false);
        let weights = vec![1.0f32; 9];
        weighted_median_filter(1, 1, &mut disp, &weights, &valid, 1, false);
        assert_eq!(disp.get(1, 1), 10.0);
    }

    #[test]
    fn weighted_median_filter_leaves_value_untouched_when_no_samples_qualify() {
        let mut disp = Grid::filled(3, 3, 5.0);
        let valid = Grid::filled(3, 3, false);
        let weights = vec![1.0f32; 9];
        weighted_median_filter(1, 1, &mut disp, &weights, &valid, 1, false);
        assert_eq!(disp.get(1, 1), 5.0);
    }
}
