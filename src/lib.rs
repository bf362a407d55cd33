//! Dense per-pixel disparity estimation for a rectified stereo pair via
//! PatchMatch over slanted support windows.
//!
//! Given a left and right color image of the same scene and a per-pixel
//! Disparity-Space-Image (DSI) of matching costs for each view, [`run`]
//! estimates two disparity maps refined by cross-view consistency
//! checking and weighted median filtering. Image decoding, rectification,
//! and evaluation against ground truth are the caller's responsibility —
//! this crate only implements the optimizer and its post-processing.

#![deny(missing_docs)]

pub mod config;
pub mod cost;
pub mod dsi;
pub mod error;
pub mod image;
pub mod optimizer;
pub mod plane;
pub mod postprocess;
pub mod weights;

pub use config::Config;
pub use dsi::Dsi;
pub use error::PatchMatchError;
pub use image::{Grid, Image};
pub use plane::{Plane, PlaneField};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, info_span};

use optimizer::{process_view, random_init, ViewInputs};
use postprocess::post_process_view;
use weights::ProximityTable;

/// Diagnostic counters produced by a run, orthogonal to the disparity maps
/// it writes. Not part of the error-handling contract — a caller that
/// ignores this value still gets correct disparity maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    /// Number of optimizer iterations actually completed (each sweeping the
    /// left view, then the right view).
    pub iterations: usize,
    /// Total plane improvements summed across every iteration and both
    /// passes (spatial propagation, random search, and the improvements
    /// view propagation makes into the other view are all counted
    /// together).
    pub improvements: usize,
    /// Number of weighted median filter rounds actually run, per view.
    pub median_rounds: usize,
}

/// The two refined disparity maps and their per-view validity masks
/// produced by a successful [`run`].
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Left-view disparity map, one value per pixel.
    pub disp_l: Grid<f32>,
    /// Right-view disparity map, one value per pixel.
    pub disp_r: Grid<f32>,
    /// Left-view cross-check validity mask (all `true` when
    /// `config.post_processing` is disabled).
    pub valid_l: Grid<bool>,
    /// Right-view cross-check validity mask (all `true` when
    /// `config.post_processing` is disabled).
    pub valid_r: Grid<bool>,
    /// Diagnostic run counters.
    pub stats: RunStats,
}

fn check_shapes(image_l: &Image, image_r: &Image, dsi_l: &Dsi, dsi_r: &Dsi, config: &Config) -> Result<(), PatchMatchError> {
    if image_l.height() != image_r.height() || image_l.width() != image_r.width() {
        return Err(PatchMatchError::ShapeMismatch {
            reason: format!(
                "left image is {}x{}, right image is {}x{}",
                image_l.height(),
                image_l.width(),
                image_r.height(),
                image_r.width()
            ),
        });
    }
    if image_l.channels() != 3 || image_r.channels() != 3 {
        return Err(PatchMatchError::ShapeMismatch {
            reason: "left and right images must have 3 channels".into(),
        });
    }
    for (name, dsi) in [("left", dsi_l), ("right", dsi_r)] {
        if dsi.height() != image_l.height() || dsi.width() != image_l.width() {
            return Err(PatchMatchError::ShapeMismatch {
                reason: format!(
                    "{name} DSI is {}x{}, expected {}x{}",
                    dsi.height(),
                    dsi.width(),
                    image_l.height(),
                    image_l.width()
                ),
            });
        }
        if dsi.ndisps() != config.ndisps {
            return Err(PatchMatchError::ShapeMismatch {
                reason: format!("{name} DSI has {} disparities, config.ndisps is {}", dsi.ndisps(), config.ndisps),
            });
        }
    }
    Ok(())
}

/// Runs PatchMatch Stereo end to end.
///
/// Validates `image_l`/`image_r`/`dsi_l`/`dsi_r` against each other and
/// against `config`, precomputes the bilateral proximity tables for both
/// views concurrently, randomly initializes both plane fields, alternates
/// `config.max_iters` left-then-right optimizer passes, and — when
/// `config.post_processing` is enabled — cross-checks and weighted-median
/// filters the result.
///
/// All randomness is drawn from a single `StdRng` seeded from
/// `config.rng_seed.unwrap_or(0)`, consumed in a fixed order (left random
/// init, right random init, then each iteration's left pass followed by
/// its right pass), so a given seed and inputs always reproduce the same
/// output.
pub fn run(image_l: &Image, image_r: &Image, dsi_l: &Dsi, dsi_r: &Dsi, config: &Config) -> Result<RunOutput, PatchMatchError> {
    config.validate(image_l.height(), image_l.width())?;
    check_shapes(image_l, image_r, dsi_l, dsi_r, config)?;

    let _span = info_span!(
        "patchmatch_stereo_run",
        height = image_l.height(),
        width = image_l.width(),
        ndisps = config.ndisps
    )
    .entered();

    info!("precomputing bilateral proximity tables");
    let (proximity_l, proximity_r) = rayon::join(
        || ProximityTable::build(config.patch_radius, config.gamma_proximity),
        || ProximityTable::build(config.patch_radius, config.gamma_proximity),
    );
    if !proximity_l.is_finite() || !proximity_r.is_finite() {
        return Err(PatchMatchError::NumericOverflow {
            reason: "proximity table contains a non-finite weight; check gamma_proximity".into(),
        });
    }

    let mut rng = StdRng::seed_from_u64(config.rng_seed.unwrap_or(0));

    let inputs_l = ViewInputs {
        image: image_l,
        dsi: dsi_l,
        proximity: &proximity_l,
    };
    let inputs_r = ViewInputs {
        image: image_r,
        dsi: dsi_r,
        proximity: &proximity_r,
    };

    info!("performing random initialization");
    let mut state_l = random_init(&inputs_l, config, &mut rng);
    let mut state_r = random_init(&inputs_r, config, &mut rng);

    let mut stats = RunStats::default();
    for iter in 0..config.max_iters {
        let span = info_span!("iteration", iter).entered();

        debug!("scanning left view");
        stats.improvements += process_view(iter, -1, &inputs_l, &inputs_r, &mut state_l, &mut state_r, config, &mut rng);

        debug!("scanning right view");
        stats.improvements += process_view(iter, 1, &inputs_r, &inputs_l, &mut state_r, &mut state_l, config, &mut rng);

        stats.iterations += 1;
        drop(span);
    }

    if !config.post_processing {
        let disp_l = postprocess::planes_to_disparity(&state_l.planes);
        let disp_r = postprocess::planes_to_disparity(&state_r.planes);
        let height = disp_l.height();
        let width = disp_l.width();
        return Ok(RunOutput {
            disp_l,
            disp_r,
            valid_l: Grid::filled(height, width, true),
            valid_r: Grid::filled(height, width, true),
            stats,
        });
    }

    info!("post-processing");
    let (disp_l, valid_l) = post_process_view(
        &state_l.planes,
        &state_r.planes,
        image_l,
        &proximity_l,
        -1,
        config.patch_radius,
        config.gamma_color,
        config.hole_fill,
        config.median_rounds,
        config.use_invalid_pixels_in_median_last_round,
    );
    let (disp_r, valid_r) = post_process_view(
        &state_r.planes,
        &state_l.planes,
        image_r,
        &proximity_r,
        1,
        config.patch_radius,
        config.gamma_color,
        config.hole_fill,
        config.median_rounds,
        config.use_invalid_pixels_in_median_last_round,
    );
    stats.median_rounds = config.median_rounds;

    Ok(RunOutput {
        disp_l,
        disp_r,
        valid_l,
        valid_r,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(height: usize, width: usize, period: usize) -> Image {
        let mut data = vec![0u8; height * width * 3];
        for y in 0..height {
            for x in 0..width {
                let v = if ((x / period) + (y / period)) % 2 == 0 { 40u8 } else { 220u8 };
                let idx = (y * width + x) * 3;
                data[idx] = v;
                data[idx + 1] = v;
                data[idx + 2] = v;
            }
        }
        Image::from_vec(height, width, 3, data)
    }

    fn gray_from_color(image: &Image) -> Image {
        let height = image.height();
        let width = image.width();
        let mut data = vec![0u8; height * width];
        for y in 0..height {
            for x in 0..width {
                data[y * width + x] = image.get(y, x, 0);
            }
        }
        Image::from_vec(height, width, 1, data)
    }

    #[test]
    fn rejects_mismatched_image_shapes() {
        let image_l = checkerboard(20, 20, 4);
        let image_r = checkerboard(20, 21, 4);
        let gray_l = gray_from_color(&image_l);
        let dsi_l = dsi::build_census_dsi(&gray_l, &gray_l, 4, -1);
        let dsi_r = dsi_l.clone();
        let config = Config { ndisps: 4, ..Config::default() };
        let err = run(&image_l, &image_r, &dsi_l, &dsi_r, &config).unwrap_err();
        assert!(matches!(err, PatchMatchError::ShapeMismatch { .. }));
    }

    #[test]
    fn rejects_invalid_config_before_compute() {
        let image_l = checkerboard(20, 20, 4);
        let image_r = checkerboard(20, 20, 4);
        let gray_l = gray_from_color(&image_l);
        let dsi_l = dsi::build_census_dsi(&gray_l, &gray_l, 4, -1);
        let dsi_r = dsi_l.clone();
        let config = Config { ndisps: 0, ..Config::default() };
        let err = run(&image_l, &image_r, &dsi_l, &dsi_r, &config).unwrap_err();
        assert!(matches!(err, PatchMatchError::ConfigInvalid { .. }));
    }

    #[test]
    fn constant_scene_converges_to_zero_disparity() {
        // Identical left and right images: the true disparity is zero
        // everywhere, so with enough iterations most pixels should settle
        // there.
        let height = 40;
        let width = 40;
        let image_l = checkerboard(height, width, 5);
        let image_r = image_l.clone();
        let gray = gray_from_color(&image_l);
        let ndisps = 8;
        let dsi_l = dsi::build_census_dsi(&gray, &gray, ndisps, -1);
        let dsi_r = dsi::build_census_dsi(&gray, &gray, ndisps, 1);
        let config = Config {
            ndisps,
            max_iters: 3,
            patch_radius: 4,
            post_processing: false,
            rng_seed: Some(7),
            ..Config::default()
        };
        let output = run(&image_l, &image_r, &dsi_l, &dsi_r, &config).unwrap();
        let mut zero_count = 0;
        for y in 0..height {
            for x in 0..width {
                if output.disp_l.get(y, x).abs() < 0.5 {
                    zero_count += 1;
                }
            }
        }
        assert!(
            zero_count as f32 / (height * width) as f32 > 0.8,
            "expected most pixels to converge near zero disparity, got {zero_count}/{}",
            height * width
        );
    }

    #[test]
    fn same_seed_and_inputs_reproduce_identical_output() {
        let height = 24;
        let width = 24;
        let image_l = checkerboard(height, width, 3);
        let image_r = image_l.clone();
        let gray = gray_from_color(&image_l);
        let ndisps = 6;
        let dsi_l = dsi::build_census_dsi(&gray, &gray, ndisps, -1);
        let dsi_r = dsi::build_census_dsi(&gray, &gray, ndisps, 1);
        let config = Config {
            ndisps,
            max_iters: 2,
            patch_radius: 3,
            rng_seed: Some(42),
            ..Config::default()
        };
        let first = run(&image_l, &image_r, &dsi_l, &dsi_r, &config).unwrap();
        let second = run(&image_l, &image_r, &dsi_l, &dsi_r, &config).unwrap();
        assert_eq!(first.disp_l.as_slice(), second.disp_l.as_slice());
        assert_eq!(first.disp_r.as_slice(), second.disp_r.as_slice());
    }
}
