//! Runtime configuration for [`crate::run`].

use crate::error::PatchMatchError;

/// Immutable configuration for a PatchMatch Stereo run.
///
/// Replaces the process-wide globals (`nrows`, `ncols`, `ndisps`, `dmax`,
/// `gamma`, ...) that the reference implementation keeps as static state;
/// every tuning knob is plumbed explicitly through this value instead.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Number of disparity hypotheses (`D`). `dmax()` is `ndisps - 1`.
    pub ndisps: usize,
    /// Number of optimizer passes (each pass sweeps the left view, then the
    /// right view).
    pub max_iters: usize,
    /// Support window radius `R`; the patch width is `2R + 1`.
    pub patch_radius: usize,
    /// Bilateral weight falloff for color similarity.
    pub gamma_color: f32,
    /// Bilateral weight falloff for spatial proximity.
    pub gamma_proximity: f32,
    /// Additive per-sample cost for planes proposing an out-of-range
    /// disparity.
    pub bad_plane_penalty: f32,
    /// Restrict normals to `(0, 0, 1)` and round disparities to integers.
    pub fronto_parallel_only: bool,
    /// Enable cross-view consistency checking and weighted median filtering.
    pub post_processing: bool,
    /// Enable scanline hole-filling before the median filter. Disabled by
    /// default, mirroring the reference implementation (the step exists
    /// there but is compiled out).
    pub hole_fill: bool,
    /// Number of weighted median filter rounds.
    pub median_rounds: usize,
    /// On the final median filter round, ignore invalid neighbors instead
    /// of including them in the weighted vote.
    pub use_invalid_pixels_in_median_last_round: bool,
    /// Seed for the deterministic random source. Runs with the same seed
    /// and inputs are reproducible.
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ndisps: 1,
            max_iters: 2,
            patch_radius: 17,
            gamma_color: 10.0,
            gamma_proximity: 25.0,
            bad_plane_penalty: 120.0,
            fronto_parallel_only: true,
            post_processing: true,
            hole_fill: false,
            median_rounds: 1,
            use_invalid_pixels_in_median_last_round: false,
            rng_seed: None,
        }
    }
}

impl Config {
    /// Highest admissible disparity value, `ndisps - 1`.
    pub fn dmax(&self) -> f32 {
        (self.ndisps - 1) as f32
    }

    /// Patch width `P = 2R + 1`.
    pub fn patch_width(&self) -> usize {
        2 * self.patch_radius + 1
    }

    /// Validates this configuration against an image's dimensions.
    ///
    /// Checks, in order: `ndisps > 0`; `patch_radius > 0` and the resulting
    /// patch fits within the image; both gammas finite and positive; the
    /// bad-plane penalty finite and non-negative.
    pub fn validate(&self, height: usize, width: usize) -> Result<(), PatchMatchError> {
        if self.ndisps == 0 {
            return Err(PatchMatchError::ConfigInvalid {
                reason: "ndisps must be greater than zero".into(),
            });
        }
        if self.patch_radius == 0 {
            return Err(PatchMatchError::ConfigInvalid {
                reason: "patch_radius must be greater than zero".into(),
            });
        }
        if self.patch_radius >= height.min(width) / 2 {
            return Err(PatchMatchError::ConfigInvalid {
                reason: format!(
                    "patch_radius {} must be less than min(height, width) / 2 = {}",
                    self.patch_radius,
                    height.min(width) / 2
                ),
            });
        }
        if !(self.gamma_color.is_finite() && self.gamma_color > 0.0) {
            return Err(PatchMatchError::ConfigInvalid {
                reason: "gamma_color must be a finite positive number".into(),
            });
        }
        if !(self.gamma_proximity.is_finite() && self.gamma_proximity > 0.0) {
            return Err(PatchMatchError::ConfigInvalid {
                reason: "gamma_proximity must be a finite positive number".into(),
            });
        }
        if !(self.bad_plane_penalty.is_finite() && self.bad_plane_penalty >= 0.0) {
            return Err(PatchMatchError::ConfigInvalid {
                reason: "bad_plane_penalty must be a finite, non-negative number".into(),
            });
        }
        if self.max_iters == 0 {
            return Err(PatchMatchError::ConfigInvalid {
                reason: "max_iters must be at least 1".into(),
            });
        }
        Ok(())
    }
}
