//! The PatchMatch optimizer: random initialization plus the iterative
//! spatial-propagation / random-search / view-propagation sweep.
//!
//! The sweep itself is intentionally sequential — its correctness depends
//! on processing pixels in a fixed scan order, since later pixels read
//! neighbors updated earlier in the same pass (see the crate's concurrency
//! notes). Buffer construction that has no such dependency (weight lookups,
//! DSI construction) is parallelized elsewhere.

use rand::Rng;
use tracing::debug;

use crate::config::Config;
use crate::cost::dsi_plane_cost;
use crate::dsi::Dsi;
use crate::image::{Grid, Image};
use crate::plane::{Plane, PlaneField};
use crate::weights::{BilateralWeights, ProximityTable};

/// The immutable inputs a view needs to evaluate and improve plane guesses:
/// its own color image, its own DSI, and its own precomputed proximity
/// table.
pub struct ViewInputs<'a> {
    /// This view's source color image.
    pub image: &'a Image,
    /// This view's precomputed Disparity-Space-Image.
    pub dsi: &'a Dsi,
    /// This view's precomputed spatial-proximity table.
    pub proximity: &'a ProximityTable,
}

/// The mutable per-pixel state the optimizer owns for one view: the
/// current best plane and its cost.
#[derive(Clone)]
pub struct ViewState {
    /// The current best plane hypothesis for every pixel.
    pub planes: PlaneField,
    /// The cost of each pixel's current best plane.
    pub best_cost: Grid<f32>,
}

impl ViewState {
    fn new(height: usize, width: usize) -> Self {
        ViewState {
            planes: PlaneField::new(height, width),
            best_cost: Grid::filled(height, width, f32::INFINITY),
        }
    }
}

fn window_weights(inputs: &ViewInputs, cfg: &Config, y: usize, x: usize) -> Vec<f32> {
    BilateralWeights::new(inputs.proximity, cfg.patch_radius, cfg.gamma_color).window(inputs.image, y, x)
}

/// Randomly initializes a view's plane field and best-cost field.
///
/// Every pixel gets an independent random plane (fronto-parallel or
/// general, per `cfg.fronto_parallel_only`) and its DSI-based cost against
/// its own precomputed weight window.
pub fn random_init(inputs: &ViewInputs, cfg: &Config, rng: &mut impl Rng) -> ViewState {
    let height = inputs.image.height();
    let width = inputs.image.width();
    let mut state = ViewState::new(height, width);
    let dmax = cfg.dmax();

    for y in 0..height {
        for x in 0..width {
            let plane = if cfg.fronto_parallel_only {
                let z = rng.gen_range(0..cfg.ndisps) as f32;
                Plane::fronto_parallel(y, x, z)
            } else {
                let z = rng.gen_range(0.0..=dmax);
                let nx: f32 = rng.gen_range(-1.0..=1.0);
                let ny: f32 = rng.gen_range(-1.0..=1.0);
                let nz: f32 = rng.gen_range(-1.0..=1.0);
                let norm = (nx * nx + ny * ny + nz * nz).sqrt().max(0.01);
                Plane::new((nx / norm, ny / norm, nz / norm), y, x, z)
            };
            let weights = window_weights(inputs, cfg, y, x);
            let cost = dsi_plane_cost(&plane, y, x, inputs.dsi, &weights, cfg.patch_radius, cfg.bad_plane_penalty);
            state.planes.set(y, x, plane);
            state.best_cost.set(y, x, cost);
        }
    }
    state
}

fn improve(
    state: &mut ViewState,
    y: usize,
    x: usize,
    candidate: Plane,
    dsi: &Dsi,
    weights: &[f32],
    cfg: &Config,
) -> bool {
    let cost = dsi_plane_cost(&candidate, y, x, dsi, weights, cfg.patch_radius, cfg.bad_plane_penalty);
    if cost < state.best_cost.get(y, x) {
        state.best_cost.set(y, x, cost);
        state.planes.set(y, x, candidate);
        true
    } else {
        false
    }
}

const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, -1), (1, 0), (0, 1)];

/// Runs one full pass over one view: spatial propagation from the fixed
/// 4-connected neighborhood, shrinking random search, and view propagation
/// into the other view. Scan direction alternates by iteration parity
/// (`iter` even: top-left to bottom-right; odd: bottom-right to top-left).
///
/// `sign` is this view's sign (`-1` for the left view being projected onto
/// the right, `+1` for the right view being projected onto the left).
/// Returns the number of plane improvements made during this pass: own-view
/// improvements from spatial propagation and random search, plus any
/// improvement this pass's view propagation made into `other_state`.
#[allow(clippy::too_many_arguments)]
pub fn process_view(
    iter: usize,
    sign: i32,
    self_inputs: &ViewInputs,
    other_inputs: &ViewInputs,
    self_state: &mut ViewState,
    other_state: &mut ViewState,
    cfg: &Config,
    rng: &mut impl Rng,
) -> usize {
    let height = self_state.planes.height();
    let width = self_state.planes.width();
    let forward = iter % 2 == 0;
    let y_order: Vec<usize> = if forward { (0..height).collect() } else { (0..height).rev().collect() };
    let x_order: Vec<usize> = if forward { (0..width).collect() } else { (0..width).rev().collect() };

    let mut improved = 0usize;
    let dmax = cfg.dmax();

    for &y in &y_order {
        for &x in &x_order {
            let self_weights = window_weights(self_inputs, cfg, y, x);

            // Spatial propagation: fixed 4-connected neighborhood, not a
            // sign-dependent causal pattern — alternating scan direction
            // across iterations is what produces diagonal propagation.
            for &(dy, dx) in &NEIGHBOR_OFFSETS {
                let qy = y as isize + dy;
                let qx = x as isize + dx;
                if qy < 0 || qx < 0 || qy as usize >= height || qx as usize >= width {
                    continue;
                }
                let candidate = self_state.planes.get(qy as usize, qx as usize);
                if improve(self_state, y, x, candidate, self_inputs.dsi, &self_weights, cfg) {
                    improved += 1;
                }
            }

            // Random search with shrinking radii.
            let mut radius_z = dmax / 2.0;
            let mut radius_n = 1.0f32;
            while radius_z >= 0.1 {
                let current = self_state.planes.get(y, x);
                let candidate = current.random_search(y, x, radius_z, radius_n, dmax, cfg.fronto_parallel_only, rng);
                if improve(self_state, y, x, candidate, self_inputs.dsi, &self_weights, cfg) {
                    improved += 1;
                }
                radius_z /= 2.0;
                radius_n /= 2.0;
            }

            // View propagation.
            let current = self_state.planes.get(y, x);
            let (reparametrized, qy, qx) = current.reparametrize(y, x, sign);
            if qx >= 0 && (qx as usize) < width {
                let (qy, qx) = (qy as usize, qx as usize);
                let other_weights = window_weights(other_inputs, cfg, qy, qx);
                if improve(other_state, qy, qx, reparametrized, other_inputs.dsi, &other_weights, cfg) {
                    improved += 1;
                }
            }
        }
    }

    debug!(iter, sign, improved, "completed view pass");
    improved
}
