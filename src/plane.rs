//! The slanted-plane disparity hypothesis and per-view plane fields.

use rand::Rng;

const NORMAL_EPS: f32 = 1e-3;
const NORMAL_NORM_FLOOR: f32 = 0.01;

/// A pixel's hypothesized local fronto-parallel-or-slanted surface.
///
/// Keeps both the unit-normal-plus-anchor form and the derived affine
/// coefficients, since cost evaluation wants the cheap affine form while
/// random perturbation and view reparametrization want the geometric form.
/// Both are always in sync; there is no lazily-derived half.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    nx: f32,
    ny: f32,
    nz: f32,
    a: f32,
    b: f32,
    c: f32,
}

impl Plane {
    /// Constructs a plane from a normal, an anchor pixel `(y, x)`, and the
    /// disparity `z` at that anchor. `nz` is clamped to magnitude at least
    /// `1e-3`, preserving its sign, before deriving `(a, b, c)`.
    pub fn new(normal: (f32, f32, f32), y: usize, x: usize, z: f32) -> Self {
        Plane::from_anchor_f32(normal, y as f32, x as f32, z)
    }

    fn from_anchor_f32(normal: (f32, f32, f32), yf: f32, xf: f32, z: f32) -> Self {
        let (nx, ny, mut nz) = normal;
        if nz.abs() < NORMAL_EPS {
            nz = if nz >= 0.0 { NORMAL_EPS } else { -NORMAL_EPS };
        }
        let a = -nx / nz;
        let b = -ny / nz;
        let c = (nx * xf + ny * yf + nz * z) / nz;
        Plane { nx, ny, nz, a, b, c }
    }

    /// A fronto-parallel plane (`n = (0, 0, 1)`) at integer disparity `z`.
    pub fn fronto_parallel(y: usize, x: usize, z: f32) -> Self {
        Plane::new((0.0, 0.0, 1.0), y, x, z.round())
    }

    /// Affine coefficients `(a, b, c)` such that `d(y, x) = a*x + b*y + c`.
    pub fn abc(&self) -> (f32, f32, f32) {
        (self.a, self.b, self.c)
    }

    /// The unit normal `(nx, ny, nz)`.
    pub fn normal(&self) -> (f32, f32, f32) {
        (self.nx, self.ny, self.nz)
    }

    /// Evaluates this plane's disparity at `(y, x)`.
    #[inline]
    pub fn disparity_at(&self, y: usize, x: usize) -> f32 {
        self.a * x as f32 + self.b * y as f32 + self.c
    }

    /// Reparametrizes this plane into the other view.
    ///
    /// `sign` is the view sign (`-1` for left-from-right, `+1` for
    /// right-from-left). Returns the reparametrized plane together with its
    /// new anchor `(qy, qx)`; `qx` may fall outside `[0, width)`, which
    /// callers must check before using the result.
    pub fn reparametrize(&self, y: usize, x: usize, sign: i32) -> (Plane, isize, isize) {
        let z = self.disparity_at(y, x);
        let qx = x as isize + sign as isize * z as isize;
        let qy = y as isize;
        // Anchor math only needs the coordinates as plain numbers; a
        // negative or out-of-width qx is never dereferenced as an index
        // here, only by the caller, which must bounds-check first.
        let plane = Plane::from_anchor_f32((self.nx, self.ny, self.nz), qy as f32, qx as f32, z);
        (plane, qy, qx)
    }

    /// Samples a perturbed plane for the random search step.
    ///
    /// `radius_z` bounds the uniform disparity offset, `radius_n` bounds
    /// each component of the uniform normal offset. In fronto-parallel
    /// mode the normal is forced to `(0, 0, 1)` and the new disparity is
    /// rounded to the nearest integer.
    pub fn random_search(
        &self,
        y: usize,
        x: usize,
        radius_z: f32,
        radius_n: f32,
        dmax: f32,
        fronto_parallel_only: bool,
        rng: &mut impl Rng,
    ) -> Plane {
        let dz = rng.gen_range(-radius_z..=radius_z);
        let z = (self.disparity_at(y, x) + dz).clamp(0.0, dmax);

        if fronto_parallel_only {
            return Plane::fronto_parallel(y, x, z);
        }

        let dnx = rng.gen_range(-radius_n..=radius_n);
        let dny = rng.gen_range(-radius_n..=radius_n);
        let dnz = rng.gen_range(-radius_n..=radius_n);
        let nx = self.nx + dnx;
        let ny = self.ny + dny;
        let nz = self.nz + dnz;
        let norm = (nx * nx + ny * ny + nz * nz).sqrt().max(NORMAL_NORM_FLOOR);
        Plane::new((nx / norm, ny / norm, nz / norm), y, x, z)
    }
}

/// One [`Plane`] per pixel of a view, H×W, mutated in place by the
/// optimizer.
#[derive(Clone, Debug)]
pub struct PlaneField {
    planes: Vec<Plane>,
    width: usize,
    height: usize,
}

impl PlaneField {
    /// Creates a plane field, all pixels anchored at fronto-parallel
    /// disparity 0 (callers are expected to overwrite via random
    /// initialization before using this for anything but tests).
    pub fn new(height: usize, width: usize) -> Self {
        let planes = (0..height)
            .flat_map(|y| (0..width).map(move |x| (y, x)))
            .map(|(y, x)| Plane::fronto_parallel(y, x, 0.0))
            .collect();
        PlaneField {
            planes,
            width,
            height,
        }
    }

    /// Field width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Field height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Reads the plane at `(y, x)`.
    #[inline]
    pub fn get(&self, y: usize, x: usize) -> Plane {
        self.planes[y * self.width + x]
    }

    /// Writes the plane at `(y, x)`.
    #[inline]
    pub fn set(&mut self, y: usize, x: usize, plane: Plane) {
        self.planes[y * self.width + x] = plane;
    }
}
