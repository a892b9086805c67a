//! Stencil operators and the RK4 integrator
//!
//! Every function here works on plain `f64` slices indexed 1:1 with the cells
//! of a [`Lattice`]. Per-cell loops run in parallel with rayon; there is no
//! cross-cell ordering inside any single pass, and each pass writes only to
//! its own output slot.
//!
//! Nothing in this module checks for numerical blow-up. A bad `dt` propagates
//! NaN silently; the driver decides whether to look for it.

use rand::Rng;
use rayon::prelude::*;

use crate::lattice::{Direction, Lattice};

/// Discrete Laplacian of `f`, written into `lap`.
///
/// Uses the six-point hex stencil with weight `2/(3d^2)`. A missing neighbour
/// is replaced by the cell's own value, which amounts to a zero-flux boundary.
pub fn compute_laplace<L: Lattice + ?Sized>(lattice: &L, f: &[f64], lap: &mut [f64]) {
    debug_assert_eq!(f.len(), lattice.num_cells());
    debug_assert_eq!(lap.len(), lattice.num_cells());

    let d = lattice.spacing();
    let norm = 2.0 / (3.0 * d * d);

    lap.par_iter_mut().enumerate().for_each(|(hi, out)| {
        let own = f[hi];
        let sum = Direction::ALL.iter().fold(-6.0 * own, |acc, &dir| {
            acc + lattice.neighbour(hi, dir).map_or(own, |n| f[n])
        });
        *out = norm * sum;
    });
}

/// Spatial gradient of `f`: `grad[0]` is d/dx (east positive), `grad[1]` is
/// d/dy (north positive).
///
/// Each hex uses whichever neighbours it has. Central differences are used when
/// both sides exist, one-sided differences otherwise, and zero when there is
/// nothing to difference against.
pub fn spacegrad_2d<L: Lattice + ?Sized>(lattice: &L, f: &[f64], grad: &mut [Vec<f64>; 2]) {
    let d = lattice.spacing();
    let v = lattice.row_spacing();
    let [gx, gy] = grad;

    gx.par_iter_mut()
        .zip(gy.par_iter_mut())
        .enumerate()
        .for_each(|(hi, (gx, gy))| {
            let nb = |dir| lattice.neighbour(hi, dir);

            *gx = match (nb(Direction::E), nb(Direction::W)) {
                (Some(e), Some(w)) => (f[e] - f[w]) / (2.0 * d),
                (Some(e), None) => (f[e] - f[hi]) / d,
                (None, Some(w)) => (f[hi] - f[w]) / d,
                (None, None) => 0.0,
            };

            let (ne, nw) = (nb(Direction::NE), nb(Direction::NW));
            let (se, sw) = (nb(Direction::SE), nb(Direction::SW));
            *gy = match (ne, nw, se, sw) {
                (Some(ne), Some(nw), Some(se), Some(sw)) => {
                    ((f[ne] - f[se]) + (f[nw] - f[sw])) / (4.0 * v)
                }
                (Some(ne), Some(nw), _, _) => ((f[ne] + f[nw]) * 0.5 - f[hi]) / v,
                (_, _, Some(se), Some(sw)) => (f[hi] - (f[se] + f[sw]) * 0.5) / v,
                (_, Some(nw), _, Some(sw)) => (f[nw] - f[sw]) / (2.0 * v),
                (Some(ne), _, Some(se), _) => (f[ne] - f[se]) / (2.0 * v),
                _ => 0.0,
            };
        });
}

/// Working storage for one RK4 pass over a field of `n` cells
#[derive(Debug, Clone, Default)]
pub struct Rk4Scratch {
    tst: Vec<f64>,
    dydt: Vec<f64>,
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
}

impl Rk4Scratch {
    pub fn new(n: usize) -> Self {
        let mut scratch = Self::default();
        scratch.resize(n);
        scratch
    }

    /// Resize and zero every buffer
    pub fn resize(&mut self, n: usize) {
        for buf in [
            &mut self.tst,
            &mut self.dydt,
            &mut self.k1,
            &mut self.k2,
            &mut self.k3,
            &mut self.k4,
        ] {
            buf.clear();
            buf.resize(n, 0.0);
        }
    }

    pub fn len(&self) -> usize {
        self.tst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tst.is_empty()
    }
}

/// Advance `y` by one step of `dt` with classical fourth-order Runge-Kutta.
///
/// `rhs(y, dydt)` must fill `dydt` with the rate of change at `y`. The four
/// stages run strictly in sequence; the per-cell work inside each stage is
/// parallel.
pub fn rk4_pass<F>(y: &mut [f64], dt: f64, scratch: &mut Rk4Scratch, mut rhs: F)
where
    F: FnMut(&[f64], &mut [f64]),
{
    if scratch.len() != y.len() {
        scratch.resize(y.len());
    }
    let Rk4Scratch {
        tst,
        dydt,
        k1,
        k2,
        k3,
        k4,
    } = scratch;

    // Stage 1
    rhs(y, dydt);
    k1.par_iter_mut()
        .zip(tst.par_iter_mut())
        .zip(dydt.par_iter().zip(y.par_iter()))
        .for_each(|((k, t), (&rate, &y0))| {
            *k = rate * dt;
            *t = y0 + *k * 0.5;
        });

    // Stage 2
    rhs(tst, dydt);
    k2.par_iter_mut()
        .zip(tst.par_iter_mut())
        .zip(dydt.par_iter().zip(y.par_iter()))
        .for_each(|((k, t), (&rate, &y0))| {
            *k = rate * dt;
            *t = y0 + *k * 0.5;
        });

    // Stage 3
    rhs(tst, dydt);
    k3.par_iter_mut()
        .zip(tst.par_iter_mut())
        .zip(dydt.par_iter().zip(y.par_iter()))
        .for_each(|((k, t), (&rate, &y0))| {
            *k = rate * dt;
            *t = y0 + *k;
        });

    // Stage 4
    rhs(tst, dydt);
    k4.par_iter_mut()
        .zip(dydt.par_iter())
        .for_each(|(k, &rate)| *k = rate * dt);

    y.par_iter_mut()
        .zip(k1.par_iter().zip(k2.par_iter()))
        .zip(k3.par_iter().zip(k4.par_iter()))
        .for_each(|((y, (&a, &b)), (&c, &d))| {
            *y += (a + 2.0 * (b + c) + d) / 6.0;
        });
}

/// Fill `v` with uniform noise `rand * gain + offset`, rolled off towards the
/// domain edge.
///
/// Cells with a known distance to the boundary are scaled by a steep sigmoid
/// that crosses 0.5 at `falloff` from the boundary.
pub fn noiseify<L, R>(lattice: &L, v: &mut [f64], offset: f64, gain: f64, falloff: f64, rng: &mut R)
where
    L: Lattice + ?Sized,
    R: Rng + ?Sized,
{
    for (hi, val) in v.iter_mut().enumerate() {
        *val = rng.r#gen::<f64>() * gain + offset;
        if let Some(dist) = lattice.dist_to_boundary(hi) {
            let sigmoid = 1.0 / (1.0 + (-100.0 * (dist - falloff)).exp());
            *val *= sigmoid;
        }
    }
}

/// Rescale `f` in place so that its minimum maps to 0 and its maximum to 1.
/// A field with no spread becomes all zeros.
pub fn normalise(f: &mut [f64]) {
    let (min, max) = f
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        f.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    let scale = 1.0 / range;
    f.par_iter_mut()
        .for_each(|x| *x = ((*x - min) * scale).clamp(0.0, 1.0));
}

/// True if every value is finite
pub fn all_finite(f: &[f64]) -> bool {
    f.par_iter().all(|x| x.is_finite())
}
