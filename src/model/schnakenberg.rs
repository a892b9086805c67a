//! The Schnakenberg two-species Turing system
//!
//! ```text
//! dA/dt = k1 - k2 A + k3 A^2 B + D_A lap(A)
//! dB/dt = k4 - k3 A^2 B + D_B lap(B)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{RdCore, ReactionDiffusion};
use crate::kernel::{Rk4Scratch, compute_laplace, rk4_pass};
use crate::lattice::Lattice;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchnakenbergParams {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    #[serde(rename = "D_A")]
    pub d_a: f64,
    #[serde(rename = "D_B")]
    pub d_b: f64,
}

impl Default for SchnakenbergParams {
    fn default() -> Self {
        Self {
            k1: 1.0,
            k2: 1.0,
            k3: 1.0,
            k4: 1.0,
            d_a: 0.1,
            d_b: 0.1,
        }
    }
}

impl SchnakenbergParams {
    /// The uniform steady state `(A*, B*)`, if the rates admit one
    pub fn steady_state(&self) -> Option<(f64, f64)> {
        let a = (self.k1 + self.k4) / self.k2;
        let b = self.k4 / (self.k3 * a * a);
        (a.is_finite() && b.is_finite()).then_some((a, b))
    }
}

pub struct Schnakenberg<L: ?Sized> {
    core: RdCore<L>,
    pub params: SchnakenbergParams,
    a: Vec<f64>,
    b: Vec<f64>,
    lap: Vec<f64>,
    scratch: Rk4Scratch,
}

impl<L: Lattice + ?Sized> Schnakenberg<L> {
    /// A model with zeroed fields sized to `lattice`
    pub fn new(lattice: Arc<L>, params: SchnakenbergParams) -> Self {
        let core = RdCore::new(lattice);
        let n = core.nhex();
        Self {
            a: core.new_field(),
            b: core.new_field(),
            lap: core.new_field(),
            scratch: Rk4Scratch::new(n),
            core,
            params,
        }
    }

    pub fn core(&self) -> &RdCore<L> {
        &self.core
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Mutable view of A; the length is fixed to the lattice
    pub fn a_mut(&mut self) -> &mut [f64] {
        &mut self.a
    }

    pub fn b_mut(&mut self) -> &mut [f64] {
        &mut self.b
    }

    fn integrate_a(&mut self) {
        let SchnakenbergParams { k1, k2, k3, d_a, .. } = self.params;
        let lattice = self.core.lattice();
        let dt = self.core.dt();
        let b = &self.b;
        let lap = &mut self.lap;

        rk4_pass(&mut self.a, dt, &mut self.scratch, |a, dadt| {
            compute_laplace(lattice, a, lap);
            let lap = &*lap;
            dadt.par_iter_mut().enumerate().for_each(|(h, rate)| {
                let a_sq_b = a[h] * a[h] * b[h];
                *rate = k1 - k2 * a[h] + k3 * a_sq_b + d_a * lap[h];
            });
        });
    }

    fn integrate_b(&mut self) {
        let SchnakenbergParams { k3, k4, d_b, .. } = self.params;
        let lattice = self.core.lattice();
        let dt = self.core.dt();
        let a = &self.a;
        let lap = &mut self.lap;

        rk4_pass(&mut self.b, dt, &mut self.scratch, |b, dbdt| {
            compute_laplace(lattice, b, lap);
            let lap = &*lap;
            dbdt.par_iter_mut().enumerate().for_each(|(h, rate)| {
                *rate = k4 - k3 * a[h] * a[h] * b[h] + d_b * lap[h];
            });
        });
    }
}

impl<L: Lattice + ?Sized> ReactionDiffusion for Schnakenberg<L> {
    fn name(&self) -> &'static str {
        "schnakenberg"
    }

    fn allocate(&mut self) {
        let n = self.core.nhex();
        for field in [&mut self.a, &mut self.b, &mut self.lap] {
            field.clear();
            field.resize(n, 0.0);
        }
        self.scratch.resize(n);
    }

    fn init(&mut self, rng: &mut StdRng) {
        self.core.noiseify(&mut self.a, 0.5, 1.0, rng);
        self.core.noiseify(&mut self.b, 0.6, 1.0, rng);
    }

    /// B is integrated after A and sees the updated A.
    fn step(&mut self) {
        self.core.advance();
        self.integrate_a();
        self.integrate_b();
    }

    fn step_count(&self) -> u64 {
        self.core.step_count()
    }

    fn dt(&self) -> f64 {
        self.core.dt()
    }

    fn set_dt(&mut self, dt: f64) {
        self.core.set_dt(dt);
    }

    fn set_boundary_falloff_dist(&mut self, dist: f64) {
        self.core.set_boundary_falloff_dist(dist);
    }

    fn num_cells(&self) -> usize {
        self.core.nhex()
    }

    fn fields(&self) -> Vec<(&'static str, &[f64])> {
        vec![("A", &self.a), ("B", &self.b)]
    }

    fn params(&self) -> BTreeMap<&'static str, f64> {
        let p = &self.params;
        BTreeMap::from([
            ("k1", p.k1),
            ("k2", p.k2),
            ("k3", p.k3),
            ("k4", p.k4),
            ("D_A", p.d_a),
            ("D_B", p.d_b),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexgrid::HexGrid;
    use crate::kernel::tests::two_cell;
    use rand::SeedableRng;

    fn grid() -> Arc<HexGrid> {
        Arc::new(HexGrid::with_elliptical_boundary(0.1, 4.0, 0.8, 0.6).unwrap())
    }

    fn seeded(params: SchnakenbergParams) -> Schnakenberg<HexGrid> {
        let mut model = Schnakenberg::new(grid(), params);
        model.allocate();
        model.set_dt(0.001);
        model.init(&mut StdRng::seed_from_u64(7));
        model
    }

    const FROZEN: SchnakenbergParams = SchnakenbergParams {
        k1: 0.0,
        k2: 0.0,
        k3: 0.0,
        k4: 0.0,
        d_a: 0.0,
        d_b: 0.0,
    };

    #[test]
    fn fields_match_lattice_size() {
        let model = Schnakenberg::new(grid(), SchnakenbergParams::default());
        let n = model.num_cells();
        assert!(n > 0);
        for (name, field) in model.fields() {
            assert_eq!(field.len(), n, "field {name}");
        }
        assert_eq!(
            model.fields().iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            ["A", "B"]
        );
    }

    #[test]
    fn step_increments_counter() {
        let mut model = seeded(SchnakenbergParams::default());
        assert_eq!(model.step_count(), 0);
        model.step();
        assert_eq!(model.step_count(), 1);
        model.step();
        assert_eq!(model.step_count(), 2);
    }

    #[test]
    fn zero_rates_leave_fields_unchanged() {
        let mut model = seeded(FROZEN);
        let (a0, b0) = (model.a().to_vec(), model.b().to_vec());
        for _ in 0..5 {
            model.step();
        }
        assert_eq!(model.a(), a0.as_slice());
        assert_eq!(model.b(), b0.as_slice());
    }

    #[test]
    fn uniform_steady_state_is_stationary() {
        let params = SchnakenbergParams::default();
        let (a_star, b_star) = params.steady_state().unwrap();
        assert_eq!((a_star, b_star), (2.0, 0.25));

        let mut model = Schnakenberg::new(grid(), params);
        model.set_dt(0.001);
        model.a_mut().fill(a_star);
        model.b_mut().fill(b_star);
        for _ in 0..10 {
            model.step();
        }
        assert!(model.a().iter().all(|&a| (a - a_star).abs() < 1e-12));
        assert!(model.b().iter().all(|&b| (b - b_star).abs() < 1e-12));
    }

    #[test]
    fn pure_diffusion_conserves_mass() {
        let mut model = seeded(SchnakenbergParams {
            d_a: 0.1,
            d_b: 0.05,
            ..FROZEN
        });
        let mass = |f: &[f64]| f.iter().sum::<f64>();
        let spread = |f: &[f64]| {
            let lo = f.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = f.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            hi - lo
        };
        let (ma, mb) = (mass(model.a()), mass(model.b()));
        let sa = spread(model.a());

        for _ in 0..20 {
            model.step();
        }
        assert!((mass(model.a()) - ma).abs() < 1e-9 * ma.abs().max(1.0));
        assert!((mass(model.b()) - mb).abs() < 1e-9 * mb.abs().max(1.0));
        assert!(spread(model.a()) < sa);
    }

    #[test]
    fn second_species_sees_updated_first_species() {
        // On an isolated pair with no diffusion, B's decay uses the A that
        // the same step has just produced.
        let lattice = Arc::new(two_cell(1.0));
        let params = SchnakenbergParams {
            k1: 1.0,
            ..FROZEN
        };
        let mut model = Schnakenberg::new(lattice, SchnakenbergParams { k3: 1.0, ..params });
        model.set_dt(0.1);
        model.a_mut().fill(1.0);
        model.b_mut().fill(1.0);
        model.step();

        // A' = 1 + k3 A^2 B with B held at 1: grows above 1.1
        let a1 = model.a()[0];
        assert!(a1 > 1.1);
        // B' = -A1^2 B, so B decays at least as fast as exp(-A1^2 dt)
        let b1 = model.b()[0];
        assert!(b1 < (-a1 * a1 * 0.1).exp() + 1e-5, "b1 = {b1}, a1 = {a1}");
        assert_eq!(model.a()[0], model.a()[1]);
    }

    #[test]
    fn init_is_reproducible_for_a_seed() {
        let one = seeded(SchnakenbergParams::default());
        let two = seeded(SchnakenbergParams::default());
        assert_eq!(one.a(), two.a());
        assert_eq!(one.b(), two.b());
        assert_ne!(one.a(), one.b());
    }

    #[test]
    fn params_are_listed_by_name() {
        let model = Schnakenberg::new(grid(), SchnakenbergParams::default());
        let params = model.params();
        assert_eq!(
            params.keys().copied().collect::<Vec<_>>(),
            ["D_A", "D_B", "k1", "k2", "k3", "k4"]
        );
        assert_eq!(params["D_A"], 0.1);
    }
}
