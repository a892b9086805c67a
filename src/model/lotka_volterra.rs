//! Competitive Lotka-Volterra with diffusion
//!
//! ```text
//! du/dt = D1 lap(u) + u (a1 - b1 u - c1 v)
//! dv/dt = D2 lap(v) + v (a2 - b2 v - c2 u)
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
pub struct LotkaVolterraParams {
    pub a1: f64,
    pub b1: f64,
    pub c1: f64,
    pub a2: f64,
    pub b2: f64,
    pub c2: f64,
    #[serde(rename = "D1")]
    pub d1: f64,
    #[serde(rename = "D2")]
    pub d2: f64,
}

impl Default for LotkaVolterraParams {
    fn default() -> Self {
        Self {
            a1: 1.0,
            b1: 1.0,
            c1: 1.0,
            a2: 1.0,
            b2: 1.0,
            c2: 1.0,
            d1: 0.1,
            d2: 0.1,
        }
    }
}

pub struct LotkaVolterra<L: ?Sized> {
    core: RdCore<L>,
    pub params: LotkaVolterraParams,
    u: Vec<f64>,
    v: Vec<f64>,
    lap: Vec<f64>,
    scratch: Rk4Scratch,
}

impl<L: Lattice + ?Sized> LotkaVolterra<L> {
    pub fn new(lattice: Arc<L>, params: LotkaVolterraParams) -> Self {
        let core = RdCore::new(lattice);
        let n = core.nhex();
        Self {
            u: core.new_field(),
            v: core.new_field(),
            lap: core.new_field(),
            scratch: Rk4Scratch::new(n),
            core,
            params,
        }
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    pub fn v(&self) -> &[f64] {
        &self.v
    }

    pub fn u_mut(&mut self) -> &mut [f64] {
        &mut self.u
    }

    pub fn v_mut(&mut self) -> &mut [f64] {
        &mut self.v
    }

    fn integrate_u(&mut self) {
        let LotkaVolterraParams { a1, b1, c1, d1, .. } = self.params;
        let lattice = self.core.lattice();
        let dt = self.core.dt();
        let v = &self.v;
        let lap = &mut self.lap;

        rk4_pass(&mut self.u, dt, &mut self.scratch, |u, dudt| {
            compute_laplace(lattice, u, lap);
            let lap = &*lap;
            dudt.par_iter_mut().enumerate().for_each(|(h, rate)| {
                *rate = d1 * lap[h] + u[h] * (a1 - b1 * u[h] - c1 * v[h]);
            });
        });
    }

    fn integrate_v(&mut self) {
        let LotkaVolterraParams { a2, b2, c2, d2, .. } = self.params;
        let lattice = self.core.lattice();
        let dt = self.core.dt();
        let u = &self.u;
        let lap = &mut self.lap;

        rk4_pass(&mut self.v, dt, &mut self.scratch, |v, dvdt| {
            compute_laplace(lattice, v, lap);
            let lap = &*lap;
            dvdt.par_iter_mut().enumerate().for_each(|(h, rate)| {
                *rate = d2 * lap[h] + v[h] * (a2 - b2 * v[h] - c2 * u[h]);
            });
        });
    }
}

impl<L: Lattice + ?Sized> ReactionDiffusion for LotkaVolterra<L> {
    fn name(&self) -> &'static str {
        "lotka_volterra"
    }

    fn allocate(&mut self) {
        let n = self.core.nhex();
        for field in [&mut self.u, &mut self.v, &mut self.lap] {
            field.clear();
            field.resize(n, 0.0);
        }
        self.scratch.resize(n);
    }

    fn init(&mut self, rng: &mut StdRng) {
        self.core.noiseify(&mut self.u, 0.5, 1.0, rng);
        self.core.noiseify(&mut self.v, 0.6, 1.0, rng);
    }

    fn step(&mut self) {
        self.core.advance();
        self.integrate_u();
        self.integrate_v();
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
        vec![("u", &self.u), ("v", &self.v)]
    }

    fn params(&self) -> BTreeMap<&'static str, f64> {
        let p = &self.params;
        BTreeMap::from([
            ("a1", p.a1),
            ("b1", p.b1),
            ("c1", p.c1),
            ("a2", p.a2),
            ("b2", p.b2),
            ("c2", p.c2),
            ("D1", p.d1),
            ("D2", p.d2),
        ])
    }
}
