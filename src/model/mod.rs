//! Reaction-diffusion models
//!
//! Every model owns one or more scalar fields over a shared [`Lattice`] and
//! advances them by one time step per [`ReactionDiffusion::step`]. The shared
//! bookkeeping (lattice handle, time step, step counter, noise roll-off) lives
//! in [`RdCore`], which each model embeds.

pub mod lotka_volterra;
pub mod schnakenberg;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigResult};
use crate::kernel;
use crate::lattice::Lattice;

pub use lotka_volterra::{LotkaVolterra, LotkaVolterraParams};
pub use schnakenberg::{Schnakenberg, SchnakenbergParams};

/// Default integration time step
pub const DEFAULT_DT: f64 = 0.00001;

/// Default distance from the boundary at which initial noise is halved
pub const DEFAULT_BOUNDARY_FALLOFF: f64 = 0.01;

/// A reaction-diffusion system that can be stepped forward in time
pub trait ReactionDiffusion: Send {
    /// Short model name, as used in parameter files
    fn name(&self) -> &'static str;

    /// Size every field to the lattice and zero it
    fn allocate(&mut self);

    /// Fill the fields with their initial noisy state
    fn init(&mut self, rng: &mut StdRng);

    /// Advance all fields by one time step
    fn step(&mut self);

    /// Number of completed calls to [`ReactionDiffusion::step`]
    fn step_count(&self) -> u64;

    fn dt(&self) -> f64;

    fn set_dt(&mut self, dt: f64);

    /// Distance from the boundary at which initial noise is halved
    fn set_boundary_falloff_dist(&mut self, dist: f64);

    /// Number of lattice cells, equal to the length of every field
    fn num_cells(&self) -> usize;

    /// Named fields, in a stable order
    fn fields(&self) -> Vec<(&'static str, &[f64])>;

    /// Named model parameters
    fn params(&self) -> BTreeMap<&'static str, f64>;
}

/// State shared by all models
#[derive(Debug)]
pub struct RdCore<L: ?Sized> {
    lattice: Arc<L>,
    dt: f64,
    step_count: u64,
    boundary_falloff_dist: f64,
}

impl<L: Lattice + ?Sized> RdCore<L> {
    pub fn new(lattice: Arc<L>) -> Self {
        Self {
            lattice,
            dt: DEFAULT_DT,
            step_count: 0,
            boundary_falloff_dist: DEFAULT_BOUNDARY_FALLOFF,
        }
    }

    pub fn lattice(&self) -> &L {
        &self.lattice
    }

    pub fn nhex(&self) -> usize {
        self.lattice.num_cells()
    }

    /// A zeroed field sized to the lattice
    pub fn new_field(&self) -> Vec<f64> {
        vec![0.0; self.nhex()]
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Count one step
    pub fn advance(&mut self) {
        self.step_count += 1;
    }

    pub fn boundary_falloff_dist(&self) -> f64 {
        self.boundary_falloff_dist
    }

    pub fn set_boundary_falloff_dist(&mut self, dist: f64) {
        self.boundary_falloff_dist = dist;
    }

    /// Fill `v` with `rand * gain + offset`, rolled off near the boundary
    pub fn noiseify(&self, v: &mut [f64], offset: f64, gain: f64, rng: &mut StdRng) {
        kernel::noiseify(
            self.lattice(),
            v,
            offset,
            gain,
            self.boundary_falloff_dist,
            rng,
        );
    }
}

/// The models that can be selected from a parameters file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Schnakenberg,
    LotkaVolterra,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Schnakenberg => "schnakenberg",
            ModelKind::LotkaVolterra => "lotka_volterra",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schnakenberg" => Ok(ModelKind::Schnakenberg),
            "lotka_volterra" => Ok(ModelKind::LotkaVolterra),
            other => Err(format!("unknown model '{other}'")),
        }
    }
}

/// Build a model of the given kind, reading its parameters from `config`
pub fn build_model<L>(
    kind: ModelKind,
    lattice: Arc<L>,
    config: &Config,
) -> ConfigResult<Box<dyn ReactionDiffusion>>
where
    L: Lattice + ?Sized + 'static,
{
    let model: Box<dyn ReactionDiffusion> = match kind {
        ModelKind::Schnakenberg => Box::new(Schnakenberg::new(lattice, config.section()?)),
        ModelKind::LotkaVolterra => Box::new(LotkaVolterra::new(lattice, config.section()?)),
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexgrid::HexGrid;
    use serde_json::json;

    #[test]
    fn model_kind_names_round_trip() {
        for kind in [ModelKind::Schnakenberg, ModelKind::LotkaVolterra] {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                json!(kind.to_string())
            );
        }
        assert!("brusselator".parse::<ModelKind>().is_err());
    }

    #[test]
    fn build_model_reads_parameters() {
        let grid = Arc::new(HexGrid::new(0.2, 1.0).unwrap());
        let conf = Config::from_value(json!({ "k1": 0.5, "D_B": 0.4, "a1": 3.0 })).unwrap();

        let schnak = build_model(ModelKind::Schnakenberg, grid.clone(), &conf).unwrap();
        assert_eq!(schnak.name(), "schnakenberg");
        assert_eq!(schnak.params()["k1"], 0.5);
        assert_eq!(schnak.params()["D_B"], 0.4);
        assert_eq!(schnak.params()["k2"], 1.0);
        assert_eq!(schnak.num_cells(), grid.num());

        let lv = build_model(ModelKind::LotkaVolterra, grid, &conf).unwrap();
        assert_eq!(lv.name(), "lotka_volterra");
        assert_eq!(lv.params()["a1"], 3.0);
        assert_eq!(lv.params()["D1"], 0.1);
    }

    #[test]
    fn build_model_rejects_bad_parameter_types() {
        let grid = Arc::new(HexGrid::new(0.2, 1.0).unwrap());
        let conf = Config::from_value(json!({ "k1": "lots" })).unwrap();
        assert!(build_model(ModelKind::Schnakenberg, grid, &conf).is_err());
    }

    #[test]
    fn core_counts_steps_and_sizes_fields() {
        let grid = Arc::new(HexGrid::new(0.2, 1.0).unwrap());
        let mut core = RdCore::new(grid.clone());
        assert_eq!(core.dt(), DEFAULT_DT);
        assert_eq!(core.new_field().len(), grid.num());
        core.advance();
        core.advance();
        assert_eq!(core.step_count(), 2);
    }
}
