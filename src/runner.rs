//! Simulation driver
//!
//! Turns a parameters file into a log directory: builds the clipped hex
//! grid, runs the selected model for the configured number of steps, writes
//! periodic field snapshots and finally records the effective parameters
//! next to the data.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::hexgrid::{HexGrid, LatticeError};
use crate::io::{DataError, DataFile};
use crate::kernel::all_finite;
use crate::lattice::Direction;
use crate::model::{DEFAULT_DT, ModelKind, ReactionDiffusion, build_model};

/// Run record written into the log directory
pub const PARAMS_RECORD: &str = "params.json";

/// Lattice geometry written into the log directory
pub const POSITIONS_FILE: &str = "positions.dat";

/// Bytes per stored field value
pub const FLOAT_WIDTH: u32 = 8;

/// Errors that stop a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lattice(#[from] LatticeError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("not much point simulating 0 steps")]
    ZeroSteps,

    #[error("logevery must be at least 1")]
    ZeroLogInterval,

    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "a previous simulation was logged in {0}; clean it out, choose another directory or set overwrite_logs"
    )]
    PreviousRun(String),

    #[error("species {species} became non-finite by step {step}")]
    NonFinite { species: String, step: u64 },
}

/// Run settings read from the parameters file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub steps: u64,
    pub logevery: u64,
    pub overwrite_logs: bool,
    pub logpath: String,
    pub logbase: String,
    pub dt: f64,
    pub hextohex_d: f32,
    pub hexspan: f32,
    pub ellipse_a: f32,
    pub ellipse_b: f32,
    #[serde(rename = "boundaryFalloffDist")]
    pub boundary_falloff_dist: f64,
    pub model: ModelKind,
    /// Fixed RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
    pub halt_on_nonfinite: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            steps: 1000,
            logevery: 100,
            overwrite_logs: false,
            logpath: "fromfilename".to_string(),
            logbase: "logs/".to_string(),
            dt: DEFAULT_DT,
            hextohex_d: 0.01,
            hexspan: 4.0,
            ellipse_a: 0.8,
            ellipse_b: 0.6,
            boundary_falloff_dist: 0.01,
            model: ModelKind::default(),
            seed: None,
            halt_on_nonfinite: true,
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.section()
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.steps == 0 {
            return Err(RunError::ZeroSteps);
        }
        if self.logevery == 0 {
            return Err(RunError::ZeroLogInterval);
        }
        Ok(())
    }

    /// Work out where to log. A path given on the command line wins; otherwise
    /// `fromfilename` means `logbase` joined with the parameters file stem.
    pub fn resolve_logpath(&self, params_file: Option<&Path>, cli_logpath: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_logpath {
            if self.overwrite_logs {
                warn!(
                    "using command line log path {} and overwrite_logs is set",
                    path.display()
                );
            }
            return path.to_path_buf();
        }
        if self.logpath == "fromfilename" {
            let stem = params_file
                .and_then(Path::file_stem)
                .and_then(|s| s.to_str())
                .unwrap_or("run");
            return Path::new(&self.logbase).join(stem);
        }
        PathBuf::from(&self.logpath)
    }
}

/// Destination for periodic field snapshots
pub trait SnapshotSink {
    fn write_snapshot(&mut self, step: u64, fields: &[(&'static str, &[f64])]) -> Result<(), DataError>;
}

/// Writes each snapshot to `dat_<step>.dat` in a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn snapshot_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("dat_{step:05}.dat"))
    }
}

impl SnapshotSink for DirectorySink {
    fn write_snapshot(&mut self, step: u64, fields: &[(&'static str, &[f64])]) -> Result<(), DataError> {
        let path = self.snapshot_path(step);
        let mut file = DataFile::create(&path)?;
        for (name, field) in fields {
            file.add_contained_vals(&format!("/{name}"), field)?;
        }
        file.commit()?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

/// What a finished run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub logpath: PathBuf,
    pub nhex: usize,
    pub steps: u64,
    pub snapshots: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps on {} hexes, {} snapshots in {}",
            self.steps,
            self.nhex,
            self.snapshots,
            self.logpath.display()
        )
    }
}

/// A grid and an initialised model ready to step
pub struct Simulation {
    settings: RunSettings,
    grid: Arc<HexGrid>,
    model: Box<dyn ReactionDiffusion>,
}

impl Simulation {
    /// Build the grid and model described by `settings`; model parameters are
    /// read from `config`.
    pub fn new(settings: RunSettings, config: &Config) -> Result<Self, RunError> {
        settings.validate()?;

        let grid = HexGrid::with_elliptical_boundary(
            settings.hextohex_d,
            settings.hexspan,
            settings.ellipse_a,
            settings.ellipse_b,
        )?;
        debug!(
            nhex = grid.num(),
            boundary = grid.boundary_count(),
            "built hex grid"
        );
        let grid = Arc::new(grid);

        let mut model = build_model(settings.model, Arc::clone(&grid), config)?;
        model.allocate();
        model.set_dt(settings.dt);
        model.set_boundary_falloff_dist(settings.boundary_falloff_dist);
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        model.init(&mut rng);

        Ok(Self {
            settings,
            grid,
            model,
        })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn model(&self) -> &dyn ReactionDiffusion {
        self.model.as_ref()
    }

    /// Step the model `steps` times, handing every `logevery`th state to
    /// `sink`. Returns the number of snapshots written.
    pub fn run(&mut self, sink: &mut dyn SnapshotSink) -> Result<usize, RunError> {
        let RunSettings {
            steps,
            logevery,
            halt_on_nonfinite,
            ..
        } = self.settings;
        let start = Instant::now();
        let mut snapshots = 0;
        let mut warned = false;

        for _ in 0..steps {
            self.model.step();
            let step = self.model.step_count();
            if step % logevery != 0 {
                continue;
            }

            let fields = self.model.fields();
            sink.write_snapshot(step, &fields)?;
            snapshots += 1;

            if let Some((species, _)) = fields.iter().find(|(_, f)| !all_finite(f)) {
                if halt_on_nonfinite {
                    return Err(RunError::NonFinite {
                        species: species.to_string(),
                        step,
                    });
                }
                if !warned {
                    warn!("species {species} is non-finite at step {step}; continuing");
                    warned = true;
                }
            }
        }

        info!(
            steps,
            snapshots,
            elapsed = ?start.elapsed(),
            "simulation complete"
        );
        Ok(snapshots)
    }
}

/// Create the log directory, refusing to mix with an earlier run unless
/// `overwrite` is set.
pub fn prepare_logdir(dir: &Path, overwrite: bool) -> Result<(), RunError> {
    if dir.is_dir() {
        let previous = dir.join(PARAMS_RECORD).exists() || dir.join(POSITIONS_FILE).exists();
        if previous && !overwrite {
            return Err(RunError::PreviousRun(dir.display().to_string()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|source| RunError::LogDir {
            path: dir.display().to_string(),
            source,
        })?;
    }
    info!("logging to {}", dir.display());
    Ok(())
}

/// Write hex centres, neighbour centres, spacing and area to `positions.dat`
pub fn save_positions(grid: &HexGrid, dir: &Path) -> Result<(), DataError> {
    let mut file = DataFile::create(&dir.join(POSITIONS_FILE))?;
    file.add_contained_vals("/x", &grid.d_x())?;
    file.add_contained_vals("/y", &grid.d_y())?;
    for dir in Direction::ALL {
        let (xs, ys) = grid.neighbour_positions(dir);
        file.add_contained_vals(&format!("/x_{}", dir.label()), &xs)?;
        file.add_contained_vals(&format!("/y_{}", dir.label()), &ys)?;
    }
    file.add_val("/d", grid.d())?;
    file.add_val("/area", grid.num() as f32 * grid.hex_area())?;
    file.commit()
}

/// Shortest decimal form of an `f32`, not its widened `f64` value
fn shortest_decimal(x: f32) -> f64 {
    x.to_string().parse().unwrap_or(f64::from(x))
}

/// Add the settings the run actually used, plus run metadata, to `config`
/// and write it to `params.json` in `dir`
pub fn record_run(
    config: &mut Config,
    sim: &Simulation,
    argv: &[String],
    dir: &Path,
) -> Result<(), RunError> {
    let model = sim.model();
    let settings = sim.settings();
    config.set("float_width", FLOAT_WIDTH)?;
    config.set(
        "sim_ran_at_time",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;

    config.set("steps", settings.steps)?;
    config.set("logevery", settings.logevery)?;
    config.set("overwrite_logs", settings.overwrite_logs)?;
    config.set("logpath", &settings.logpath)?;
    config.set("logbase", &settings.logbase)?;
    config.set("hextohex_d", shortest_decimal(sim.grid().d()))?;
    config.set("hexspan", shortest_decimal(settings.hexspan))?;
    config.set("ellipse_a", shortest_decimal(settings.ellipse_a))?;
    config.set("ellipse_b", shortest_decimal(settings.ellipse_b))?;
    config.set("boundaryFalloffDist", settings.boundary_falloff_dist)?;
    config.set("halt_on_nonfinite", settings.halt_on_nonfinite)?;
    if let Some(seed) = settings.seed {
        config.set("seed", seed)?;
    }

    config.set("dt", model.dt())?;
    for (name, value) in model.params() {
        config.set(name, value)?;
    }
    config.set("model", model.name())?;
    config.set("nhex", sim.grid().num())?;
    if let Some(arg) = argv.first() {
        config.set("argv0", arg)?;
    }
    if let Some(arg) = argv.get(1) {
        config.set("argv1", arg)?;
    }
    config.write(&dir.join(PARAMS_RECORD))?;
    Ok(())
}

/// Run a simulation from a parameters file.
///
/// `overrides` are `key=value` strings applied over the file; `cli_logpath`
/// replaces the configured log directory; `argv` is stored in the run record.
pub fn run_from_file(
    params: &Path,
    overrides: &[String],
    cli_logpath: Option<&Path>,
    argv: &[String],
) -> Result<RunSummary, RunError> {
    let mut config = Config::load(params)?;
    config.process_args(overrides)?;
    let settings = RunSettings::from_config(&config)?;
    let logpath = settings.resolve_logpath(Some(params), cli_logpath);

    let mut sim = Simulation::new(settings, &config)?;
    prepare_logdir(&logpath, sim.settings().overwrite_logs)?;
    save_positions(sim.grid(), &logpath)?;

    info!(
        model = sim.model().name(),
        nhex = sim.grid().num(),
        steps = sim.settings().steps,
        "starting simulation"
    );
    let mut sink = DirectorySink::new(&logpath);
    let snapshots = sim.run(&mut sink)?;
    record_run(&mut config, &sim, argv, &logpath)?;

    Ok(RunSummary {
        logpath,
        nhex: sim.grid().num(),
        steps: sim.settings().steps,
        snapshots,
    })
}
