use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reaction-diffusion simulation on boundary-clipped hexagonal lattices.
#[derive(Parser, Debug)]
#[command(name = "hexrd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation from a JSON or YAML parameters file
    Run {
        /// Parameters file (.json, .yaml)
        params: PathBuf,

        /// Log directory, replacing the one named in the parameters file
        logpath: Option<PathBuf>,

        /// Override a parameter, e.g. `-c steps=200`
        #[arg(short = 'c', long = "override", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
    /// List the datasets in a data file
    Inspect {
        /// A positions.dat or dat_NNNNN.dat file
        file: PathBuf,
    },
}
