use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hexrd::cli::{Cli, Commands};
use hexrd::io::DataFile;
use hexrd::runner;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let data = DataFile::open(file).with_context(|| format!("cannot inspect {}", file.display()))?;
    print!("{}", data.summary());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            params,
            logpath,
            overrides,
        } => {
            // Recorded as argv0/argv1: the program and its parameters file
            let argv = [
                std::env::args().next().unwrap_or_default(),
                params.display().to_string(),
            ];
            let summary = runner::run_from_file(&params, &overrides, logpath.as_deref(), &argv)
                .with_context(|| format!("simulation from {} failed", params.display()))?;
            println!("Simulated {summary}");
        }
        Commands::Inspect { file } => inspect(&file)?,
    }

    Ok(())
}
