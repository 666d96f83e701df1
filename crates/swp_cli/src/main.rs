use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use swp_config::ScenarioLoader;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "swp", about = "Smart Water Platform simulation engine")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a scenario document and run it to completion.
    RunScenario {
        /// Path to a `.json`, `.yaml`, or `.yml` scenario document.
        config_path: PathBuf,

        /// Write per-tick state as JSON Lines to this path instead of
        /// discarding history after the run.
        #[arg(short, long)]
        history_out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    swp_diag::init_logging();

    let args = Args::parse();
    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "run failed");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(command: Command) -> Result<(), swp_diag::SimError> {
    match command {
        Command::RunScenario { config_path, history_out } => run_scenario(&config_path, history_out.as_deref()),
    }
}

fn run_scenario(config_path: &std::path::Path, history_out: Option<&std::path::Path>) -> Result<(), swp_diag::SimError> {
    info!(path = %config_path.display(), "loading scenario");
    let loader = ScenarioLoader::with_defaults();
    let mut loaded = loader.load_path(config_path)?;

    info!(mode = ?loaded.mode, num_steps = loaded.num_steps, "running scenario");
    loaded.harness.run(loaded.mode, loaded.num_steps)?;
    info!(ticks_recorded = loaded.harness.history().len(), "scenario complete");

    if let Some(out_path) = history_out {
        let mut file = std::fs::File::create(out_path)?;
        for tick in loaded.harness.history() {
            let line = serde_json::to_string(tick)?;
            use std::io::Write;
            writeln!(file, "{line}").map_err(|e| swp_diag::SimError::InvalidConfig {
                reason: format!("failed writing history to {}: {e}", out_path.display()),
            })?;
        }
    }

    Ok(())
}
