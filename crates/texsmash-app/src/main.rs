//! The `texsmash` binary entry point.

use std::process::ExitCode;

use clap::Parser;
use texsmash_app::platform::PlatformDirs;
use texsmash_config::{CliArgs, Config};
use tracing::{error, info};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let dirs = match args.config.clone() {
        Some(dir) => PlatformDirs::with_config_dir(dir),
        None => match PlatformDirs::resolve() {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to resolve config directory: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create {}: {e}", dirs.config_dir.display());
        return ExitCode::FAILURE;
    }

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    texsmash_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    match texsmash_app::run(&args.job, &config) {
        Ok(summary) => {
            info!(
                atlases = summary.atlases.len(),
                retained = summary.retained,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(job = %args.job.display(), "atlas build failed: {e}");
            ExitCode::FAILURE
        }
    }
}
