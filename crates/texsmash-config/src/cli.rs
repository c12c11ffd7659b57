//! Command-line argument parsing for texsmash.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// texsmash command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "texsmash", about = "Merge a mesh's materials into texture atlases")]
pub struct CliArgs {
    /// Job file describing materials and the mesh (RON).
    #[arg(long)]
    pub job: PathBuf,

    /// Output directory.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Atlas canvas width in texels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Atlas canvas height in texels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Packer scan step in texels.
    #[arg(long)]
    pub skip_distance: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.output {
            self.output.directory = dir.clone();
        }
        if let Some(w) = args.width {
            self.atlas.width = w;
        }
        if let Some(h) = args.height {
            self.atlas.height = h;
        }
        if let Some(skip) = args.skip_distance {
            self.atlas.skip_distance = skip;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
