//! Configuration for texsmash.
//!
//! Settings persist to disk as a RON file and can be overridden from the command line.
//! Every section falls back to defaults, so old config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{AtlasConfig, CONFIG_FILE_NAME, Config, DebugConfig, OutputConfig};
pub use error::ConfigError;
