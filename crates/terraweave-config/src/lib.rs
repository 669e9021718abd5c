//! Configuration for terraweave.
//!
//! Settings persist to disk as `config.ron`, can be overridden from the
//! command line, and are turned into the terrain crate's settings types.
//! Unknown fields are ignored and missing ones take their defaults, so files
//! written by older or newer versions still load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebugConfig, GenerationConfig, GridConfig, default_config_dir,
};
pub use error::ConfigError;
