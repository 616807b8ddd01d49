//! Command implementations for Tessera CLI
//!
//! Each command module handles the CLI interface and delegates to
//! tessera-template for actual implementation.

pub mod clear;
pub mod compile;
pub mod render;
pub mod tokens;

use std::path::Path;

use anyhow::{Context, Result};
use tessera_template::{Engine, EngineConfig};

use crate::GlobalArgs;

/// Configuration file picked up from the working directory.
const DEFAULT_CONFIG_FILE: &str = "tessera.toml";

/// Load the engine configuration, then apply command-line overrides.
pub fn load_config(args: &GlobalArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            EngineConfig::load(Path::new(DEFAULT_CONFIG_FILE)).with_context(|| {
                format!("Failed to load configuration {}", DEFAULT_CONFIG_FILE)
            })?
        }
        None => EngineConfig::default(),
    };

    if !args.search_paths.is_empty() {
        config = config.with_search_paths(args.search_paths.iter().cloned());
    }
    if let Some(dir) = &args.cache_dir {
        config = config.with_cache_dir(dir.clone());
    }
    if args.debug {
        config = config.with_debug(true);
    }

    tracing::debug!(
        search_paths = ?config.search_paths,
        cache_dir = %config.cache_dir.display(),
        debug = config.debug,
        "Loaded configuration"
    );
    Ok(config)
}

/// Build an engine from the global options.
pub fn engine(args: &GlobalArgs) -> Result<Engine> {
    Ok(Engine::new(load_config(args)?))
}
