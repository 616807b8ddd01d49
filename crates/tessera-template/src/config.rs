/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration.
//!
//! Loaded from TOML with kebab-case keys; every field has a default so an
//! empty file is a valid configuration.
//!
//! ```toml
//! search-paths = ["templates", "shared/templates"]
//! extension = "html"
//! cache-dir = ".cache/tessera"
//! debug = true
//! check-interval = 60
//! ```

use crate::error::{TemplateError, TemplateResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for template resolution, caching and rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Template roots in precedence order (first match wins).
    pub search_paths: Vec<PathBuf>,

    /// Extension appended to template names that have none.
    pub extension: String,

    /// Directory holding compiled artifacts.
    pub cache_dir: PathBuf,

    /// Check source modification times on every request.
    pub debug: bool,

    /// Production mode: seconds an artifact is trusted after it was written.
    pub check_interval: u64,

    /// Extension of compiled artifact files.
    pub artifact_extension: String,

    /// Maximum include/extends nesting during a render.
    pub max_include_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from("templates")],
            extension: "html".to_string(),
            cache_dir: std::env::temp_dir().join("tessera-cache"),
            debug: false,
            check_interval: 60,
            artifact_extension: "json".to_string(),
            max_include_depth: 50,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from a TOML file.
    pub fn load(path: &Path) -> TemplateResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TemplateError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            TemplateError::Config { message } => TemplateError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> TemplateResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| TemplateError::Config {
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> TemplateResult<()> {
        if self.artifact_extension.trim_start_matches('.').is_empty() {
            return Err(TemplateError::Config {
                message: "artifact-extension must not be empty".to_string(),
            });
        }
        if self.max_include_depth == 0 {
            return Err(TemplateError::Config {
                message: "max-include-depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Replace the search paths.
    pub fn with_search_paths(
        mut self,
        paths: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Self {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Add a search path with lower precedence than the existing ones.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.as_secs();
        self
    }

    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = extension.into();
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// The production-mode trust window.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}
