/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template tokenizing, compilation, caching and rendering.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Malformed template syntax (unterminated tag, stray marker, bad arguments).
    #[error("Syntax error: {message}")]
    Syntax { message: String },

    /// A control construct reached end of input without its closing tag.
    #[error("Syntax error: unclosed `{construct}` (missing `end{construct}`)")]
    UnclosedConstruct { construct: String },

    /// A template name could not be found in any search path.
    #[error("Template not found: {name} (searched: {})", display_roots(.searched))]
    TemplateNotFound { name: String, searched: Vec<PathBuf> },

    /// The compiler met a token, command or condition it cannot lower.
    #[error("Compilation error: unknown construct: {kind}")]
    UnknownConstruct { kind: String },

    /// Reading a source, creating the cache directory or writing an artifact failed.
    #[error("Cache I/O error at {}: {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `clear()` stopped at the first artifact it could not remove.
    #[error("Failed to clear cache: could not remove {}: {source}", .path.display())]
    CacheClear {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted artifact could not be decoded.
    #[error("Invalid compiled artifact {}: {message}", .path.display())]
    InvalidArtifact { path: PathBuf, message: String },

    /// Unknown filter name.
    #[error("Unknown filter: {name}")]
    UnknownFilter { name: String },

    /// Invalid filter parameters.
    #[error("Invalid arguments for filter '{filter}': {message}")]
    InvalidFilterArgs { filter: String, message: String },

    /// Include/extends nesting went past the configured limit.
    #[error("Recursive template inclusion detected (depth > {max_depth}): {name}")]
    RecursiveInclude { name: String, max_depth: usize },

    /// Configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Coarse classification of [`TemplateError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Resolution,
    Compilation,
    CacheIo,
    Render,
    Config,
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        TemplateError::Syntax {
            message: message.into(),
        }
    }

    pub(crate) fn unknown(kind: impl Into<String>) -> Self {
        TemplateError::UnknownConstruct { kind: kind.into() }
    }

    pub(crate) fn cache_io(path: &Path, source: std::io::Error) -> Self {
        TemplateError::CacheIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Which part of the error taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TemplateError::Syntax { .. } | TemplateError::UnclosedConstruct { .. } => {
                ErrorCategory::Syntax
            }
            TemplateError::TemplateNotFound { .. } => ErrorCategory::Resolution,
            TemplateError::UnknownConstruct { .. } => ErrorCategory::Compilation,
            TemplateError::CacheIo { .. }
            | TemplateError::CacheClear { .. }
            | TemplateError::InvalidArtifact { .. } => ErrorCategory::CacheIo,
            TemplateError::UnknownFilter { .. }
            | TemplateError::InvalidFilterArgs { .. }
            | TemplateError::RecursiveInclude { .. } => ErrorCategory::Render,
            TemplateError::Config { .. } => ErrorCategory::Config,
        }
    }
}

fn display_roots(roots: &[PathBuf]) -> String {
    if roots.is_empty() {
        return "<no search paths>".to_string();
    }
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
