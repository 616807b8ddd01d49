/*
 * tokens.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Tokens command implementation
 */

//! Tokens command implementation.
//!
//! Prints the token stream of a single template file without resolving
//! `extends` or `include` targets.

use std::path::Path;

use anyhow::{Context, Result};
use tessera_template::{flatten, structure, tokenize, tokens_to_json};

/// Execute the tokens command
pub fn execute(file: &Path, flat: bool) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read template {}", file.display()))?;

    let tokens = tokenize(&source)
        .and_then(structure)
        .with_context(|| format!("Failed to parse template {}", file.display()))?;
    let tokens = if flat { flatten(&tokens) } else { tokens };

    println!("{}", tokens_to_json(&tokens)?);
    Ok(())
}
