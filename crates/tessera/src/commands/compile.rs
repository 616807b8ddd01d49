/*
 * compile.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Compile command implementation
 */

//! Compile command implementation.

use anyhow::{Context, Result};
use tracing::info;

use crate::GlobalArgs;

/// Execute the compile command
pub fn execute(args: &GlobalArgs, name: &str, print: bool) -> Result<()> {
    let engine = super::engine(args)?;

    let lookup = engine
        .compile(name)
        .with_context(|| format!("Failed to compile template '{}'", name))?;
    info!(
        template = name,
        recompiled = lookup.recompiled,
        "Compiled template"
    );

    if print {
        let code = std::fs::read_to_string(&lookup.path)
            .with_context(|| format!("Failed to read artifact {}", lookup.path.display()))?;
        println!("{}", code);
    } else {
        println!("{}", lookup.path.display());
    }
    Ok(())
}
