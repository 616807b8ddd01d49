/*
 * clear.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Clear command implementation
 */

//! Clear command implementation.

use anyhow::{Context, Result};

use crate::GlobalArgs;

/// Execute the clear command
pub fn execute(args: &GlobalArgs) -> Result<()> {
    let engine = super::engine(args)?;
    let removed = engine.clear_cache().with_context(|| {
        format!(
            "Failed to clear cache directory {}",
            engine.config().cache_dir.display()
        )
    })?;
    println!(
        "Removed {} compiled template{}",
        removed,
        if removed == 1 { "" } else { "s" }
    );
    Ok(())
}
