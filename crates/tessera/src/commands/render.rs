/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render command implementation
 */

//! Render command implementation.
//!
//! Renders one template against an optional JSON data file. The data file
//! must hold a JSON object; its keys become the top-level template variables.

use std::path::Path;

use anyhow::{Context, Result};
use tessera_template::TemplateContext;
use tracing::info;

use crate::GlobalArgs;

/// Execute the render command
pub fn execute(
    args: &GlobalArgs,
    name: &str,
    data: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let engine = super::engine(args)?;

    let context = match data {
        Some(path) => load_data(path)?,
        None => TemplateContext::new(),
    };

    let rendered = engine
        .render(name, &context)
        .with_context(|| format!("Failed to render template '{}'", name))?;

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!(template = name, output = %path.display(), "Rendered template");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn load_data(path: &Path) -> Result<TemplateContext> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse data file {}", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("Data file {} must contain a JSON object", path.display());
    }
    Ok(TemplateContext::from_json(value))
}
