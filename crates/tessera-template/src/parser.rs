/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template-level parsing.
//!
//! Runs the tokenizer and the structurer, then extracts inheritance metadata
//! (parent template, named blocks) and the set of templates this template
//! depends on.

use crate::error::{TemplateError, TemplateResult};
use crate::resolver::TemplateResolver;
use crate::structure::structure;
use crate::token::{Command, ControlMetadata, Token};
use crate::tokenizer::tokenize;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A parsed template ready for compilation.
///
/// Built once per compile request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    tokens: Vec<Token>,
    template_path: PathBuf,
    parent_template: Option<String>,
    blocks: IndexMap<String, Vec<Token>>,
    dependencies: BTreeSet<PathBuf>,
}

impl ParsedTemplate {
    /// Parse template source.
    ///
    /// # Arguments
    /// * `source` - The template source text
    /// * `template_path` - Resolved path of the template (its own dependency)
    /// * `resolver` - Used to resolve `extends` and `include` targets
    pub fn parse(
        source: &str,
        template_path: &Path,
        resolver: &dyn TemplateResolver,
    ) -> TemplateResult<Self> {
        let tokens = structure(tokenize(source)?)?;

        let mut parent_template = None;
        let mut blocks = IndexMap::new();
        for token in &tokens {
            let Token::Control(control) = token else {
                continue;
            };
            match (&control.command, &control.metadata) {
                (Command::Extends, ControlMetadata::Extends { parent }) => {
                    parent_template = Some(parent.clone());
                }
                (Command::Block, _) => {
                    let name = control.expression.trim();
                    if name.is_empty() {
                        return Err(TemplateError::syntax("`block` requires a name"));
                    }
                    // Last definition of a name wins.
                    blocks.insert(name.to_string(), control.children.clone());
                }
                _ => {}
            }
        }

        let dependencies = collect_dependencies(template_path, &tokens, resolver)?;

        Ok(Self {
            tokens,
            template_path: template_path.to_path_buf(),
            parent_template,
            blocks,
            dependencies,
        })
    }

    /// Read and parse a template file.
    pub fn parse_file(template_path: &Path, resolver: &dyn TemplateResolver) -> TemplateResult<Self> {
        let source = resolver.read(template_path)?;
        Self::parse(&source, template_path, resolver)
    }

    /// The structured top-level tokens.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Name of the parent template declared with `extends`, if any.
    pub fn parent_template(&self) -> Option<&str> {
        self.parent_template.as_deref()
    }

    /// Top-level blocks by name, in first-declaration order.
    pub fn blocks(&self) -> &IndexMap<String, Vec<Token>> {
        &self.blocks
    }

    /// This template plus every template reachable through `extends` and
    /// `include`, directly or through other referenced templates.
    pub fn dependencies(&self) -> &BTreeSet<PathBuf> {
        &self.dependencies
    }

    pub fn is_extending(&self) -> bool {
        self.parent_template.is_some()
    }
}

/// The template itself plus the transitive closure of its references.
///
/// Each referenced template is read and structured once; cycles stop at
/// templates already visited.
fn collect_dependencies(
    template_path: &Path,
    tokens: &[Token],
    resolver: &dyn TemplateResolver,
) -> TemplateResult<BTreeSet<PathBuf>> {
    let mut dependencies = BTreeSet::new();
    dependencies.insert(template_path.to_path_buf());

    let mut pending = Vec::new();
    collect_references(tokens, true, resolver, &mut pending)?;
    while let Some(path) = pending.pop() {
        if !dependencies.insert(path.clone()) {
            continue;
        }
        let tokens = structure(tokenize(&resolver.read(&path)?)?)?;
        collect_references(&tokens, true, resolver, &mut pending)?;
    }
    Ok(dependencies)
}

/// Resolved `extends` (top level only) and `include` targets, nested bodies
/// included.
fn collect_references(
    tokens: &[Token],
    top_level: bool,
    resolver: &dyn TemplateResolver,
    references: &mut Vec<PathBuf>,
) -> TemplateResult<()> {
    for token in tokens {
        let Token::Control(control) = token else {
            continue;
        };
        match &control.metadata {
            ControlMetadata::Extends { parent } if top_level => {
                references.push(resolver.resolve(parent)?);
            }
            ControlMetadata::Include { template, .. } => {
                references.push(resolver.resolve(template)?);
            }
            _ => {}
        }
        collect_references(&control.children, false, resolver, references)?;
        collect_references(&control.else_children, false, resolver, references)?;
    }
    Ok(())
}
