/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiling template engine with an on-disk artifact cache.
//!
//! Template syntax:
//!
//! - Variables: `{{ name }}`, `{{ user.address.city }}`, `{{ items.0 }}`
//! - Filters: `{{ title|upper }}`, `{{ tags|join:", " }}`, `{{ html|raw }}`
//! - Conditionals: `{% if user %}...{% else %}...{% endif %}`,
//!   `{% if count >= 3 %}...{% endif %}`
//! - Loops: `{% for items as item %}{{ item_key }}: {{ item }}{% else %}none{% endfor %}`
//! - Inheritance: `{% extends "base" %}` with `{% block name %}...{% endblock %}`
//! - Includes: `{% include "header" %}`, `{% include "card" with user.profile as profile %}`
//! - Comments: `{# ... #}`
//!
//! Variables are HTML-escaped unless the filter chain contains `raw`.
//!
//! # Architecture
//!
//! A template goes through these stages:
//!
//! 1. [`tokenize`]: source text to a flat token stream
//! 2. [`structure`]: control tags nested into a token tree
//! 3. [`ParsedTemplate`]: inheritance metadata and dependencies, with names
//!    resolved through a [`TemplateResolver`]
//! 4. [`compile`]: token tree to an executable [`Program`]
//! 5. [`ArtifactCache`]: programs persisted per template path and rebuilt
//!    when the source changes
//! 6. [`Engine`]: resolves, compiles on demand and renders programs against a
//!    [`TemplateContext`]
//!
//! # Example
//!
//! ```ignore
//! use tessera_template::{Engine, EngineConfig, TemplateContext};
//!
//! let engine = Engine::new(EngineConfig::new().with_search_paths(["templates"]));
//!
//! let mut ctx = TemplateContext::new();
//! ctx.insert("name", "World");
//!
//! // templates/hello.html: "Hello, {{ name }}!"
//! let output = engine.render("hello", &ctx)?;
//! assert_eq!(output, "Hello, World!");
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod parser;
pub mod program;
pub mod render;
pub mod resolver;
pub mod structure;
pub mod token;
pub mod tokenizer;

// Re-export main types at crate root
pub use cache::{ArtifactCache, CacheLookup, ExecutionCache};
pub use compiler::{compile, compile_source};
pub use config::EngineConfig;
pub use context::{TemplateContext, TemplateValue};
pub use error::{ErrorCategory, TemplateError, TemplateResult};
pub use filters::{FilterSet, StandardFilters, escape_html};
pub use parser::ParsedTemplate;
pub use program::{Condition, Expr, Op, Program};
pub use render::{DeferredBlock, Engine, ProgramCache};
pub use resolver::{SearchPathResolver, TemplateResolver};
pub use structure::{flat_source, flatten, structure};
pub use token::{
    Accessor, Command, Control, ControlMetadata, FilterCall, IncludeScope, Token, Variable,
    tokens_from_json, tokens_to_json, tokens_to_source,
};
pub use tokenizer::tokenize;
