/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Rendering compiled programs.
//!
//! [`Engine`] ties the pipeline together: resolve a template name, make sure
//! its artifact is fresh, load the program and execute it against a
//! [`TemplateContext`].
//!
//! Inheritance is resolved at render time. An extending template registers
//! its blocks as [`DeferredBlock`]s and then runs its parent; whenever the
//! parent reaches a `block` it runs the registered override instead of its own
//! body. Registrations live for a single render call.

use crate::cache::{ArtifactCache, CacheLookup, ExecutionCache};
use crate::config::EngineConfig;
use crate::context::{TemplateContext, TemplateValue};
use crate::error::{TemplateError, TemplateResult};
use crate::filters::{FilterSet, StandardFilters};
use crate::program::{
    BlockUnit, Comparison, Condition, Expr, Literal, Op, Program, ScopedBinding,
};
use crate::resolver::{SearchPathResolver, TemplateResolver};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Template engine: resolution, artifact cache and rendering.
pub struct Engine {
    config: EngineConfig,
    resolver: Arc<SearchPathResolver>,
    cache: ArtifactCache,
    programs: Arc<ProgramCache>,
    filters: Arc<dyn FilterSet>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the standard filters.
    pub fn new(config: EngineConfig) -> Self {
        let resolver = Arc::new(SearchPathResolver::new(
            config.search_paths.clone(),
            config.extension.clone(),
        ));
        let programs = Arc::new(ProgramCache::new());
        let cache = ArtifactCache::new(&config, resolver.clone())
            .with_execution_cache(programs.clone());
        Self {
            config,
            resolver,
            cache,
            programs,
            filters: Arc::new(StandardFilters),
        }
    }

    /// Replace the filter set.
    pub fn with_filters(mut self, filters: Arc<dyn FilterSet>) -> Self {
        self.filters = filters;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &SearchPathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolve `name` and make sure its artifact is fresh.
    pub fn compile(&self, name: &str) -> TemplateResult<CacheLookup> {
        let template_path = self.resolver.resolve(name)?;
        self.cache.ensure_compiled(&template_path)
    }

    /// Path of the ready-to-execute artifact for template `name`.
    pub fn compiled_path(&self, name: &str) -> TemplateResult<PathBuf> {
        self.compile(name).map(|lookup| lookup.path)
    }

    /// Render template `name` against `context`.
    pub fn render(&self, name: &str, context: &TemplateContext) -> TemplateResult<String> {
        tracing::debug!(template = name, "Rendering template");
        let program = self.load(name)?;
        let mut renderer = Renderer::new(self, context.clone());
        renderer.run(&program.ops)?;
        Ok(renderer.out)
    }

    /// Remove all compiled artifacts and loaded programs.
    pub fn clear_cache(&self) -> TemplateResult<usize> {
        let removed = self.cache.clear()?;
        self.programs.clear();
        Ok(removed)
    }

    fn load(&self, name: &str) -> TemplateResult<Arc<Program>> {
        let artifact = self.compiled_path(name)?;
        self.programs.load(&artifact)
    }
}

/// Loaded programs keyed by artifact path.
///
/// Entries are dropped when the artifact cache rewrites an artifact, and
/// reloaded when the artifact's modification time no longer matches (another
/// process recompiled it).
#[derive(Debug, Default)]
pub struct ProgramCache {
    entries: Mutex<HashMap<PathBuf, LoadedProgram>>,
}

#[derive(Debug)]
struct LoadedProgram {
    modified: SystemTime,
    program: Arc<Program>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the program stored at `artifact_path`, reusing a loaded copy when
    /// the file has not changed.
    pub fn load(&self, artifact_path: &Path) -> TemplateResult<Arc<Program>> {
        let modified = std::fs::metadata(artifact_path)
            .and_then(|meta| meta.modified())
            .ok();

        if let Some(modified) = modified {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(loaded) = entries.get(artifact_path)
                && loaded.modified == modified
            {
                return Ok(loaded.program.clone());
            }
        }

        let code = std::fs::read_to_string(artifact_path)
            .map_err(|e| TemplateError::cache_io(artifact_path, e))?;
        let program = Arc::new(Program::from_code(&code, artifact_path)?);

        if let Some(modified) = modified {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    artifact_path.to_path_buf(),
                    LoadedProgram {
                        modified,
                        program: program.clone(),
                    },
                );
        }
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ExecutionCache for ProgramCache {
    fn invalidate(&self, artifact_path: &Path) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(artifact_path);
    }
}

/// A block override registered by an extending template.
///
/// Runs `body` against the bindings that were in scope when it was registered.
#[derive(Debug, Clone)]
pub struct DeferredBlock {
    pub body: Vec<Op>,
    pub bindings: TemplateContext,
}

/// State of one render call.
struct Renderer<'a> {
    engine: &'a Engine,
    context: TemplateContext,
    blocks: HashMap<String, DeferredBlock>,
    /// Names of overrides currently running, innermost last.
    active_blocks: Vec<String>,
    depth: usize,
    out: String,
}

impl<'a> Renderer<'a> {
    fn new(engine: &'a Engine, context: TemplateContext) -> Self {
        Self {
            engine,
            context,
            blocks: HashMap::new(),
            active_blocks: Vec::new(),
            depth: 0,
            out: String::new(),
        }
    }

    fn run(&mut self, ops: &[Op]) -> TemplateResult<()> {
        for op in ops {
            self.run_op(op)?;
        }
        Ok(())
    }

    fn run_op(&mut self, op: &Op) -> TemplateResult<()> {
        match op {
            Op::Emit { text } => self.out.push_str(text),
            Op::Echo { expr } => {
                let value = self.eval(expr)?;
                self.out.push_str(&value.render());
            }
            Op::If {
                cond,
                then,
                otherwise,
            } => {
                if self.test(cond)? {
                    self.run(then)?;
                } else {
                    self.run(otherwise)?;
                }
            }
            Op::For {
                collection,
                item,
                key,
                body,
                otherwise,
            } => self.run_loop(collection, item, key, body, otherwise)?,
            Op::Block { name, body } => self.run_block(name, body)?,
            Op::Include { template, scope } => self.include(template, scope.as_ref())?,
            Op::DefineBlocks { blocks } => self.define_blocks(blocks),
            Op::Extend { parent } => self.extend(parent)?,
        }
        Ok(())
    }

    fn run_loop(
        &mut self,
        collection: &Expr,
        item: &str,
        key: &str,
        body: &[Op],
        otherwise: &[Op],
    ) -> TemplateResult<()> {
        let entries: Vec<(TemplateValue, TemplateValue)> = match self.eval(collection)? {
            TemplateValue::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let index = i64::try_from(i).unwrap_or(i64::MAX);
                    (TemplateValue::Integer(index), v)
                })
                .collect(),
            TemplateValue::Map(map) => map
                .into_iter()
                .map(|(k, v)| (TemplateValue::String(k), v))
                .collect(),
            _ => Vec::new(),
        };

        if entries.is_empty() {
            return self.run(otherwise);
        }

        let saved_item = self.context.get(item).cloned();
        let saved_key = self.context.get(key).cloned();

        let mut result = Ok(());
        for (k, v) in entries {
            self.context.bind(item, v);
            self.context.bind(key, k);
            result = self.run(body);
            if result.is_err() {
                break;
            }
        }

        self.context.restore(item, saved_item);
        self.context.restore(key, saved_key);
        result
    }

    /// A block whose override is already running renders its own body, so an
    /// override may contain a block of the same name.
    fn run_block(&mut self, name: &str, body: &[Op]) -> TemplateResult<()> {
        if self.active_blocks.iter().any(|active| active == name) {
            return self.run(body);
        }
        let Some(block) = self.blocks.get(name).cloned() else {
            return self.run(body);
        };
        self.active_blocks.push(name.to_string());
        let result = self.run_deferred(block);
        self.active_blocks.pop();
        result
    }

    fn run_deferred(&mut self, block: DeferredBlock) -> TemplateResult<()> {
        let outer = std::mem::replace(&mut self.context, block.bindings);
        let result = self.run(&block.body);
        self.context = outer;
        result
    }

    fn define_blocks(&mut self, blocks: &[BlockUnit]) {
        for unit in blocks {
            // Registrations from more-derived templates run first and win.
            if !self.blocks.contains_key(&unit.name) {
                self.blocks.insert(
                    unit.name.clone(),
                    DeferredBlock {
                        body: unit.body.clone(),
                        bindings: self.context.clone(),
                    },
                );
            }
        }
    }

    fn enter(&mut self, name: &str) -> TemplateResult<Arc<Program>> {
        let max_depth = self.engine.config.max_include_depth;
        if self.depth >= max_depth {
            return Err(TemplateError::RecursiveInclude {
                name: name.to_string(),
                max_depth,
            });
        }
        self.engine.load(name)
    }

    fn extend(&mut self, parent: &str) -> TemplateResult<()> {
        let program = self.enter(parent)?;
        self.depth += 1;
        let result = self.run(&program.ops);
        self.depth -= 1;
        result
    }

    /// Included templates render with their own block registrations.
    fn include(&mut self, template: &str, scope: Option<&ScopedBinding>) -> TemplateResult<()> {
        let program = self.enter(template)?;

        let binding = match scope {
            Some(scope) => {
                let value = self.eval(&scope.source)?;
                let previous = self.context.bind(&scope.binding, value);
                Some((scope.binding.as_str(), previous))
            }
            None => None,
        };
        let outer_blocks = std::mem::take(&mut self.blocks);
        let outer_active = std::mem::take(&mut self.active_blocks);

        self.depth += 1;
        let result = self.run(&program.ops);
        self.depth -= 1;

        self.blocks = outer_blocks;
        self.active_blocks = outer_active;
        if let Some((name, previous)) = binding {
            self.context.restore(name, previous);
        }
        result
    }

    fn eval(&self, expr: &Expr) -> TemplateResult<TemplateValue> {
        Ok(match expr {
            Expr::Lookup { name } => self.context.get(name).cloned().unwrap_or_default(),
            Expr::Access { target, accessor } => self
                .eval(target)?
                .access(accessor)
                .cloned()
                .unwrap_or_default(),
            Expr::Filter {
                name,
                params,
                value,
            } => {
                let value = self.eval(value)?;
                self.engine.filters.apply(name, params, value)?
            }
            Expr::Escape { value } => {
                let value = self.eval(value)?;
                TemplateValue::String(self.engine.filters.escape(&value.render()))
            }
        })
    }

    fn test(&self, cond: &Condition) -> TemplateResult<bool> {
        Ok(match cond {
            Condition::Truthy { value } => self.eval(value)?.is_truthy(),
            Condition::Compare { left, op, right } => compare(&self.eval(left)?, *op, right),
        })
    }
}

/// Compare a value against a literal.
///
/// Numbers compare numerically (strings that parse as numbers included),
/// strings compare by their rendered text, booleans by truthiness and `null`
/// only equals a null value. Ordering a value against a literal of another
/// kind is false; `!=` is then true.
fn compare(left: &TemplateValue, op: Comparison, right: &Literal) -> bool {
    let ordering = match right {
        Literal::Number(n) => left.as_number().and_then(|l| l.partial_cmp(n)),
        Literal::String(s) => match left {
            TemplateValue::Null | TemplateValue::List(_) | TemplateValue::Map(_) => None,
            other => Some(other.render().as_str().cmp(s.as_str())),
        },
        Literal::Bool(b) => (left.is_truthy() == *b).then_some(Ordering::Equal),
        Literal::Null => left.is_null().then_some(Ordering::Equal),
    };
    match op {
        Comparison::Eq => ordering == Some(Ordering::Equal),
        Comparison::Ne => ordering != Some(Ordering::Equal),
        Comparison::Lt => ordering == Some(Ordering::Less),
        Comparison::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Comparison::Gt => ordering == Some(Ordering::Greater),
        Comparison::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}
