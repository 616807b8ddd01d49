/*
 * program.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled rendering programs.
//!
//! A [`Program`] is the executable form of a template: a tree of output
//! instructions over lookup expressions. Its text form (JSON) is what the
//! artifact cache persists; executing it is the renderer's job.

use crate::error::{TemplateError, TemplateResult};
use crate::token::Accessor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An executable template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Source template this program was compiled from.
    pub template_path: PathBuf,
    /// Compilation time, milliseconds since the Unix epoch.
    pub compiled_at: u64,
    /// Parent template name for extending templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// The template itself plus every `extends`/`include` target.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    pub ops: Vec<Op>,
}

/// A rendering instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Write literal text.
    Emit { text: String },

    /// Evaluate an expression and write its string form.
    Echo { expr: Expr },

    If {
        cond: Condition,
        then: Vec<Op>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        otherwise: Vec<Op>,
    },

    /// Iterate a collection binding `item` and `key`; `otherwise` runs when
    /// there is nothing to iterate.
    For {
        collection: Expr,
        item: String,
        key: String,
        body: Vec<Op>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        otherwise: Vec<Op>,
    },

    /// Run a registered override for `name`, or `body` when there is none.
    ///
    /// An override renders against the bindings captured when the child
    /// registered it, not the bindings at this point in the parent. Loop
    /// items and scoped-include variables bound around the block in the
    /// parent are therefore not visible to the override; `body` does see
    /// them. Inside a running override, a nested block of the same name
    /// renders its own `body`.
    Block { name: String, body: Vec<Op> },

    /// Render another template in the current context.
    Include {
        template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<ScopedBinding>,
    },

    /// Register deferred block overrides ahead of the parent.
    DefineBlocks { blocks: Vec<BlockUnit> },

    /// Render the parent template.
    Extend { parent: String },
}

/// Value bound to a name for the duration of a scoped include.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedBinding {
    pub source: Expr,
    pub binding: String,
}

/// A named block body registered by an extending template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockUnit {
    pub name: String,
    pub body: Vec<Op>,
}

/// A value expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    /// Binding lookup by name.
    Lookup { name: String },
    /// Property or index access; null when the target has no such member.
    Access { target: Box<Expr>, accessor: Accessor },
    /// Filter application.
    Filter {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<String>,
        value: Box<Expr>,
    },
    /// Output escaping.
    Escape { value: Box<Expr> },
}

/// A branch condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cond", rename_all = "snake_case")]
pub enum Condition {
    /// Non-empty test.
    Truthy { value: Expr },
    /// `left <op> literal`
    Compare {
        left: Expr,
        op: Comparison,
        right: Literal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    /// Operators in match order (two-character operators first).
    pub const ALL: [(&'static str, Comparison); 6] = [
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl Expr {
    pub fn lookup(name: impl Into<String>) -> Self {
        Expr::Lookup { name: name.into() }
    }

    /// `name` followed by each accessor in order.
    pub fn path(name: &str, path: &[Accessor]) -> Self {
        path.iter().fold(Expr::lookup(name), |target, accessor| Expr::Access {
            target: Box::new(target),
            accessor: accessor.clone(),
        })
    }
}

impl Program {
    /// The persisted text form of this program.
    pub fn to_code(&self) -> TemplateResult<String> {
        serde_json::to_string(self).map_err(|e| TemplateError::InvalidArtifact {
            path: self.template_path.clone(),
            message: e.to_string(),
        })
    }

    /// Decode program text read from `artifact_path`.
    pub fn from_code(code: &str, artifact_path: &Path) -> TemplateResult<Self> {
        serde_json::from_str(code).map_err(|e| TemplateError::InvalidArtifact {
            path: artifact_path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_path_builds_access_chain() {
        let expr = Expr::path("a", &[Accessor::Key("b".to_string()), Accessor::Index(2)]);
        assert_eq!(
            expr,
            Expr::Access {
                target: Box::new(Expr::Access {
                    target: Box::new(Expr::lookup("a")),
                    accessor: Accessor::Key("b".to_string()),
                }),
                accessor: Accessor::Index(2),
            }
        );
    }

    #[test]
    fn test_code_round_trip_keeps_literal_bytes() {
        let text = "line \"one\"\n\t<tag attr='x'> \\ {{ not a tag }} é ✓";
        let program = Program {
            template_path: PathBuf::from("/t/a.html"),
            compiled_at: 42,
            parent: None,
            dependencies: vec![PathBuf::from("/t/a.html")],
            ops: vec![
                Op::Emit {
                    text: text.to_string(),
                },
                Op::If {
                    cond: Condition::Compare {
                        left: Expr::lookup("n"),
                        op: Comparison::Ge,
                        right: Literal::Number(3.0),
                    },
                    then: vec![],
                    otherwise: vec![],
                },
            ],
        };
        let code = program.to_code().unwrap();
        let decoded = Program::from_code(&code, Path::new("/cache/a.json")).unwrap();
        assert_eq!(decoded, program);
        match &decoded.ops[0] {
            Op::Emit { text: decoded_text } => assert_eq!(decoded_text, text),
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_bad_code_names_artifact() {
        let err = Program::from_code("{", Path::new("/cache/x.json")).unwrap_err();
        assert!(err.to_string().contains("/cache/x.json"));
    }
}
