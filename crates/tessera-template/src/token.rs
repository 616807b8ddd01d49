/*
 * token.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template token types.
//!
//! The tokenizer produces a flat list of [`Token`]s; the structurer nests the
//! `if`/`for`/`block` constructs into their `children`. Tokens serialize to
//! JSON (internally tagged) and can be written back to template syntax.

use crate::error::{TemplateError, TemplateResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lexical unit of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    /// Literal output content.
    Text(Text),

    /// Value interpolation: `{{ user.name|upper }}`
    Variable(Variable),

    /// Control tag: `{% if ... %}`, `{% include "x" %}`, ...
    Control(Control),
}

/// Literal text token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub content: String,
}

/// A variable lookup followed by accessors and filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Base binding name.
    pub name: String,
    /// Property/index accessors applied in order.
    #[serde(default)]
    pub path: Vec<Accessor>,
    /// Filters applied in declared order.
    #[serde(default)]
    pub filters: Vec<FilterCall>,
    /// `false` iff a `raw` filter appears anywhere in the chain.
    pub escape: bool,
}

/// A single accessor step: `.name` or `.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Accessor {
    Index(i64),
    Key(String),
}

/// A filter application: `name:param1:param2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Control tag commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    If,
    Else,
    Endif,
    For,
    Endfor,
    Block,
    Endblock,
    Extends,
    Include,
    /// A command word this template language does not define.
    #[serde(untagged)]
    Other(String),
}

/// A control tag, possibly holding a nested body after structuring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub command: Command,
    /// Everything after the command word, trimmed.
    pub expression: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Token>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub else_children: Vec<Token>,
    #[serde(default, skip_serializing_if = "ControlMetadata::is_none")]
    pub metadata: ControlMetadata,
}

/// Arguments resolved at tokenization time for `extends` and `include`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMetadata {
    #[default]
    None,
    Extends {
        parent: String,
    },
    Include {
        template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<IncludeScope>,
    },
}

/// Scoped include: `{% include "card" with user.profile as profile %}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeScope {
    /// Accessor chain evaluated in the including template's context.
    pub source: String,
    /// Name the resolved value is bound to inside the included template.
    pub binding: String,
}

impl ControlMetadata {
    pub fn is_none(&self) -> bool {
        matches!(self, ControlMetadata::None)
    }
}

impl Command {
    /// Map a command word to its command.
    pub fn from_word(word: &str) -> Self {
        match word {
            "if" => Command::If,
            "else" => Command::Else,
            "endif" => Command::Endif,
            "for" => Command::For,
            "endfor" => Command::Endfor,
            "block" => Command::Block,
            "endblock" => Command::Endblock,
            "extends" => Command::Extends,
            "include" => Command::Include,
            other => Command::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::If => "if",
            Command::Else => "else",
            Command::Endif => "endif",
            Command::For => "for",
            Command::Endfor => "endfor",
            Command::Block => "block",
            Command::Endblock => "endblock",
            Command::Extends => "extends",
            Command::Include => "include",
            Command::Other(word) => word,
        }
    }

    /// Commands that open a nested body.
    pub fn opens_body(&self) -> bool {
        matches!(self, Command::If | Command::For | Command::Block)
    }

    /// The closing command matching an opening one.
    pub fn closer(&self) -> Option<Command> {
        match self {
            Command::If => Some(Command::Endif),
            Command::For => Some(Command::Endfor),
            Command::Block => Some(Command::Endblock),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Token {
    /// Create a text token.
    pub fn text(content: impl Into<String>) -> Self {
        Token::Text(Text {
            content: content.into(),
        })
    }

    /// Create a flat control token with no metadata.
    pub fn control(command: Command, expression: impl Into<String>) -> Self {
        Token::Control(Control::new(command, expression))
    }

    /// Human-readable kind, used in error messages.
    pub fn kind(&self) -> String {
        match self {
            Token::Text(_) => "text".to_string(),
            Token::Variable(_) => "variable".to_string(),
            Token::Control(control) => format!("control `{}`", control.command),
        }
    }

    /// Write this token back in template syntax.
    pub fn write_source(&self, out: &mut String) {
        match self {
            Token::Text(text) => out.push_str(&text.content),
            Token::Variable(var) => {
                out.push_str("{{ ");
                out.push_str(&var.expression_source());
                out.push_str(" }}");
            }
            Token::Control(control) => {
                write_tag(out, control.command.as_str(), &control.expression);
                if let Some(closer) = control.command.closer() {
                    for child in &control.children {
                        child.write_source(out);
                    }
                    if !control.else_children.is_empty() {
                        write_tag(out, "else", "");
                        for child in &control.else_children {
                            child.write_source(out);
                        }
                    }
                    write_tag(out, closer.as_str(), "");
                }
            }
        }
    }
}

fn write_tag(out: &mut String, command: &str, expression: &str) {
    out.push_str("{% ");
    out.push_str(command);
    if !expression.is_empty() {
        out.push(' ');
        out.push_str(expression);
    }
    out.push_str(" %}");
}

impl Control {
    pub fn new(command: Command, expression: impl Into<String>) -> Self {
        Self {
            command,
            expression: expression.into(),
            children: Vec::new(),
            else_children: Vec::new(),
            metadata: ControlMetadata::None,
        }
    }

    /// The opening tag alone: `{% command expression %}`.
    pub fn tag_source(&self) -> String {
        let mut out = String::new();
        write_tag(&mut out, self.command.as_str(), &self.expression);
        out
    }

    /// A copy of this tag without its nested body.
    pub fn flat(&self) -> Self {
        Self {
            command: self.command.clone(),
            expression: self.expression.clone(),
            children: Vec::new(),
            else_children: Vec::new(),
            metadata: self.metadata.clone(),
        }
    }
}

impl Variable {
    /// Create a variable with no accessors or filters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
            filters: Vec::new(),
            escape: true,
        }
    }

    /// The tag body: `name.a.0|filter:p`.
    pub fn expression_source(&self) -> String {
        let mut out = path_source(&self.name, &self.path);
        for filter in &self.filters {
            out.push('|');
            out.push_str(&filter.name);
            for param in &filter.parameters {
                out.push(':');
                if param.is_empty() || param.chars().any(|c| c.is_whitespace()) {
                    out.push('"');
                    out.push_str(param);
                    out.push('"');
                } else {
                    out.push_str(param);
                }
            }
        }
        out
    }
}

impl FilterCall {
    pub fn new(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

impl Accessor {
    /// Digits-only segments become indices, everything else a key.
    pub fn parse(segment: &str) -> Self {
        if !segment.is_empty()
            && segment.bytes().all(|b| b.is_ascii_digit())
            && let Ok(index) = segment.parse::<i64>()
        {
            return Accessor::Index(index);
        }
        Accessor::Key(segment.to_string())
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Index(i) => write!(f, "{}", i),
            Accessor::Key(k) => f.write_str(k),
        }
    }
}

/// Check whether `s` is a binding identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse an accessor chain `name(.segment)*`.
///
/// Returns `None` when the base is not an identifier or a segment is empty
/// or contains characters other than identifier characters.
pub fn parse_path(expr: &str) -> Option<(String, Vec<Accessor>)> {
    let mut segments = expr.split('.');
    let name = segments.next()?.trim();
    if !is_identifier(name) {
        return None;
    }
    let mut path = Vec::new();
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return None;
        }
        path.push(Accessor::parse(segment));
    }
    Some((name.to_string(), path))
}

/// Inverse of [`parse_path`].
pub fn path_source(name: &str, path: &[Accessor]) -> String {
    let mut out = name.to_string();
    for accessor in path {
        out.push('.');
        out.push_str(&accessor.to_string());
    }
    out
}

/// Write a token list back in template syntax.
pub fn tokens_to_source(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        token.write_source(&mut out);
    }
    out
}

/// Serialize tokens to JSON.
pub fn tokens_to_json(tokens: &[Token]) -> TemplateResult<String> {
    serde_json::to_string_pretty(tokens).map_err(|e| TemplateError::Syntax {
        message: format!("cannot serialize tokens: {}", e),
    })
}

/// Deserialize tokens from JSON produced by [`tokens_to_json`].
pub fn tokens_from_json(json: &str) -> TemplateResult<Vec<Token>> {
    serde_json::from_str(json).map_err(|e| TemplateError::Syntax {
        message: format!("invalid token JSON: {}", e),
    })
}
