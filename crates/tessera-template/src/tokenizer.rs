/*
 * tokenizer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tokenizer: raw template source to a flat token list.
//!
//! Recognized tags:
//!
//! - `{{ name.path|filter:param }}` variables
//! - `{% command expression %}` control tags
//! - `{# ... #}` comments, which are dropped

use crate::error::{TemplateError, TemplateResult};
use crate::token::{
    Command, Control, ControlMetadata, FilterCall, IncludeScope, Token, Variable, is_identifier,
    parse_path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Variable,
    Control,
    Comment,
}

impl TagKind {
    const ALL: [TagKind; 3] = [TagKind::Variable, TagKind::Control, TagKind::Comment];

    fn open(self) -> &'static str {
        match self {
            TagKind::Variable => "{{",
            TagKind::Control => "{%",
            TagKind::Comment => "{#",
        }
    }

    fn close(self) -> &'static str {
        match self {
            TagKind::Variable => "}}",
            TagKind::Control => "%}",
            TagKind::Comment => "#}",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            TagKind::Variable => "variable",
            TagKind::Control => "control",
            TagKind::Comment => "comment",
        }
    }
}

/// Scan template source into `Text`, `Variable` and flat `Control` tokens.
pub fn tokenize(source: &str) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    let mut markers = MarkerCursor::new(source);
    let mut lines = LineCounter::default();

    while offset < source.len() {
        let Some((start, kind)) = markers.next_from(offset) else {
            tokens.push(Token::text(&source[offset..]));
            break;
        };

        if start > offset {
            tokens.push(Token::text(&source[offset..start]));
        }

        let line = lines.line_at(source, start);
        let inner_start = start + kind.open().len();
        let Some(len) = source[inner_start..].find(kind.close()) else {
            return Err(TemplateError::syntax(format!(
                "unterminated {} tag starting at line {}",
                kind.describe(),
                line
            )));
        };
        let inner = source[inner_start..inner_start + len].trim();

        match kind {
            TagKind::Variable => tokens.push(Token::Variable(parse_variable(inner, line)?)),
            TagKind::Control => tokens.push(Token::Control(parse_control(inner, line)?)),
            TagKind::Comment => {}
        }

        offset = inner_start + len + kind.close().len();
    }

    Ok(tokens)
}

/// Next known position of each opening marker.
///
/// A cached position at or past the cursor is still the earliest occurrence,
/// so each marker kind is searched again only once the cursor passes it.
/// `None` means the marker does not occur in the rest of the source.
struct MarkerCursor<'a> {
    source: &'a str,
    next: [Option<usize>; 3],
}

impl<'a> MarkerCursor<'a> {
    fn new(source: &'a str) -> Self {
        let mut next = [None; 3];
        for (slot, kind) in next.iter_mut().zip(TagKind::ALL) {
            *slot = source.find(kind.open());
        }
        Self { source, next }
    }

    /// Earliest opening marker at or after `offset`, of any kind.
    fn next_from(&mut self, offset: usize) -> Option<(usize, TagKind)> {
        let mut earliest: Option<(usize, TagKind)> = None;
        for (slot, kind) in self.next.iter_mut().zip(TagKind::ALL) {
            if let Some(pos) = *slot
                && pos < offset
            {
                *slot = self.source[offset..].find(kind.open()).map(|p| offset + p);
            }
            if let Some(pos) = *slot
                && earliest.is_none_or(|(best, _)| pos < best)
            {
                earliest = Some((pos, kind));
            }
        }
        earliest
    }
}

/// Line numbers for increasing offsets, counting each byte once.
#[derive(Default)]
struct LineCounter {
    offset: usize,
    line: usize,
}

impl LineCounter {
    fn line_at(&mut self, source: &str, offset: usize) -> usize {
        self.line += source[self.offset..offset].matches('\n').count();
        self.offset = offset;
        self.line + 1
    }
}

/// Parse the body of a `{{ ... }}` tag.
fn parse_variable(inner: &str, line: usize) -> TemplateResult<Variable> {
    let mut parts = inner.split('|');
    let expression = parts.next().unwrap_or("").trim();
    if expression.is_empty() {
        return Err(TemplateError::syntax(format!(
            "empty variable tag at line {}",
            line
        )));
    }
    let (name, path) = parse_path(expression).ok_or_else(|| {
        TemplateError::syntax(format!(
            "invalid variable expression '{}' at line {}",
            expression, line
        ))
    })?;

    let mut filters = Vec::new();
    for part in parts {
        let mut segments = part.split(':');
        let filter_name = segments.next().unwrap_or("").trim();
        if filter_name.is_empty() {
            return Err(TemplateError::syntax(format!(
                "empty filter in '{}' at line {}",
                inner, line
            )));
        }
        let parameters = segments.map(|p| unquote(p.trim()).to_string()).collect();
        filters.push(FilterCall::new(filter_name, parameters));
    }

    let escape = !filters.iter().any(|f| f.name == "raw");
    Ok(Variable {
        name,
        path,
        filters,
        escape,
    })
}

/// Parse the body of a `{% ... %}` tag.
fn parse_control(inner: &str, line: usize) -> TemplateResult<Control> {
    let (word, expression) = match inner.split_once(char::is_whitespace) {
        Some((word, expression)) => (word, expression.trim()),
        None => (inner, ""),
    };
    if word.is_empty() {
        return Err(TemplateError::syntax(format!(
            "empty control tag at line {}",
            line
        )));
    }

    let command = Command::from_word(word);
    let metadata = match command {
        Command::Extends => ControlMetadata::Extends {
            parent: template_name(expression, "extends", line)?,
        },
        Command::Include => parse_include(expression, line)?,
        _ => ControlMetadata::None,
    };

    let mut control = Control::new(command, expression);
    control.metadata = metadata;
    Ok(control)
}

/// `"name"` or `"name" with source.path as binding`
fn parse_include(expression: &str, line: usize) -> TemplateResult<ControlMetadata> {
    let (name_part, scope_part) = split_keyword(expression, "with");
    let template = template_name(name_part, "include", line)?;

    let scope = match scope_part {
        None => None,
        Some(scope) => {
            let (source, binding) = split_keyword(scope, "as");
            let binding = binding.map_or("", str::trim);
            let source = source.trim();
            if parse_path(source).is_none() || !is_identifier(binding) {
                return Err(TemplateError::syntax(format!(
                    "malformed scoped include '{}' at line {} (expected `\"name\" with path as var`)",
                    expression, line
                )));
            }
            Some(IncludeScope {
                source: source.to_string(),
                binding: binding.to_string(),
            })
        }
    };

    Ok(ControlMetadata::Include { template, scope })
}

/// Split `"a" with b` at the first standalone `keyword`, outside quotes.
fn split_keyword<'a>(expression: &'a str, keyword: &str) -> (&'a str, Option<&'a str>) {
    let mut quote = None;
    for (i, c) in expression.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {
                let rest = &expression[i..];
                let Some(after) = rest.strip_prefix(keyword) else {
                    continue;
                };
                let before_ok = expression[..i]
                    .chars()
                    .next_back()
                    .is_some_and(char::is_whitespace);
                if before_ok && after.starts_with(char::is_whitespace) {
                    return (&expression[..i], Some(after));
                }
            }
        }
    }
    (expression, None)
}

fn template_name(raw: &str, command: &str, line: usize) -> TemplateResult<String> {
    let name = unquote(raw.trim()).trim();
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(TemplateError::syntax(format!(
            "`{}` requires a single template name at line {}",
            command, line
        )));
    }
    Ok(name.to_string())
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
