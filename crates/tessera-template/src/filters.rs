/*
 * filters.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output filters (`{{ name|upper }}`, `{{ items|join:", " }}`).
//!
//! Filters are looked up by name at render time through a [`FilterSet`].
//! [`StandardFilters`] provides the built-in set.

use crate::context::TemplateValue;
use crate::error::{TemplateError, TemplateResult};

/// Trait for applying named filters to values and escaping output.
pub trait FilterSet: Send + Sync {
    /// Apply filter `name` with `params` to `value`.
    ///
    /// Returns [`TemplateError::UnknownFilter`] for names the set does not know.
    fn apply(
        &self,
        name: &str,
        params: &[String],
        value: TemplateValue,
    ) -> TemplateResult<TemplateValue>;

    /// Escape text for output; used for every variable without `raw`.
    fn escape(&self, text: &str) -> String {
        escape_html(text)
    }
}

/// The built-in filters.
///
/// | filter | effect |
/// |---|---|
/// | `raw` | disables output escaping (handled by the compiler; identity here) |
/// | `escape`, `e` | HTML-escape |
/// | `upper`, `lower`, `capitalize`, `trim` | string case and whitespace |
/// | `length` | characters of a string, items of a list or map |
/// | `join[:sep]` | join list items |
/// | `default:fallback` | fallback for falsy values |
/// | `truncate:n[:suffix]` | keep the first `n` characters |
/// | `replace:from:to` | substring replacement |
/// | `first`, `last` | list ends, or string characters |
/// | `json` | JSON encoding |
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFilters;

impl FilterSet for StandardFilters {
    fn apply(
        &self,
        name: &str,
        params: &[String],
        value: TemplateValue,
    ) -> TemplateResult<TemplateValue> {
        let value = match name {
            "raw" => value,
            "escape" | "e" => TemplateValue::String(escape_html(&value.render())),
            "upper" => TemplateValue::String(value.render().to_uppercase()),
            "lower" => TemplateValue::String(value.render().to_lowercase()),
            "capitalize" => TemplateValue::String(capitalize(&value.render())),
            "trim" => TemplateValue::String(value.render().trim().to_string()),
            "length" => TemplateValue::Integer(length(&value)),
            "join" => {
                let separator = params.first().map_or("", String::as_str);
                join(value, separator)
            }
            "default" => {
                let fallback = required(name, params, 0, "a fallback value")?;
                if value.is_truthy() {
                    value
                } else {
                    TemplateValue::String(fallback.to_string())
                }
            }
            "truncate" => {
                let limit = required(name, params, 0, "a length")?;
                let limit: usize = limit.parse().map_err(|_| TemplateError::InvalidFilterArgs {
                    filter: name.to_string(),
                    message: format!("length must be a non-negative integer, got '{}'", limit),
                })?;
                let suffix = params.get(1).map_or("", String::as_str);
                TemplateValue::String(truncate(&value.render(), limit, suffix))
            }
            "replace" => {
                let from = required(name, params, 0, "a search string")?;
                let to = required(name, params, 1, "a replacement string")?;
                if from.is_empty() {
                    return Err(TemplateError::InvalidFilterArgs {
                        filter: name.to_string(),
                        message: "search string must not be empty".to_string(),
                    });
                }
                TemplateValue::String(value.render().replace(from, to))
            }
            "first" => ends(value, true),
            "last" => ends(value, false),
            "json" => TemplateValue::String(value.to_json().to_string()),
            _ => {
                return Err(TemplateError::UnknownFilter {
                    name: name.to_string(),
                });
            }
        };
        Ok(value)
    }
}

fn required<'a>(
    filter: &str,
    params: &'a [String],
    index: usize,
    what: &str,
) -> TemplateResult<&'a str> {
    params
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| TemplateError::InvalidFilterArgs {
            filter: filter.to_string(),
            message: format!("expected {} as parameter {}", what, index + 1),
        })
}

/// Escape `& < > " '` for HTML output.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn length(value: &TemplateValue) -> i64 {
    let len = match value {
        TemplateValue::List(items) => items.len(),
        TemplateValue::Map(m) => m.len(),
        TemplateValue::Null => 0,
        other => other.render().chars().count(),
    };
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn join(value: TemplateValue, separator: &str) -> TemplateValue {
    match value {
        TemplateValue::List(items) => TemplateValue::String(
            items
                .iter()
                .map(|v| v.render())
                .collect::<Vec<_>>()
                .join(separator),
        ),
        TemplateValue::Map(m) => TemplateValue::String(
            m.values()
                .map(|v| v.render())
                .collect::<Vec<_>>()
                .join(separator),
        ),
        other => other,
    }
}

fn truncate(text: &str, limit: usize, suffix: &str) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str(suffix);
    out
}

fn ends(value: TemplateValue, first: bool) -> TemplateValue {
    match value {
        TemplateValue::List(mut items) => {
            let item = if first {
                (!items.is_empty()).then(|| items.swap_remove(0))
            } else {
                items.pop()
            };
            item.unwrap_or(TemplateValue::Null)
        }
        TemplateValue::Null => TemplateValue::Null,
        other => {
            let text = other.render();
            let c = if first {
                text.chars().next()
            } else {
                text.chars().next_back()
            };
            c.map_or(TemplateValue::Null, |c| TemplateValue::String(c.to_string()))
        }
    }
}
