/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template value and context types.
//!
//! This module defines the values templates are rendered against and the
//! binding store (name → value) that loops and scoped includes push into.

use crate::token::Accessor;
use indexmap::IndexMap;
use std::collections::HashMap;

/// A value that can be used in template evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TemplateValue {
    /// A string value.
    String(String),

    /// An integer value.
    Integer(i64),

    /// A floating point value.
    Float(f64),

    /// A boolean value.
    Bool(bool),

    /// A list of values.
    List(Vec<TemplateValue>),

    /// A map of string keys to values, in insertion order.
    Map(IndexMap<String, TemplateValue>),

    /// A null/missing value.
    #[default]
    Null,
}

impl TemplateValue {
    /// Check if this value is "truthy" for conditional evaluation.
    ///
    /// Falsy values: null, `""`, `"0"`, `0`, `0.0`, `false`, empty lists and
    /// empty maps. Everything else is truthy (including the string `"false"`).
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Bool(b) => *b,
            TemplateValue::String(s) => !(s.is_empty() || s == "0"),
            TemplateValue::Integer(i) => *i != 0,
            TemplateValue::Float(f) => *f != 0.0,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(m) => !m.is_empty(),
            TemplateValue::Null => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TemplateValue::Null)
    }

    /// Apply one accessor step.
    ///
    /// Keys index maps, indices index lists; numeric keys also index lists
    /// and indices also look up stringified map keys. Anything else misses.
    pub fn access(&self, accessor: &Accessor) -> Option<&TemplateValue> {
        match (self, accessor) {
            (TemplateValue::Map(m), Accessor::Key(key)) => m.get(key),
            (TemplateValue::Map(m), Accessor::Index(i)) => m.get(&i.to_string()),
            (TemplateValue::List(items), Accessor::Index(i)) => {
                usize::try_from(*i).ok().and_then(|i| items.get(i))
            }
            (TemplateValue::List(items), Accessor::Key(key)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        }
    }

    /// Get a nested value by accessor path.
    pub fn get_path(&self, path: &[Accessor]) -> Option<&TemplateValue> {
        path.iter().try_fold(self, |value, accessor| value.access(accessor))
    }

    /// Render this value as a string for output.
    ///
    /// - String: returned as-is
    /// - Integer/Float: decimal form (`3.0` renders as `3`)
    /// - Bool: "true" or "" (empty for false)
    /// - List: concatenation of rendered elements
    /// - Map: "true"
    /// - Null: ""
    pub fn render(&self) -> String {
        match self {
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Integer(i) => i.to_string(),
            TemplateValue::Float(f) => f.to_string(),
            TemplateValue::Bool(true) => "true".to_string(),
            TemplateValue::Bool(false) => String::new(),
            TemplateValue::List(items) => items.iter().map(|v| v.render()).collect(),
            TemplateValue::Map(_) => "true".to_string(),
            TemplateValue::Null => String::new(),
        }
    }

    /// Numeric view used by comparisons.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TemplateValue::Integer(i) => Some(*i as f64),
            TemplateValue::Float(f) => Some(*f),
            TemplateValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to JSON (used by the `json` filter).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TemplateValue::String(s) => serde_json::Value::String(s.clone()),
            TemplateValue::Integer(i) => serde_json::Value::from(*i),
            TemplateValue::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            TemplateValue::Bool(b) => serde_json::Value::Bool(*b),
            TemplateValue::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            TemplateValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            TemplateValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<serde_json::Value> for TemplateValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => TemplateValue::Integer(i),
                None => TemplateValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => TemplateValue::String(s),
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.into_iter().map(TemplateValue::from).collect())
            }
            serde_json::Value::Object(map) => TemplateValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, TemplateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::String(s)
    }
}

impl From<i64> for TemplateValue {
    fn from(i: i64) -> Self {
        TemplateValue::Integer(i)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(items: Vec<T>) -> Self {
        TemplateValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Variable bindings a template is rendered against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    variables: HashMap<String, TemplateValue>,
}

impl TemplateContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object; other JSON values give an empty context.
    pub fn from_json(value: serde_json::Value) -> Self {
        let mut ctx = Self::new();
        if let serde_json::Value::Object(map) = value {
            for (key, value) in map {
                ctx.insert(key, TemplateValue::from(value));
            }
        }
        ctx
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TemplateValue>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Get a variable from the context.
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        self.variables.get(key)
    }

    /// Remove a variable, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<TemplateValue> {
        self.variables.remove(key)
    }

    /// Get a variable followed by an accessor path (e.g. `employee.salary`).
    pub fn get_path(&self, name: &str, path: &[Accessor]) -> Option<&TemplateValue> {
        self.get(name).and_then(|v| v.get_path(path))
    }

    /// Bind `key` for a nested scope, returning the value it shadows.
    ///
    /// Pass the returned value to [`restore`](Self::restore) when the scope ends.
    pub fn bind(&mut self, key: &str, value: TemplateValue) -> Option<TemplateValue> {
        self.variables.insert(key.to_string(), value)
    }

    /// End a scope opened with [`bind`](Self::bind).
    pub fn restore(&mut self, key: &str, previous: Option<TemplateValue>) {
        match previous {
            Some(value) => {
                self.variables.insert(key.to_string(), value);
            }
            None => {
                self.variables.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
