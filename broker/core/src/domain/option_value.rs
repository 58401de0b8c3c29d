// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Option Values
//!
//! Caller-supplied mount options arrive as arbitrary JSON. They are captured as
//! an [`OptionValue`] and reduced to one canonical string per key before they
//! can reach a mount configuration.
//!
//! | JSON | Canonical form |
//! |------|----------------|
//! | `"abc"` | `abc` |
//! | `12` / `1.5` | `12` / `1.5` |
//! | `true` | `true`, or `1` for integer-flag keys |
//! | `null`, `[]`, `{}` | empty (treated as absent) |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keys whose boolean values the mount drivers expect as `1`/`0`.
pub const BOOLEAN_AS_INTEGER_KEYS: &[&str] = &["auto-traverse-mounts", "dircache"];

/// Raw option mapping as persisted in a fingerprint or sent at bind time.
pub type RawOptions = BTreeMap<String, OptionValue>;

/// A single JSON-derived option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// null, arrays and objects. Kept so the raw payload round-trips, never
    /// emitted as an option.
    Structured(serde_json::Value),
}

impl OptionValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw JSON rendering, used in error messages (`""` for an empty string).
    pub fn raw_display(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&normalize_with(self, false))
    }
}

/// Canonical string for `value` under `key`.
pub fn normalize(key: &str, value: &OptionValue) -> String {
    normalize_with(value, BOOLEAN_AS_INTEGER_KEYS.contains(&key))
}

/// Canonical string for `value`; booleans render as `1`/`0` when
/// `boolean_as_integer` is set.
pub fn normalize_with(value: &OptionValue, boolean_as_integer: bool) -> String {
    match value {
        OptionValue::Boolean(b) if boolean_as_integer => (if *b { "1" } else { "0" }).to_string(),
        OptionValue::Boolean(b) => b.to_string(),
        OptionValue::Integer(i) => i.to_string(),
        OptionValue::Float(f) => f.to_string(),
        OptionValue::Text(s) => s.clone(),
        OptionValue::Structured(_) => String::new(),
    }
}

/// Boolean parsing with the spellings operators use in flag strings.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
