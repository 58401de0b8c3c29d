// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Access mode of a binding, derived from the `readonly` parameter.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::option_policy::OptionPolicy;
use super::option_value::RawOptions;
use super::options_merger::OptionSet;

/// Parameter callers use to request a read-only mount.
pub const READONLY_KEY: &str = "readonly";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("Invalid ro parameter value: {0}")]
    InvalidReadOnly(String),
}

/// Volume access mode as carried in the binding response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    #[default]
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "r")]
    ReadOnly,
}

impl AccessMode {
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Protocol token: `rw` or `r`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadWrite => "rw",
            Self::ReadOnly => "r",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode requested by the combined raw parameters. Only a genuine JSON
/// boolean is accepted for `readonly`.
pub fn evaluate(parameters: &RawOptions) -> Result<AccessMode, ModeError> {
    match parameters.get(READONLY_KEY) {
        None => Ok(AccessMode::ReadWrite),
        Some(value) => value
            .as_bool()
            .map(AccessMode::from_read_only)
            .ok_or_else(|| ModeError::InvalidReadOnly(value.raw_display())),
    }
}

/// Record a read-only mode in the mount configuration. The mount driver
/// only sees the configuration, not the binding mode.
pub fn apply_read_only_marker(config: &mut OptionSet, mode: AccessMode, policy: &OptionPolicy) {
    if mode == AccessMode::ReadOnly {
        config.insert(policy.alias_for(READONLY_KEY).to_string(), "true".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::option_value::OptionValue;

    fn params(value: Option<OptionValue>) -> RawOptions {
        let mut raw = RawOptions::new();
        raw.insert("uid".to_string(), OptionValue::text("1000"));
        if let Some(value) = value {
            raw.insert(READONLY_KEY.to_string(), value);
        }
        raw
    }

    #[test]
    fn test_absent_readonly_defaults_to_read_write() {
        assert_eq!(evaluate(&params(None)).unwrap(), AccessMode::ReadWrite);
        assert_eq!(AccessMode::default(), AccessMode::ReadWrite);
    }

    #[test]
    fn test_boolean_readonly_selects_mode() {
        assert_eq!(evaluate(&params(Some(true.into()))).unwrap(), AccessMode::ReadOnly);
        assert_eq!(evaluate(&params(Some(false.into()))).unwrap(), AccessMode::ReadWrite);
    }

    #[test]
    fn test_non_boolean_readonly_is_rejected_with_raw_value() {
        let err = evaluate(&params(Some(OptionValue::text("")))).unwrap_err();
        assert_eq!(err.to_string(), r#"Invalid ro parameter value: """#);

        let err = evaluate(&params(Some(OptionValue::text("true")))).unwrap_err();
        assert_eq!(err.to_string(), r#"Invalid ro parameter value: "true""#);

        let err = evaluate(&params(Some(OptionValue::Integer(1)))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid ro parameter value: 1");
    }

    #[test]
    fn test_marker_uses_alias_when_declared() {
        let aliased = OptionPolicy::builder().alias("readonly", "ro").build();
        let mut config = OptionSet::new();
        apply_read_only_marker(&mut config, AccessMode::ReadOnly, &aliased);
        assert_eq!(config.get("ro").map(String::as_str), Some("true"));

        let plain = OptionPolicy::default();
        let mut config = OptionSet::new();
        apply_read_only_marker(&mut config, AccessMode::ReadOnly, &plain);
        assert_eq!(config.get("readonly").map(String::as_str), Some("true"));

        let mut config = OptionSet::new();
        apply_read_only_marker(&mut config, AccessMode::ReadWrite, &plain);
        assert!(config.is_empty());
    }

    #[test]
    fn test_mode_tokens() {
        assert_eq!(AccessMode::ReadOnly.to_string(), "r");
        assert_eq!(serde_json::to_string(&AccessMode::ReadWrite).unwrap(), "\"rw\"");
    }
}
