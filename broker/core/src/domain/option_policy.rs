// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Option Policy
//!
//! Operator-declared rules for which mount options callers may set.
//!
//! A policy is built once at broker start from configuration and shared
//! read-only by every bind. Merges never mutate it, so concurrent binds need
//! no copying or locking.
//!
//! ## Key classes
//!
//! | Class | Source | Caller may override |
//! |-------|--------|---------------------|
//! | allowed | `allowed` list | yes |
//! | default | operator default for an allowed key | yes |
//! | forced | operator default for any other key | no |
//! | ignored | chosen per call by the broker | handled outside the merge |
//!
//! The special `sloppy_mount` key never reaches a mount configuration. As an
//! operator default for a non-allowed key it locks the sloppy flag; as an
//! allowed key it lets callers choose tolerance per bind.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::option_value::parse_bool;

/// Escape-hatch key that turns disallowed options into silent drops.
pub const SLOPPY_MOUNT_KEY: &str = "sloppy_mount";

/// Identity key holding the share locator.
pub const SHARE_KEY: &str = "share";

/// Immutable mount-option policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPolicy {
    allowed: BTreeSet<String>,
    defaults: BTreeMap<String, String>,
    forced: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    sloppy: bool,
    sloppy_forced: bool,
    immutable_at_bind: BTreeSet<String>,
}

impl Default for OptionPolicy {
    fn default() -> Self {
        OptionPolicyBuilder::default().build()
    }
}

impl OptionPolicy {
    pub fn builder() -> OptionPolicyBuilder {
        OptionPolicyBuilder::default()
    }

    /// Build a policy from the operator's flag strings: a comma separated
    /// allow list and `key:value` comma separated defaults.
    pub fn from_flags(allowed: &str, defaults: &str) -> Self {
        let mut builder = Self::builder();
        if !allowed.is_empty() {
            builder = builder.allow(allowed.split(','));
        }
        for (key, value) in parse_default_entries(defaults) {
            builder = builder.default_option(key, value);
        }
        builder.build()
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    pub fn forced(&self) -> &BTreeMap<String, String> {
        &self.forced
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn immutable_at_bind(&self) -> &BTreeSet<String> {
        &self.immutable_at_bind
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.allowed.contains(key)
    }

    pub fn is_immutable_at_bind(&self, key: &str) -> bool {
        self.immutable_at_bind.contains(key)
    }

    /// Operator tolerance for disallowed options.
    pub fn sloppy(&self) -> bool {
        self.sloppy
    }

    /// Whether callers may choose sloppy mode through `sloppy_mount`.
    pub fn caller_may_set_sloppy(&self) -> bool {
        !self.sloppy_forced && self.is_allowed(SLOPPY_MOUNT_KEY)
    }

    /// Key name used in the final configuration for `key`.
    pub fn alias_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }
}

/// Builder for [`OptionPolicy`].
///
/// Defaults are classified at `build()` time, so allow-list and defaults may
/// be declared in any order.
#[derive(Debug, Clone)]
pub struct OptionPolicyBuilder {
    allowed: BTreeSet<String>,
    declared_defaults: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    sloppy: bool,
    immutable_at_bind: BTreeSet<String>,
}

impl Default for OptionPolicyBuilder {
    fn default() -> Self {
        Self {
            allowed: BTreeSet::new(),
            declared_defaults: BTreeMap::new(),
            aliases: BTreeMap::new(),
            sloppy: false,
            immutable_at_bind: BTreeSet::from([SHARE_KEY.to_string()]),
        }
    }
}

impl OptionPolicyBuilder {
    pub fn allow<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed.extend(
            keys.into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty()),
        );
        self
    }

    pub fn default_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.declared_defaults.insert(key.into(), value.into());
        self
    }

    pub fn alias(mut self, key: impl Into<String>, renamed: impl Into<String>) -> Self {
        self.aliases.insert(key.into(), renamed.into());
        self
    }

    pub fn sloppy(mut self, sloppy: bool) -> Self {
        self.sloppy = sloppy;
        self
    }

    /// Replace the set of keys a bind may not change.
    pub fn immutable_at_bind<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable_at_bind = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> OptionPolicy {
        let mut defaults = BTreeMap::new();
        let mut forced = BTreeMap::new();
        let mut sloppy = self.sloppy;
        let mut sloppy_forced = false;

        for (key, value) in self.declared_defaults {
            if self.allowed.contains(&key) {
                defaults.insert(key, value);
            } else if key == SLOPPY_MOUNT_KEY {
                if let Some(flag) = parse_bool(&value) {
                    sloppy = flag;
                }
                sloppy_forced = true;
            } else {
                forced.insert(key, value);
            }
        }

        // An allowed sloppy_mount default is the per-bind fallback.
        if let Some(value) = defaults.remove(SLOPPY_MOUNT_KEY) {
            if !sloppy_forced {
                if let Some(flag) = parse_bool(&value) {
                    sloppy = flag;
                }
            }
        }

        OptionPolicy {
            allowed: self.allowed,
            defaults,
            forced,
            aliases: self.aliases,
            sloppy,
            sloppy_forced,
            immutable_at_bind: self.immutable_at_bind,
        }
    }
}

/// Parse `key:value,key:value`. Entries without a key are skipped, a missing
/// value becomes the empty string.
pub fn parse_default_entries(flag: &str) -> Vec<(String, String)> {
    flag.split(',')
        .filter_map(|entry| {
            let (key, value) = entry.split_once(':').unwrap_or((entry, ""));
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_split_into_overridable_and_forced() {
        let policy = OptionPolicy::from_flags("uid,gid", "uid:1000,nfsvers:3,actimeo:0");

        assert_eq!(policy.defaults().get("uid").map(String::as_str), Some("1000"));
        assert_eq!(policy.forced().get("nfsvers").map(String::as_str), Some("3"));
        assert_eq!(policy.forced().get("actimeo").map(String::as_str), Some("0"));
        assert!(policy.forced().keys().all(|k| !policy.is_allowed(k)));
    }

    #[test]
    fn test_empty_flags_yield_empty_policy() {
        let policy = OptionPolicy::from_flags("", "");
        assert!(policy.allowed().is_empty());
        assert!(policy.defaults().is_empty());
        assert!(policy.forced().is_empty());
        assert!(!policy.sloppy());
    }

    #[test]
    fn test_default_entry_parsing() {
        let entries = parse_default_entries("a:1,:2,b,c:x:y");
        assert_eq!(
            entries,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), String::new()),
                ("c".to_string(), "x:y".to_string()),
            ]
        );
    }

    #[test]
    fn test_forced_sloppy_mount_locks_flag() {
        let policy = OptionPolicy::from_flags("", "sloppy_mount:true");
        assert!(policy.sloppy());
        assert!(!policy.caller_may_set_sloppy());
        assert!(!policy.forced().contains_key(SLOPPY_MOUNT_KEY));
    }

    #[test]
    fn test_allowed_sloppy_mount_default_is_caller_overridable() {
        let policy = OptionPolicy::from_flags("uid,sloppy_mount", "sloppy_mount:false");
        assert!(!policy.sloppy());
        assert!(policy.caller_may_set_sloppy());
        assert!(!policy.defaults().contains_key(SLOPPY_MOUNT_KEY));
    }

    #[test]
    fn test_alias_lookup_falls_back_to_key() {
        let policy = OptionPolicy::builder().alias("readonly", "ro").build();
        assert_eq!(policy.alias_for("readonly"), "ro");
        assert_eq!(policy.alias_for("uid"), "uid");
    }

    #[test]
    fn test_share_is_immutable_by_default() {
        let policy = OptionPolicy::default();
        assert!(policy.is_immutable_at_bind("share"));
        let custom = OptionPolicy::builder().immutable_at_bind(["share", "version"]).build();
        assert!(custom.is_immutable_at_bind("version"));
    }
}
