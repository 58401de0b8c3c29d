// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Options Merger
//!
//! Reconciles the option sources of a bind into one canonical option set.
//!
//! ## Precedence (lowest first)
//!
//! 1. operator defaults for allowed keys
//! 2. instance fingerprint (captured at provision time)
//! 3. bind parameters
//! 4. query options embedded in the share locator
//! 5. forced operator values, applied last
//!
//! A caller sending a forced key is rejected unless sloppy, in which case
//! the forced value shadows it.
//!
//! Validation always runs on the key names the caller supplied. Aliases from
//! the policy only rename keys in the emitted set.
//!
//! A merge is a pure function of the request and the policy: it reads the
//! policy, builds a fresh [`OptionSet`] and either returns it whole or fails
//! without a partial result.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::option_policy::{OptionPolicy, SLOPPY_MOUNT_KEY};
use super::option_value::{normalize, parse_bool, RawOptions};
use super::share_locator::ShareLocator;

/// Flat `key → canonical value` option table.
pub type OptionSet = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("Not allowed options: {}", .0.join(", "))]
    NotAllowed(Vec<String>),

    #[error("option \"{key}\" is fixed by the service instance and cannot be changed at bind time")]
    ImmutableOption { key: String },
}

/// Inputs of a single merge.
#[derive(Debug, Clone)]
pub struct MergeRequest<'a> {
    pub instance_fingerprint: &'a RawOptions,
    pub bind_parameters: &'a RawOptions,
    pub share_locator: &'a str,
    pub ignore_keys: &'a BTreeSet<String>,
    /// Tolerate disallowed keys. Resolved once by [`MergeRequest::new`].
    pub sloppy: bool,
}

impl<'a> MergeRequest<'a> {
    pub fn new(
        policy: &OptionPolicy,
        instance_fingerprint: &'a RawOptions,
        bind_parameters: &'a RawOptions,
        share_locator: &'a str,
        ignore_keys: &'a BTreeSet<String>,
    ) -> Self {
        let sloppy =
            resolve_sloppy(policy, instance_fingerprint, bind_parameters, share_locator);
        Self {
            instance_fingerprint,
            bind_parameters,
            share_locator,
            ignore_keys,
            sloppy,
        }
    }
}

/// Validated merge result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Final options, aliased, with forced values applied.
    pub options: OptionSet,
    /// Share address with the locator query removed.
    pub share: String,
}

/// Caller choice of `sloppy_mount` when the policy permits one, else the
/// operator setting. Locator beats bind beats fingerprint, matching the
/// overlay order. A caller value that is not a boolean means strict.
fn resolve_sloppy(
    policy: &OptionPolicy,
    fingerprint: &RawOptions,
    bind: &RawOptions,
    share_locator: &str,
) -> bool {
    if !policy.caller_may_set_sloppy() {
        return policy.sloppy();
    }

    let from_locator = ShareLocator::parse(share_locator)
        .query_pairs()
        .filter(|(key, _)| *key == SLOPPY_MOUNT_KEY)
        .last()
        .map(|(_, value)| value.to_string());
    let requested = from_locator.or_else(|| {
        [bind, fingerprint]
            .into_iter()
            .filter_map(|source| source.get(SLOPPY_MOUNT_KEY))
            .map(|value| normalize(SLOPPY_MOUNT_KEY, value))
            .find(|value| !value.is_empty())
    });

    match requested {
        Some(value) => parse_bool(&value).unwrap_or(false),
        None => policy.sloppy(),
    }
}

pub struct OptionsMerger<'p> {
    policy: &'p OptionPolicy,
}

impl<'p> OptionsMerger<'p> {
    pub fn new(policy: &'p OptionPolicy) -> Self {
        Self { policy }
    }

    pub fn merge(&self, request: &MergeRequest<'_>) -> Result<MergeOutcome, MergeError> {
        self.check_immutable(request)?;

        let mut options: OptionSet = self.policy.defaults().clone();
        self.overlay(&mut options, request.instance_fingerprint, request.ignore_keys);
        self.overlay(&mut options, request.bind_parameters, request.ignore_keys);

        let locator = ShareLocator::parse(request.share_locator);
        let from_locator = locator.collect_options(self.policy, request.ignore_keys);
        options.extend(from_locator.options);

        let mut rejected: BTreeSet<String> = from_locator.rejected.into_iter().collect();
        rejected.extend(
            request
                .instance_fingerprint
                .keys()
                .chain(request.bind_parameters.keys())
                .filter(|key| !self.is_permitted(key, request.ignore_keys))
                .cloned(),
        );

        if !rejected.is_empty() {
            if !request.sloppy {
                return Err(MergeError::NotAllowed(rejected.into_iter().collect()));
            }
            tracing::debug!(
                rejected = ?rejected,
                "sloppy mount: dropping options outside the allow list"
            );
        }

        options.remove(SLOPPY_MOUNT_KEY);

        Ok(MergeOutcome {
            options: self.finalize(options),
            share: locator.base().to_string(),
        })
    }

    /// Allowed, non-ignored keys with a non-empty canonical value.
    fn overlay(&self, options: &mut OptionSet, source: &RawOptions, ignore: &BTreeSet<String>) {
        for (key, value) in source {
            if key.is_empty() || ignore.contains(key) || !self.policy.is_allowed(key) {
                continue;
            }
            let value = normalize(key, value);
            if !value.is_empty() {
                options.insert(key.clone(), value);
            }
        }
    }

    /// Allowed or ignored keys, plus `sloppy_mount`. Forced keys are not on
    /// the allow list, so a caller sending one fails unless sloppy.
    fn is_permitted(&self, key: &str, ignore: &BTreeSet<String>) -> bool {
        key == SLOPPY_MOUNT_KEY || ignore.contains(key) || self.policy.is_allowed(key)
    }

    fn check_immutable(&self, request: &MergeRequest<'_>) -> Result<(), MergeError> {
        for key in self.policy.immutable_at_bind() {
            let Some(requested) = request.bind_parameters.get(key) else {
                continue;
            };
            let current = request
                .instance_fingerprint
                .get(key)
                .map(|value| normalize(key, value));
            if current.as_deref() != Some(normalize(key, requested).as_str()) {
                return Err(MergeError::ImmutableOption { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Rename keys through the alias table, then apply forced values.
    fn finalize(&self, options: OptionSet) -> OptionSet {
        let mut config: OptionSet = options
            .into_iter()
            .map(|(key, value)| (self.policy.alias_for(&key).to_string(), value))
            .collect();
        for (key, value) in self.policy.forced() {
            config.insert(self.policy.alias_for(key).to_string(), value.clone());
        }
        config
    }
}
