// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Share locators of the form `address[?key=value&key=value]`.

use std::collections::BTreeSet;

use super::option_policy::{OptionPolicy, SLOPPY_MOUNT_KEY};
use super::option_value::{normalize, OptionValue};
use super::options_merger::OptionSet;

/// A share address with its embedded query options split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLocator<'a> {
    base: &'a str,
    query: Option<&'a str>,
}

/// Result of reading a locator's query options through a policy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    pub options: OptionSet,
    pub rejected: Vec<String>,
}

impl<'a> ShareLocator<'a> {
    /// Split on the first `?`.
    pub fn parse(locator: &'a str) -> Self {
        match locator.split_once('?') {
            Some((base, query)) => Self { base, query: Some(query) },
            None => Self { base: locator, query: None },
        }
    }

    /// Address handed to the driver, without the query string.
    pub fn base(&self) -> &'a str {
        self.base
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    /// `key=value` pairs with a non-empty key and value.
    pub fn query_pairs(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.query
            .unwrap_or("")
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
    }

    /// Read the query options: ignored keys are skipped, allowed keys are
    /// normalized into the option set, anything else is rejected.
    /// `sloppy_mount` is never rejected; it only steers the merge.
    pub fn collect_options(
        &self,
        policy: &OptionPolicy,
        ignore: &BTreeSet<String>,
    ) -> LocatorOptions {
        let mut collected = LocatorOptions::default();
        for (key, value) in self.query_pairs() {
            if ignore.contains(key) || (key == SLOPPY_MOUNT_KEY && !policy.is_allowed(key)) {
                continue;
            }
            if policy.is_allowed(key) {
                collected
                    .options
                    .insert(key.to_string(), normalize(key, &OptionValue::text(value)));
            } else {
                collected.rejected.push(key.to_string());
            }
        }
        collected
    }
}

/// Address portion of `locator`.
pub fn share_base(locator: &str) -> &str {
    ShareLocator::parse(locator).base()
}
