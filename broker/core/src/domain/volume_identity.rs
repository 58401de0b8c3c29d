// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Volume Identity
//!
//! A binding's volume id is `<instance id>-<digest>`, where the digest is the
//! SHA-256 of the final mount configuration in canonical JSON form. Bindings
//! of one instance with different effective options therefore get different
//! volume ids, and re-binding with the same options yields the same id.
//!
//! Volume ids are recomputed on every bind and never stored.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::options_merger::OptionSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeIdentity {
    pub instance_id: String,
    pub digest: String,
}

impl VolumeIdentity {
    pub fn derive(instance_id: impl Into<String>, config: &OptionSet) -> Self {
        Self {
            instance_id: instance_id.into(),
            digest: config_digest(config),
        }
    }

    pub fn volume_id(&self) -> String {
        format!("{}-{}", self.instance_id, self.digest)
    }
}

impl fmt::Display for VolumeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.instance_id, self.digest)
    }
}

/// Canonical byte form of a configuration: a JSON object with sorted keys.
pub fn canonical_bytes(config: &OptionSet) -> Vec<u8> {
    // BTreeMap iterates in key order; string maps always serialize.
    serde_json::to_vec(config).unwrap_or_default()
}

/// Lowercase hex SHA-256 of the canonical configuration.
pub fn config_digest(config: &OptionSet) -> String {
    hex::encode(Sha256::digest(canonical_bytes(config)))
}

/// Shorthand for `VolumeIdentity::derive(..).volume_id()`.
pub fn identify(instance_id: &str, config: &OptionSet) -> String {
    VolumeIdentity::derive(instance_id, config).volume_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> OptionSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_identifier_is_stable() {
        let opts = config(&[("source", "nfs://server/share"), ("uid", "1000")]);
        assert_eq!(identify("inst", &opts), identify("inst", &opts));
    }

    #[test]
    fn test_identifier_shape() {
        let id = identify("some-instance-id", &config(&[("uid", "1")]));
        let digest = id.strip_prefix("some-instance-id-").unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_identifier_changes_with_any_value() {
        let base = config(&[("uid", "1000"), ("gid", "1000")]);
        let changed = config(&[("uid", "1001"), ("gid", "1000")]);
        assert_ne!(identify("inst", &base), identify("inst", &changed));
        assert_ne!(identify("inst", &base), identify("other", &base));
    }

    #[test]
    fn test_canonical_form_is_sorted_json() {
        let opts = config(&[("uid", "1"), ("gid", "2")]);
        assert_eq!(canonical_bytes(&opts), br#"{"gid":"2","uid":"1"}"#.to_vec());
    }

    #[test]
    fn test_empty_config_digest() {
        // sha256("{}")
        assert_eq!(
            config_digest(&OptionSet::new()),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
