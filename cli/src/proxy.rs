// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outbound proxy detection at startup

/// Environment variable consulted for an HTTPS proxy.
pub const HTTPS_PROXY_VAR: &str = "https_proxy";

/// Returns the configured HTTPS proxy and logs it. An empty value is no proxy.
pub fn detect_proxy(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let proxy = lookup(HTTPS_PROXY_VAR).filter(|value| !value.is_empty())?;
    tracing::info!(https_proxy = %proxy, "proxy found");
    Some(proxy)
}
