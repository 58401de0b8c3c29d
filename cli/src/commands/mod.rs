// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the volbroker CLI

pub mod catalog;
pub mod config;
pub mod resolve;

pub use self::catalog::CatalogArgs;
pub use self::config::ConfigCommand;
pub use self::resolve::ResolveArgs;
