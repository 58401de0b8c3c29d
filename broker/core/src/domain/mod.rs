// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Pure mount-option resolution plus the broker's data types and store
//! contract. Nothing here performs I/O except configuration file loading.

pub mod option_value;
pub mod share_locator;
pub mod option_policy;
pub mod options_merger;
pub mod mode;
pub mod volume_identity;
pub mod binding;
pub mod repository;
pub mod broker_config;
