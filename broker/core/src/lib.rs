// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! volbroker core
//!
//! Exposes existing NFS and SMB shares as bindable services and resolves the
//! mount configuration handed to the volume driver at bind time.
//!
//! # Architecture
//!
//! - **domain:** option normalization, policy, merge, mode and volume identity
//! - **application:** mount resolution and the broker service
//! - **infrastructure:** store implementations

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
