// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! - `mount_resolution`: turns a bind into a mount specification
//! - `broker`: service broker lifecycle over a `BrokerStore`
//! - `catalog`: service catalog sources

pub mod catalog;
pub mod mount_resolution;
pub mod broker;
