// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host-side simulation harness for the slotswap engine.
//!
//! Provides an in-memory flash device with power-cut injection, the
//! deterministic image fixtures, and the canned upgrade scenarios used
//! by both the CLI runner and the integration tests.

pub mod flash;
pub mod images;
pub mod scenario;

pub use flash::{SimArea, SimDevice};
pub use scenario::{Scenario, PREFIX};
