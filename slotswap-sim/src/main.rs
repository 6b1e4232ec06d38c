// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated power-fail testing for the slotswap engine.
//!
//! Usage:
//!   slotswap-sim run small
//!   slotswap-sim run large --fail-after 150
//!   slotswap-sim sweep small
//!
//! Exit codes: 0 on a completed (or no-op) swap, 1 on unrecoverable
//! trailer corruption, 2 when hash-collision retries are exhausted.

mod cli;

use clap::Parser;
use slotswap_core::Error as SwapError;

fn main() {
    let args = cli::Cli::parse();
    match cli::run(args) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code(&err));
        }
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SwapError>() {
        Some(SwapError::HashCollision) => 2,
        _ => 1,
    }
}
