// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use slotswap_sim::scenario::{self, Scenario};
use slotswap_core::{Error as SwapError, FlashError};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "slotswap-sim")]
#[command(about = "Simulated power-fail testing for the slotswap engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run one scenario to completion
    Run {
        /// Scenario name (see `list`)
        #[arg(value_name = "SCENARIO", default_value = "small")]
        scenario: String,

        /// Cut power after this many flash mutations, then reboot once
        /// and let recovery finish the swap
        #[arg(short, long)]
        fail_after: Option<usize>,
    },

    /// Cut power at every possible point, rebooting after each cut
    Sweep {
        /// Scenario name (see `list`)
        #[arg(value_name = "SCENARIO", default_value = "small")]
        scenario: String,
    },

    /// List the available scenarios
    List,
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { scenario, fail_after } => run_scenario(&lookup(&scenario)?, fail_after),
        Commands::Sweep { scenario } => sweep(&lookup(&scenario)?),
        Commands::List => {
            for scenario in scenario::ALL {
                println!(
                    "{:10} {:>7} <-> {:>7} bytes{}",
                    scenario.name,
                    scenario.sizes[0],
                    scenario.sizes[1],
                    if scenario.duplicate_pages { "  (duplicated pages)" } else { "" },
                );
            }
            Ok(())
        }
    }
}

fn lookup(name: &str) -> Result<Scenario> {
    match scenario::find(name) {
        Some(scenario) => Ok(scenario),
        None => bail!("unknown scenario '{name}' (try `list`)"),
    }
}

fn run_scenario(scenario: &Scenario, fail_after: Option<usize>) -> Result<()> {
    let device = scenario.setup();

    if let Some(budget) = fail_after {
        device.set_budget(budget);
        match scenario.boot(&device) {
            Ok(()) => println!("budget of {budget} mutations was never reached"),
            Err(SwapError::Flash(FlashError::Expired)) => {
                println!("power cut after {budget} mutations; rebooting");
                device.clear_budget();
                scenario.boot(&device).context("recovery boot")?;
            }
            Err(err) => return Err(err).context("interrupted boot"),
        }
    } else {
        scenario.boot(&device).context("upgrade boot")?;
    }

    if !scenario.verify_swapped(&device) {
        bail!("image verification failed after swap");
    }
    println!(
        "{}: swapped {} and {} byte images in {} flash operations",
        scenario.name,
        scenario.sizes[0],
        scenario.sizes[1],
        device.ops(),
    );
    Ok(())
}

/// Interrupt the upgrade after every possible mutation count and check
/// that one recovery boot always completes the swap.
fn sweep(scenario: &Scenario) -> Result<()> {
    // An uninterrupted run bounds the sweep.
    let device = scenario.setup();
    scenario.boot(&device).context("reference run")?;
    let total = device.ops();

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .expect("progress template")
            .progress_chars("=> "),
    );
    bar.set_message(scenario.name.to_string());

    for cut in 1..=total {
        let device = scenario.setup();
        device.set_budget(cut);
        match scenario.boot(&device) {
            Ok(()) => {}
            Err(SwapError::Flash(FlashError::Expired)) => {
                device.clear_budget();
                scenario
                    .boot(&device)
                    .with_context(|| format!("recovery boot after cut at {cut}"))?;
            }
            Err(err) => return Err(err).with_context(|| format!("cut at {cut}")),
        }
        if !scenario.verify_swapped(&device) {
            bail!("verification failed after cut at {cut}");
        }
        bar.inc(1);
    }
    bar.finish();
    println!("{}: all {} cut points recovered", scenario.name, total);
    Ok(())
}
