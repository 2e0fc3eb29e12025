//! Honeybees and a hungry bear sharing a pot of honey.
//!
//! Each bee repeatedly gathers one portion of honey and puts it in the pot;
//! the bee who fills the pot wakes the bear, which eats all the honey and
//! goes back to sleep. Runs until the process is terminated.

use std::convert::Infallible;
use std::time::Duration;

use clap::Parser;

use handoff::sim::Simulation;

const DEFAULT_BEES: usize = 10;
const MAX_BEES: usize = 10;
const POT_CAPACITY: usize = 7;
const PACE: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "bees", about = "Simulates bees filling a honey pot for a sleeping bear")]
struct Args {
    /// How many bees to spawn. Values above the cap are clamped, and
    /// anything unparsable silently falls back to the default.
    #[arg(value_parser = lenient_count)]
    bees: Option<usize>,
}

fn lenient_count(raw: &str) -> Result<usize, Infallible> {
    Ok(raw.parse().unwrap_or(DEFAULT_BEES))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let bees = args.bees.unwrap_or(DEFAULT_BEES).clamp(1, MAX_BEES);

    let sim = Simulation::bees(bees, POT_CAPACITY, PACE)?;
    sim.run();
    Ok(())
}
