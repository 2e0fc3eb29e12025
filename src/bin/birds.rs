//! Baby birds and a parent sharing a dish of worms.
//!
//! Each baby repeatedly takes a worm from the dish and eats it; the baby who
//! finds the dish empty chirps for the parent, which flies off, gathers a
//! random number of worms, and restocks the dish. Runs until the process is
//! terminated.

use std::convert::Infallible;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

use handoff::sim::Simulation;

const DEFAULT_BIRDS: usize = 5;
const MAX_BIRDS: usize = 5;
const DISH_CAPACITY: usize = 7;
const PACE: Duration = Duration::from_millis(300);

#[derive(Parser)]
#[command(name = "birds", about = "Simulates baby birds emptying a worm dish restocked by their parent")]
struct Args {
    /// How many baby birds to spawn. Values above the cap are clamped, and
    /// anything unparsable silently falls back to the default.
    #[arg(value_parser = lenient_count)]
    birds: Option<usize>,
}

fn lenient_count(raw: &str) -> Result<usize, Infallible> {
    Ok(raw.parse().unwrap_or(DEFAULT_BIRDS))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let birds = args.birds.unwrap_or(DEFAULT_BIRDS).clamp(1, MAX_BIRDS);

    let sim = Simulation::birds(birds, DISH_CAPACITY, PACE, || {
        rand::rng().random_range(1..=DISH_CAPACITY)
    })?;
    sim.run();
    Ok(())
}
