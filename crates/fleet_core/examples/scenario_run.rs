//! Runs a seeded synthetic scenario and prints a short summary.
//!
//! ```text
//! RUST_LOG=fleet_core=debug cargo run -p fleet_core --example scenario_run -- 7
//! ```
//! The optional argument is the seed (defaults to 42).

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::reporting::MemoryReporter;
use fleet_core::runner::run;
use fleet_core::scenario::{build_scenario, ScenarioParams};
use fleet_core::state::VehicleStateKind;
use fleet_core::SimResult;
use tracing_subscriber::EnvFilter;

fn main() -> SimResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let seed = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(42);
    let mut params = ScenarioParams::default()
        .with_seed(seed)
        .with_fleet(100, 800)
        .with_request_window_hours(4);
    params.sim = params.sim.clone().with_time_range(0, 6 * 3600);

    let mut payload = build_scenario(&params)?;
    let reporter = Arc::new(MemoryReporter::new());
    payload.env = payload.env.clone().with_reporter(reporter.clone());

    let steps = run(&mut payload)?;

    let mut reports: BTreeMap<&'static str, usize> = BTreeMap::new();
    for report in reporter.reports() {
        *reports.entry(report.event.kind()).or_default() += 1;
    }
    let mut states: BTreeMap<VehicleStateKind, usize> = BTreeMap::new();
    for vehicle in payload.world.vehicles().values() {
        *states.entry(vehicle.vehicle_state.kind()).or_default() += 1;
    }
    let revenue: f64 = payload.world.vehicles().values().map(|v| v.balance).sum();
    let distance: f64 = payload.world.vehicles().values().map(|v| v.distance_traveled_km).sum();

    println!("seed {seed}: {steps} steps, ended at t={}", payload.world.sim_time());
    println!("fleet balance {revenue:.2}, distance {distance:.1} km");
    println!("unserved requests still waiting: {}", payload.world.requests().len());
    for (kind, count) in &reports {
        println!("  {kind:<16} {count}");
    }
    for (state, count) in &states {
        println!("  {state:<22} {count}");
    }
    Ok(())
}
