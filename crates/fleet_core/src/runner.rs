//! Simulation runner: advances the world one timestep at a time.
//!
//! Each step hands the current world to the [`Update`], which runs the
//! pre-step feeds and the step loop and returns the world at the next time.
//! The run stops once the clock reaches the configured end time.

use tracing::{info, info_span};

use crate::environment::Environment;
use crate::error::SimResult;
use crate::update::Update;
use crate::world::World;

/// Everything a run carries from one step to the next.
#[derive(Debug)]
pub struct RunnerPayload {
    pub world: World,
    pub env: Environment,
    pub update: Update,
}

impl RunnerPayload {
    pub fn new(world: World, env: Environment, update: Update) -> Self {
        Self { world, env, update }
    }

    pub fn is_finished(&self) -> bool {
        self.world.sim_time() >= self.env.config.sim.end_time
    }
}

/// Runs one timestep. Returns `false` without doing anything once the clock
/// has reached the end time.
pub fn run_step(payload: &mut RunnerPayload) -> SimResult<bool> {
    if payload.is_finished() {
        return Ok(false);
    }
    let next = payload.update.apply(&payload.world, &payload.env)?;
    payload.world = next;
    Ok(true)
}

/// Runs one timestep and invokes `hook` with the resulting world.
pub fn run_step_with_hook<F>(payload: &mut RunnerPayload, mut hook: F) -> SimResult<bool>
where
    F: FnMut(&World, &Environment),
{
    let stepped = run_step(payload)?;
    if stepped {
        hook(&payload.world, &payload.env);
    }
    Ok(stepped)
}

/// Runs timesteps until the end time or until `max_steps` have run.
/// Returns the number of steps executed.
pub fn run_steps(payload: &mut RunnerPayload, max_steps: usize) -> SimResult<usize> {
    let mut steps = 0;
    while steps < max_steps && run_step(payload)? {
        steps += 1;
    }
    Ok(steps)
}

/// Runs timesteps until the end time and invokes `hook` after each one.
pub fn run_with_hook<F>(payload: &mut RunnerPayload, mut hook: F) -> SimResult<usize>
where
    F: FnMut(&World, &Environment),
{
    let mut steps = 0;
    while run_step_with_hook(payload, &mut hook)? {
        steps += 1;
    }
    Ok(steps)
}

/// Runs the whole simulation to its end time.
pub fn run(payload: &mut RunnerPayload) -> SimResult<usize> {
    let sim_name = payload.env.config.sim.sim_name.clone();
    let _span = info_span!("run", sim = %sim_name).entered();
    info!(
        start = payload.world.sim_time(),
        end = payload.env.config.sim.end_time,
        vehicles = payload.world.vehicles().len(),
        "simulation started"
    );
    let steps = run_with_hook(payload, |_, _| {})?;
    info!(
        steps,
        sim_time = payload.world.sim_time(),
        requests_remaining = payload.world.requests().len(),
        "simulation finished"
    );
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::update::{ChargingPriceUpdate, RequestFeed};
    use crate::test_helpers::{mock_env_with, mock_sim_config, mock_vehicle, mock_world_with, test_cell};

    fn payload(end_time: u64) -> RunnerPayload {
        let sim: SimConfig = mock_sim_config().with_time_range(0, end_time);
        let env = mock_env_with(sim.clone());
        let world = mock_world_with(&sim)
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .expect("vehicle");
        let update = Update::build(ChargingPriceUpdate::default(), RequestFeed::default(), None);
        RunnerPayload::new(world, env, update)
    }

    #[test]
    fn run_stops_at_end_time() {
        let mut payload = payload(300);
        let steps = run(&mut payload).expect("run");
        assert_eq!(steps, 5);
        assert_eq!(payload.world.sim_time(), 300);
        assert!(!run_step(&mut payload).expect("step"));
    }

    #[test]
    fn run_steps_respects_the_limit() {
        let mut payload = payload(600);
        assert_eq!(run_steps(&mut payload, 3).expect("run"), 3);
        assert_eq!(payload.world.sim_time(), 180);
    }

    #[test]
    fn hook_sees_every_step() {
        let mut payload = payload(240);
        let mut seen = Vec::new();
        run_with_hook(&mut payload, |world, _| seen.push(world.sim_time())).expect("run");
        assert_eq!(seen, vec![60, 120, 180, 240]);
    }
}
