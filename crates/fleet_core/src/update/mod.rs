//! Per-timestep orchestration.
//!
//! An [`Update`] runs its pre-step [`SimulationUpdate`]s in list order (price
//! changes, new requests, cancellations), then the [`StepSimulation`] which
//! drives the vehicles and advances the clock.

mod cancel_requests;
mod charging_price;
mod request_feed;
mod step_simulation;

use tracing::trace;

use crate::dispatcher::{default_generators, InstructionGenerator};
use crate::environment::Environment;
use crate::error::SimResult;
use crate::world::World;

pub use cancel_requests::CancelRequests;
pub use charging_price::{ChargingPriceUpdate, PriceRow, PriceTarget};
pub use request_feed::RequestFeed;
pub use step_simulation::{apply_instructions, perform_driver_state_updates, perform_vehicle_state_updates, StepSimulation};

/// An exogenous input applied before policies run.
///
/// Implementations may keep state between steps (a cursor into a feed, for
/// instance) through `&mut self`.
pub trait SimulationUpdate: Send {
    fn name(&self) -> &str;

    fn update(&mut self, world: &World, env: &Environment) -> SimResult<World>;
}

/// The full update applied once per timestep.
pub struct Update {
    pre_step: Vec<Box<dyn SimulationUpdate>>,
    step: StepSimulation,
}

impl Update {
    pub fn new(pre_step: Vec<Box<dyn SimulationUpdate>>, step: StepSimulation) -> Self {
        Self { pre_step, step }
    }

    /// Default wiring: prices, the request feed and cancellations, then a step
    /// with the bundled generators.
    pub fn build(
        prices: ChargingPriceUpdate,
        requests: RequestFeed,
        generators: Option<Vec<Box<dyn InstructionGenerator>>>,
    ) -> Self {
        let pre_step: Vec<Box<dyn SimulationUpdate>> =
            vec![Box::new(prices), Box::new(requests), Box::new(CancelRequests::new())];
        let step = StepSimulation::new(generators.unwrap_or_else(default_generators));
        Self::new(pre_step, step)
    }

    pub fn pre_step_names(&self) -> Vec<&str> {
        self.pre_step.iter().map(|u| u.name()).collect()
    }

    pub fn step_simulation(&self) -> &StepSimulation {
        &self.step
    }

    /// Runs one full timestep and returns the world at the next time.
    pub fn apply(&mut self, world: &World, env: &Environment) -> SimResult<World> {
        let mut next = world.clear_applied_instructions();
        for update in self.pre_step.iter_mut() {
            next = update.update(&next, env)?;
            trace!(update = update.name(), sim_time = next.sim_time(), "pre-step update applied");
        }
        self.step.update(&next, env)
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Update")
            .field("pre_step", &self.pre_step_names())
            .field("step", &self.step)
            .finish()
    }
}
