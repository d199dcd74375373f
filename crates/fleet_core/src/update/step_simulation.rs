use std::fmt;

use tracing::{debug, error, info_span};

use crate::dispatcher::{generate_instructions, Instruction, InstructionGenerator, InstructionResult};
use crate::environment::Environment;
use crate::error::{Outcome, SimResult, Transition};
use crate::model::VehicleId;
use crate::reporting::ReportEvent;
use crate::state::vehicle_state::ops::transition_previous_to_next;
use crate::state::VehicleState;
use crate::world::World;

use super::SimulationUpdate;

/// Keeps the world from a transition, or the previous world when it was
/// rejected or failed. Fatal errors abort the step.
fn settle(world: World, vehicle_id: &VehicleId, what: &str, result: Transition) -> SimResult<World> {
    match result {
        Ok(Outcome::Updated(updated)) => Ok(updated),
        Ok(Outcome::Rejected(rejection)) => {
            debug!(%vehicle_id, %rejection, "{what} rejected");
            Ok(world)
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            error!(%vehicle_id, error = %err, "{what} failed");
            Ok(world)
        }
    }
}

/// Runs every driver's shift check in vehicle id order.
pub fn perform_driver_state_updates(world: &World, env: &Environment) -> SimResult<World> {
    let vehicle_ids: Vec<VehicleId> = world.vehicles().keys().cloned().collect();
    let mut next = world.clone();
    for vehicle_id in vehicle_ids {
        let Some(vehicle) = next.vehicle(&vehicle_id) else {
            continue;
        };
        let driver_state = vehicle.driver_state.clone();
        let result = driver_state.update(&next, env);
        next = settle(next, &vehicle_id, "driver update", result)?;
    }
    Ok(next)
}

/// Applies at most one instruction per vehicle.
///
/// Every target state is computed against `world` as given, and each
/// instruction is recorded in the world's applied instructions before any
/// transition happens. Transitions then run in instruction order; a failed or
/// rejected one leaves that vehicle as it was.
pub fn apply_instructions(world: &World, env: &Environment, instructions: &[Instruction]) -> SimResult<World> {
    let mut next = world.clone();
    let mut results: Vec<InstructionResult> = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        match instruction.apply(world, env) {
            Ok(result) => {
                next = next.with_applied_instruction(instruction.clone());
                results.push(result);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                error!(vehicle_id = %instruction.vehicle_id(), error = %err, "instruction could not be applied");
            }
        }
    }
    for result in results {
        let vehicle_id = result.prev_state.vehicle_id().clone();
        let transition = transition_previous_to_next(&next, env, &result.prev_state, &result.next_state)
            .map_err(|e| {
                e.context(format!(
                    "applying instruction {} -> {}",
                    result.prev_state.kind(),
                    result.next_state.kind()
                ))
            });
        next = settle(next, &vehicle_id, "instruction", transition)?;
    }
    Ok(next)
}

/// Vehicles in update order: everything not waiting in a charge queue by
/// id, then queued vehicles by enqueue time so queues are served first come
/// first served.
fn vehicle_update_order(world: &World) -> Vec<VehicleId> {
    let (mut queueing, others): (Vec<_>, Vec<_>) = world
        .vehicles()
        .values()
        .partition(|v| matches!(v.vehicle_state, VehicleState::ChargeQueueing(_)));
    queueing.sort_by(|a, b| {
        a.vehicle_state
            .enqueue_time()
            .cmp(&b.vehicle_state.enqueue_time())
            .then_with(|| a.id.cmp(&b.id))
    });
    others
        .into_iter()
        .chain(queueing)
        .map(|v| v.id.clone())
        .collect()
}

/// Advances every vehicle by one timestep in [`vehicle_update_order`].
pub fn perform_vehicle_state_updates(world: &World, env: &Environment) -> SimResult<World> {
    let mut next = world.clone();
    for vehicle_id in vehicle_update_order(world) {
        // earlier updates may have changed this vehicle's state
        let Some(vehicle) = next.vehicle(&vehicle_id) else {
            continue;
        };
        let state = vehicle.vehicle_state.clone();
        let result = state.update(&next, env).map_err(|e| {
            e.context(format!("vehicle {vehicle_id}: update {}", state.kind()))
        });
        next = settle(next, &vehicle_id, "vehicle update", result)?;
    }
    Ok(next)
}

/// The main per-timestep update: drivers, policies, instructions, vehicles,
/// then the clock.
pub struct StepSimulation {
    generators: Vec<Box<dyn InstructionGenerator>>,
}

impl StepSimulation {
    pub fn new(generators: Vec<Box<dyn InstructionGenerator>>) -> Self {
        Self { generators }
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name()).collect()
    }

    /// Runs the step without advancing the clock.
    pub fn step(&mut self, world: &World, env: &Environment) -> SimResult<World> {
        let sim_time = world.sim_time();
        let _span = info_span!("step", sim_time).entered();

        let with_drivers = perform_driver_state_updates(world, env)?;
        let stack = generate_instructions(&mut self.generators, &with_drivers, env)
            .map_err(|e| e.context(format!("generating instructions at {sim_time}")))?;
        let instructions = stack.resolve();
        for instruction in &instructions {
            env.report(
                &with_drivers,
                ReportEvent::Instruction {
                    instruction: instruction.clone(),
                },
            );
        }
        let instructed = apply_instructions(&with_drivers, env, &instructions)?;
        let updated = perform_vehicle_state_updates(&instructed, env)?;
        debug!(
            instructions = instructions.len(),
            vehicles = updated.vehicles().len(),
            requests = updated.requests().len(),
            "step complete"
        );
        Ok(updated)
    }
}

impl SimulationUpdate for StepSimulation {
    fn name(&self) -> &str {
        "step_simulation"
    }

    fn update(&mut self, world: &World, env: &Environment) -> SimResult<World> {
        Ok(self.step(world, env)?.tick())
    }
}

impl fmt::Debug for StepSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSimulation")
            .field("generators", &self.generator_names())
            .finish()
    }
}
