use crate::environment::Environment;
use crate::error::{Outcome, SimResult, SimulationError, Transition};
use crate::model::VehicleId;
use crate::world::World;

use super::ops::apply_new_vehicle_state;
use super::{StateProtocol, VehicleState};

/// Sink state for vehicles that ran out of energy.
#[derive(Debug, Clone, PartialEq)]
pub struct OutOfService {
    pub vehicle_id: VehicleId,
}

impl OutOfService {
    pub fn new(vehicle_id: VehicleId) -> Self {
        Self { vehicle_id }
    }
}

impl StateProtocol for OutOfService {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        apply_new_vehicle_state(world, &self.vehicle_id, VehicleState::OutOfService(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(false)
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Err(SimulationError::invalid_state(
            &self.vehicle_id,
            "out_of_service has no follow-on state",
        ))
    }

    fn perform_update(&self, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }
}
