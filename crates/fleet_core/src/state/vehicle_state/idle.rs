use crate::environment::Environment;
use crate::error::{Outcome, SimResult, Transition};
use crate::model::VehicleId;
use crate::world::World;

use super::ops::apply_new_vehicle_state;
use super::{StateProtocol, VehicleState};

/// Parked with nothing to do. Accrues idle energy and idle time.
#[derive(Debug, Clone, PartialEq)]
pub struct Idle {
    pub vehicle_id: VehicleId,
    pub idle_duration: u64,
}

impl Idle {
    pub fn new(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            idle_duration: 0,
        }
    }
}

impl StateProtocol for Idle {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        apply_new_vehicle_state(world, &self.vehicle_id, VehicleState::Idle(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }

    fn has_reached_terminal_condition(&self, world: &World, env: &Environment) -> SimResult<bool> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        Ok(env.mechatronics_for(vehicle)?.is_empty(vehicle))
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::out_of_service(self.vehicle_id.clone()))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let idled = env
            .mechatronics_for(vehicle)?
            .apply_idle(vehicle, world.timestep_seconds());
        let next = Idle {
            idle_duration: self.idle_duration + world.timestep_seconds(),
            ..self.clone()
        };
        let updated = world.modify_vehicle(idled.with_vehicle_state(VehicleState::Idle(next)))?;
        Ok(Outcome::Updated(updated))
    }
}
