use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{BaseId, VehicleId};
use crate::roadnetwork::Route;
use crate::world::World;

use super::ops::{apply_new_vehicle_state, drive, rejected};
use super::reserve_base::ReserveBase;
use super::{StateProtocol, VehicleState};

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchBase {
    pub vehicle_id: VehicleId,
    pub base_id: BaseId,
    pub route: Route,
}

impl DispatchBase {
    pub fn new(vehicle_id: VehicleId, base_id: BaseId, route: Route) -> Self {
        Self {
            vehicle_id,
            base_id,
            route,
        }
    }
}

impl StateProtocol for DispatchBase {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let base = world.get_base(&self.base_id)?;
        if !base.membership.grants_access_to(&vehicle.membership) {
            return rejected(
                RejectReason::MembershipMismatch,
                format!("vehicle {} cannot use base {}", self.vehicle_id, self.base_id),
            );
        }
        if !self.route.corresponds_with(vehicle.cell(), Some(base.cell())) {
            return rejected(
                RejectReason::InvalidRoute,
                format!("route does not lead to base {}", self.base_id),
            );
        }
        apply_new_vehicle_state(world, &self.vehicle_id, VehicleState::DispatchBase(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.route.is_empty())
    }

    /// Reserve a stall if one is free, otherwise idle at the base.
    fn default_terminal_state(&self, world: &World, _env: &Environment) -> SimResult<VehicleState> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let base = world.get_base(&self.base_id)?;
        if base.cell() != vehicle.cell() {
            return Err(SimulationError::invalid_state(
                &self.vehicle_id,
                format!(
                    "dispatch to base {} ended at {} but base is at {}",
                    self.base_id,
                    vehicle.cell(),
                    base.cell()
                ),
            ));
        }
        if base.has_available_stall(&vehicle.membership) {
            Ok(VehicleState::ReserveBase(ReserveBase::new(
                self.vehicle_id.clone(),
                self.base_id.clone(),
            )))
        } else {
            Ok(VehicleState::idle(self.vehicle_id.clone()))
        }
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        drive(world, env, &VehicleState::DispatchBase(self.clone()))
    }
}
