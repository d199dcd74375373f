use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, Transition};
use crate::model::{BaseId, VehicleId};
use crate::world::World;

use super::ops::{apply_new_vehicle_state, rejected};
use super::{StateProtocol, VehicleState};

/// Parked in a base stall.
#[derive(Debug, Clone, PartialEq)]
pub struct ReserveBase {
    pub vehicle_id: VehicleId,
    pub base_id: BaseId,
}

impl ReserveBase {
    pub fn new(vehicle_id: VehicleId, base_id: BaseId) -> Self {
        Self { vehicle_id, base_id }
    }
}

impl StateProtocol for ReserveBase {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let base = world.get_base(&self.base_id)?;
        if vehicle.cell() != base.cell() {
            return rejected(
                RejectReason::NotAtLocation,
                format!("vehicle {} is not at base {}", self.vehicle_id, self.base_id),
            );
        }
        if !base.membership.grants_access_to(&vehicle.membership) {
            return rejected(
                RejectReason::MembershipMismatch,
                format!("vehicle {} cannot use base {}", self.vehicle_id, self.base_id),
            );
        }
        let Some(checked_out) = base.checkout_stall() else {
            return rejected(
                RejectReason::StallUnavailable,
                format!("no stall free at base {}", self.base_id),
            );
        };
        let updated = world.modify_base(checked_out)?;
        apply_new_vehicle_state(&updated, &self.vehicle_id, VehicleState::ReserveBase(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let base = world.get_base(&self.base_id)?;
        let returned = base.return_stall()?;
        Ok(Outcome::Updated(world.modify_base(returned)?))
    }

    fn has_reached_terminal_condition(&self, world: &World, env: &Environment) -> SimResult<bool> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        Ok(env.mechatronics_for(vehicle)?.is_empty(vehicle))
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::out_of_service(self.vehicle_id.clone()))
    }

    fn perform_update(&self, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }
}
