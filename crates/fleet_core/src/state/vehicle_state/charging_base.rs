use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{BaseId, ChargerId, StationId, VehicleId};
use crate::world::World;

use super::ops::{apply_new_vehicle_state, charge, rejected};
use super::reserve_base::ReserveBase;
use super::{StateProtocol, VehicleState};

/// Charging in a base stall on the base's co-located station. Holds both the
/// stall and the charger.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingBase {
    pub vehicle_id: VehicleId,
    pub base_id: BaseId,
    pub charger_id: ChargerId,
}

impl ChargingBase {
    pub fn new(vehicle_id: VehicleId, base_id: BaseId, charger_id: ChargerId) -> Self {
        Self {
            vehicle_id,
            base_id,
            charger_id,
        }
    }

    fn station_id(&self, world: &World) -> SimResult<StationId> {
        world.get_base(&self.base_id)?.station_id.clone().ok_or_else(|| {
            SimulationError::invalid_instruction(
                &self.vehicle_id,
                format!("base {} has no station", self.base_id),
            )
        })
    }
}

impl StateProtocol for ChargingBase {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let base = world.get_base(&self.base_id)?;
        let station = world.get_station(&self.station_id(world)?)?;
        let mechatronics = env.mechatronics_for(vehicle)?;
        let charger = station.get_charger_instance(&self.charger_id)?;
        if !mechatronics.valid_charger(charger) {
            return Err(SimulationError::invalid_instruction(
                &self.vehicle_id,
                format!("charger {} is incompatible with {}", self.charger_id, vehicle.mechatronics_id),
            ));
        }
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
        if mechatronics.is_full(vehicle) {
            return rejected(
                RejectReason::VehicleFull,
                format!("vehicle {} is already full", self.vehicle_id),
            );
        }
        let Some(base_with_stall) = base.checkout_stall() else {
            return rejected(
                RejectReason::StallUnavailable,
                format!("no stall free at base {}", self.base_id),
            );
        };
        let Some(station_with_charger) = station.checkout_charger(&self.charger_id)? else {
            return rejected(
                RejectReason::ChargerUnavailable,
                format!("no {} charger free at base {}", self.charger_id, self.base_id),
            );
        };
        let updated = world
            .modify_base(base_with_stall)?
            .modify_station(station_with_charger)?;
        apply_new_vehicle_state(&updated, &self.vehicle_id, VehicleState::ChargingBase(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let station = world.get_station(&self.station_id(world)?)?;
        let base = world.get_base(&self.base_id)?;
        let updated = world
            .modify_station(station.return_charger(&self.charger_id)?)?
            .modify_base(base.return_stall()?)?;
        Ok(Outcome::Updated(updated))
    }

    fn has_reached_terminal_condition(&self, world: &World, env: &Environment) -> SimResult<bool> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        Ok(env.mechatronics_for(vehicle)?.is_full(vehicle))
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::ReserveBase(ReserveBase::new(
            self.vehicle_id.clone(),
            self.base_id.clone(),
        )))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        let station_id = self.station_id(world)?;
        let charged = charge(world, env, &self.vehicle_id, &station_id, &self.charger_id)?;
        Ok(Outcome::Updated(charged))
    }
}
