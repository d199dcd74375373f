use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{ChargerId, StationId, VehicleId};
use crate::world::World;

use super::ops::{apply_new_vehicle_state, charge, rejected};
use super::{StateProtocol, VehicleState};

/// Plugged into one of a station's chargers. Holds the charger until exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingStation {
    pub vehicle_id: VehicleId,
    pub station_id: StationId,
    pub charger_id: ChargerId,
}

impl ChargingStation {
    pub fn new(vehicle_id: VehicleId, station_id: StationId, charger_id: ChargerId) -> Self {
        Self {
            vehicle_id,
            station_id,
            charger_id,
        }
    }
}

impl StateProtocol for ChargingStation {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let station = world.get_station(&self.station_id)?;
        let mechatronics = env.mechatronics_for(vehicle)?;
        let charger = station.get_charger_instance(&self.charger_id)?;
        if !mechatronics.valid_charger(charger) {
            return Err(SimulationError::invalid_instruction(
                &self.vehicle_id,
                format!("charger {} is incompatible with {}", self.charger_id, vehicle.mechatronics_id),
            ));
        }
        if vehicle.cell() != station.cell() {
            return rejected(
                RejectReason::NotAtLocation,
                format!("vehicle {} is not at station {}", self.vehicle_id, self.station_id),
            );
        }
        if !station.membership.grants_access_to(&vehicle.membership) {
            return rejected(
                RejectReason::MembershipMismatch,
                format!("vehicle {} cannot use station {}", self.vehicle_id, self.station_id),
            );
        }
        if mechatronics.is_full(vehicle) {
            return rejected(
                RejectReason::VehicleFull,
                format!("vehicle {} is already full", self.vehicle_id),
            );
        }
        let Some(checked_out) = station.checkout_charger(&self.charger_id)? else {
            return rejected(
                RejectReason::ChargerUnavailable,
                format!("no {} charger free at station {}", self.charger_id, self.station_id),
            );
        };
        let updated = world.modify_station(checked_out)?;
        apply_new_vehicle_state(&updated, &self.vehicle_id, VehicleState::ChargingStation(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let station = world.get_station(&self.station_id)?;
        let returned = station.return_charger(&self.charger_id)?;
        Ok(Outcome::Updated(world.modify_station(returned)?))
    }

    fn has_reached_terminal_condition(&self, world: &World, env: &Environment) -> SimResult<bool> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        Ok(env.mechatronics_for(vehicle)?.is_full(vehicle))
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::idle(self.vehicle_id.clone()))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        let charged = charge(world, env, &self.vehicle_id, &self.station_id, &self.charger_id)?;
        Ok(Outcome::Updated(charged))
    }
}
