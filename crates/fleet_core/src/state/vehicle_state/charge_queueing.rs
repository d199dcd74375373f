use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{ChargerId, StationId, VehicleId};
use crate::world::World;

use super::charging_station::ChargingStation;
use super::ops::{apply_new_vehicle_state, idle_vehicle, rejected};
use super::{StateProtocol, VehicleState};

/// Waiting at a station for a charger to free up.
///
/// The station only keeps a count; queue order comes from `enqueue_time`
/// (ties broken by vehicle id) when the step loop orders vehicle updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeQueueing {
    pub vehicle_id: VehicleId,
    pub station_id: StationId,
    pub charger_id: ChargerId,
    pub enqueue_time: u64,
}

impl ChargeQueueing {
    pub fn new(vehicle_id: VehicleId, station_id: StationId, charger_id: ChargerId, enqueue_time: u64) -> Self {
        Self {
            vehicle_id,
            station_id,
            charger_id,
            enqueue_time,
        }
    }
}

impl StateProtocol for ChargeQueueing {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let station = world.get_station(&self.station_id)?;
        let charger = station.get_charger_instance(&self.charger_id)?;
        if !env.mechatronics_for(vehicle)?.valid_charger(charger) {
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
        let enqueued = station.enqueue_for_charger(&self.charger_id)?;
        let updated = world.modify_station(enqueued)?;
        apply_new_vehicle_state(&updated, &self.vehicle_id, VehicleState::ChargeQueueing(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let station = world.get_station(&self.station_id)?;
        let dequeued = station.dequeue_for_charger(&self.charger_id)?;
        Ok(Outcome::Updated(world.modify_station(dequeued)?))
    }

    fn has_reached_terminal_condition(&self, world: &World, _env: &Environment) -> SimResult<bool> {
        let station = world.get_station(&self.station_id)?;
        Ok(station.has_available_charger(&self.charger_id))
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::ChargingStation(ChargingStation::new(
            self.vehicle_id.clone(),
            self.station_id.clone(),
            self.charger_id.clone(),
        )))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        Ok(Outcome::Updated(idle_vehicle(world, env, &self.vehicle_id)?))
    }
}
