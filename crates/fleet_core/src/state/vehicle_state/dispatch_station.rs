use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{ChargerId, StationId, VehicleId};
use crate::roadnetwork::Route;
use crate::world::World;

use super::charge_queueing::ChargeQueueing;
use super::charging_station::ChargingStation;
use super::ops::{apply_new_vehicle_state, drive, rejected};
use super::{StateProtocol, VehicleState};

/// Driving to a station to charge on a specific charger kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchStation {
    pub vehicle_id: VehicleId,
    pub station_id: StationId,
    pub charger_id: ChargerId,
    pub route: Route,
}

impl DispatchStation {
    pub fn new(vehicle_id: VehicleId, station_id: StationId, charger_id: ChargerId, route: Route) -> Self {
        Self {
            vehicle_id,
            station_id,
            charger_id,
            route,
        }
    }

    /// Charging when a charger is free, queueing otherwise.
    fn arrival_state(&self, world: &World) -> SimResult<VehicleState> {
        let station = world.get_station(&self.station_id)?;
        if station.has_available_charger(&self.charger_id) {
            Ok(VehicleState::ChargingStation(ChargingStation::new(
                self.vehicle_id.clone(),
                self.station_id.clone(),
                self.charger_id.clone(),
            )))
        } else {
            Ok(VehicleState::ChargeQueueing(ChargeQueueing::new(
                self.vehicle_id.clone(),
                self.station_id.clone(),
                self.charger_id.clone(),
                world.sim_time(),
            )))
        }
    }
}

impl StateProtocol for DispatchStation {
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
        if !station.membership.grants_access_to(&vehicle.membership) {
            return rejected(
                RejectReason::MembershipMismatch,
                format!("vehicle {} cannot use station {}", self.vehicle_id, self.station_id),
            );
        }
        if station.cell() == vehicle.cell() {
            return self.arrival_state(world)?.enter(world, env);
        }
        if !self.route.corresponds_with(vehicle.cell(), Some(station.cell())) {
            return rejected(
                RejectReason::InvalidRoute,
                format!("route does not lead to station {}", self.station_id),
            );
        }
        apply_new_vehicle_state(world, &self.vehicle_id, VehicleState::DispatchStation(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.route.is_empty())
    }

    fn default_terminal_state(&self, world: &World, _env: &Environment) -> SimResult<VehicleState> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let station = world.get_station(&self.station_id)?;
        if station.cell() != vehicle.cell() {
            return Err(SimulationError::invalid_state(
                &self.vehicle_id,
                format!(
                    "dispatch to station {} ended at {} but station is at {}",
                    self.station_id,
                    vehicle.cell(),
                    station.cell()
                ),
            ));
        }
        self.arrival_state(world)
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        drive(world, env, &VehicleState::DispatchStation(self.clone()))
    }
}
