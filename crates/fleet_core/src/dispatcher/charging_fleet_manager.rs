use tracing::debug;

use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::Vehicle;
use crate::reporting::ReportEvent;
use crate::state::VehicleState;
use crate::world::World;

use super::ops::{instruct_vehicles_to_dispatch_to_station, nearest_valid_station_distance};
use super::{Instruction, InstructionGenerator};

/// Sends idle or repositioning vehicles that are running low to a station.
///
/// A vehicle is a candidate when its range is at or under the soft threshold
/// and no longer covers the trip to its nearest usable station plus the
/// reserve threshold.
#[derive(Debug, Clone, Default)]
pub struct ChargingFleetManager;

impl ChargingFleetManager {
    pub fn new() -> Self {
        Self
    }

    fn is_charge_candidate(vehicle: &Vehicle, world: &World, env: &Environment) -> SimResult<bool> {
        if !matches!(vehicle.vehicle_state, VehicleState::Idle(_) | VehicleState::Repositioning(_)) {
            return Ok(false);
        }
        let dispatcher = &env.config.dispatcher;
        let range_km = env.mechatronics_for(vehicle)?.range_remaining_km(vehicle);
        if range_km > dispatcher.charging_range_km_soft_threshold {
            return Ok(false);
        }
        let station_km = nearest_valid_station_distance(world, env, vehicle, vehicle.cell())?.unwrap_or(0.0);
        Ok(dispatcher.charging_range_km_threshold + station_km >= range_km)
    }
}

impl InstructionGenerator for ChargingFleetManager {
    fn name(&self) -> &str {
        "charging_fleet_manager"
    }

    fn generate_instructions(&mut self, world: &World, env: &Environment) -> SimResult<Vec<Instruction>> {
        let mut candidates = Vec::new();
        for vehicle in world.vehicles().values() {
            if Self::is_charge_candidate(vehicle, world, env)? {
                candidates.push(vehicle);
            }
        }
        for vehicle in &candidates {
            let mechatronics = env.mechatronics_for(vehicle)?;
            env.report(
                world,
                ReportEvent::RefuelSearch {
                    vehicle_id: vehicle.id.clone(),
                    vehicle_state: vehicle.vehicle_state.kind().to_string(),
                    soc: mechatronics.state_of_charge(vehicle),
                    range_km: mechatronics.range_remaining_km(vehicle),
                },
            );
        }
        let target_soc = env.config.dispatcher.ideal_fastcharge_soc_limit;
        let instructions =
            instruct_vehicles_to_dispatch_to_station(world, env, &candidates, candidates.len(), target_soc)?;
        debug!(candidates = candidates.len(), dispatched = instructions.len(), "refuel search");
        Ok(instructions)
    }
}
