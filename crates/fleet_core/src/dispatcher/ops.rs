//! Helpers shared by the bundled instruction generators and driver states.

use h3o::CellIndex;
use tracing::debug;

use crate::config::ChargingSearchType;
use crate::environment::Environment;
use crate::error::{SimResult, Transition};
use crate::mechatronics::Mechatronics;
use crate::model::{Station, StationId, Vehicle};
use crate::state::vehicle_state::ops::transition_previous_to_next;
use crate::state::VehicleStateKind;
use crate::world::World;

use super::assignment::{nearest_shortest_queue_ranking, shortest_time_to_charge_ranking, StationRanking};
use super::Instruction;

/// The vehicle may use the station and it offers at least one compatible charger.
pub fn valid_station_for_vehicle(station: &Station, vehicle: &Vehicle, mechatronics: &dyn Mechatronics) -> bool {
    station.membership.grants_access_to(&vehicle.membership)
        && station
            .charger_states()
            .any(|state| mechatronics.valid_charger(&state.charger))
}

fn rank_station(
    world: &World,
    env: &Environment,
    vehicle: &Vehicle,
    station: &Station,
    target_soc: f64,
) -> SimResult<StationRanking> {
    match env.config.dispatcher.charging_search_type {
        ChargingSearchType::NearestShortestQueue => nearest_shortest_queue_ranking(vehicle, station, env),
        ChargingSearchType::ShortestTimeToCharge => {
            shortest_time_to_charge_ranking(world, env, vehicle, station, target_soc)
        }
    }
}

/// Best ranked usable station searched outward from `origin`, with its charger.
fn best_ranked_station(
    world: &World,
    env: &Environment,
    vehicle: &Vehicle,
    origin: CellIndex,
    target_soc: f64,
) -> SimResult<Option<(StationId, StationRanking)>> {
    let mechatronics = env.mechatronics_for(vehicle)?;
    let mut ranking_error = None;
    let mut rankings = Vec::new();
    let nearest = world.station_cells().nearest_entity(
        origin,
        env.config.dispatcher.max_search_radius_km,
        |station_id| {
            let station = world.station(station_id)?;
            if ranking_error.is_some() || !valid_station_for_vehicle(station, vehicle, mechatronics) {
                return None;
            }
            match rank_station(world, env, vehicle, station, target_soc) {
                Ok(ranking) if ranking.charger_id.is_some() => {
                    let cost = ranking.cost;
                    rankings.push((station_id.clone(), ranking));
                    Some(cost)
                }
                Ok(_) => None,
                Err(e) => {
                    ranking_error = Some(e);
                    None
                }
            }
        },
    )?;
    if let Some(e) = ranking_error {
        return Err(e);
    }
    Ok(nearest.and_then(|(station_id, _)| rankings.into_iter().find(|(id, _)| *id == station_id)))
}

/// Road distance from `origin` to the best station this vehicle could charge at.
///
/// `None` when no usable station lies within the search radius.
pub fn nearest_valid_station_distance(
    world: &World,
    env: &Environment,
    vehicle: &Vehicle,
    origin: CellIndex,
) -> SimResult<Option<f64>> {
    let target_soc = env.config.dispatcher.ideal_fastcharge_soc_limit;
    let best = best_ranked_station(world, env, vehicle, origin, target_soc)?;
    Ok(best.and_then(|(station_id, _)| {
        let station = world.station(&station_id)?;
        Some(world.road_network().distance_by_cell_km(origin, station.cell()))
    }))
}

/// Sends up to `n` of `vehicles` to their best ranked station.
pub fn instruct_vehicles_to_dispatch_to_station(
    world: &World,
    env: &Environment,
    vehicles: &[&Vehicle],
    n: usize,
    target_soc: f64,
) -> SimResult<Vec<Instruction>> {
    let mut instructions = Vec::new();
    for vehicle in vehicles {
        if instructions.len() >= n {
            break;
        }
        let Some((station_id, ranking)) = best_ranked_station(world, env, vehicle, vehicle.cell(), target_soc)?
        else {
            debug!(vehicle_id = %vehicle.id, "no usable station in range");
            continue;
        };
        if let Some(charger_id) = ranking.charger_id {
            instructions.push(Instruction::DispatchStation {
                vehicle_id: vehicle.id.clone(),
                station_id,
                charger_id,
            });
        }
    }
    Ok(instructions)
}

/// A vehicle the trip dispatcher may offer a request to.
pub fn is_valid_for_dispatch(vehicle: &Vehicle, env: &Environment) -> SimResult<bool> {
    let dispatcher = &env.config.dispatcher;
    let kind = vehicle.vehicle_state.kind();
    if !dispatcher.is_valid_dispatch_state(kind) || !vehicle.driver_state.available() {
        return Ok(false);
    }
    let range_km = env.mechatronics_for(vehicle)?.range_remaining_km(vehicle);
    if range_km <= dispatcher.matching_range_km_threshold {
        return Ok(false);
    }
    let charging_low_at_base =
        kind == VehicleStateKind::ChargingBase && range_km < dispatcher.base_charging_range_km_threshold;
    Ok(!charging_low_at_base)
}

/// Builds the instruction's target state and transitions the vehicle into it.
pub fn apply_instruction(world: &World, env: &Environment, instruction: &Instruction) -> Transition {
    let result = instruction.apply(world, env)?;
    transition_previous_to_next(world, env, &result.prev_state, &result.next_state).map_err(|e| {
        e.context(format!(
            "instruction for vehicle {}: {} -> {}",
            instruction.vehicle_id(),
            result.prev_state.kind(),
            result.next_state.kind()
        ))
    })
}
