use tracing::error;

use crate::dispatcher::Instruction;
use crate::environment::Environment;
use crate::error::{Outcome, SimResult, Transition};
use crate::model::{Base, Charger, Vehicle, VehicleId};
use crate::world::World;

use super::DriverState;

pub(super) fn apply_new_driver_state(world: &World, vehicle_id: &VehicleId, state: DriverState) -> Transition {
    let vehicle = world.get_vehicle(vehicle_id)?;
    let updated = world.modify_vehicle(vehicle.with_driver_state(state))?;
    Ok(Outcome::Updated(updated))
}

/// The slowest charger at the base's station that the vehicle can use.
fn lowest_rate_charger(vehicle: &Vehicle, base: &Base, world: &World, env: &Environment) -> SimResult<Option<Charger>> {
    let Some(station_id) = &base.station_id else {
        return Ok(None);
    };
    let Some(station) = world.station(station_id) else {
        error!(base_id = %base.id, %station_id, "base references a missing station");
        return Ok(None);
    };
    let mechatronics = env.mechatronics_for(vehicle)?;
    let slowest = station
        .charger_states()
        .map(|state| &state.charger)
        .filter(|charger| mechatronics.valid_charger(charger))
        .min_by(|a, b| a.rate.total_cmp(&b.rate).then_with(|| a.id.cmp(&b.id)))
        .cloned();
    Ok(slowest)
}

/// Plugs in at the base using its slowest compatible charger.
pub(super) fn charge_at_base(
    vehicle: &Vehicle,
    base: &Base,
    world: &World,
    env: &Environment,
) -> SimResult<Option<Instruction>> {
    let charger = lowest_rate_charger(vehicle, base, world, env)?;
    Ok(charger.map(|charger| Instruction::ChargeBase {
        vehicle_id: vehicle.id.clone(),
        base_id: base.id.clone(),
        charger_id: charger.id,
    }))
}

/// Repositions toward the search cell holding the most requests.
pub(super) fn look_for_requests(vehicle: &Vehicle, world: &World) -> Option<Instruction> {
    let (busiest, _) = world
        .request_cells()
        .search_cells()
        .iter()
        .max_by(|(cell_a, a), (cell_b, b)| a.len().cmp(&b.len()).then_with(|| cell_b.cmp(cell_a)))?;
    let destination = busiest.center_child(world.location_resolution())?;
    if destination == vehicle.cell() {
        return None;
    }
    Some(Instruction::Reposition {
        vehicle_id: vehicle.id.clone(),
        destination: world.road_network().position_from_cell(destination).link_id,
    })
}

/// Stops fast charging once the vehicle reaches the ideal limit.
pub(super) fn idle_if_at_soc_limit(vehicle: &Vehicle, env: &Environment) -> SimResult<Option<Instruction>> {
    let mechatronics = env.mechatronics_for(vehicle)?;
    let at_limit = mechatronics.state_of_charge(vehicle) >= env.config.dispatcher.ideal_fastcharge_soc_limit;
    Ok(at_limit.then(|| Instruction::Idle {
        vehicle_id: vehicle.id.clone(),
    }))
}
