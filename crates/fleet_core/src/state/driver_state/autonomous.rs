use crate::dispatcher::Instruction;
use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::VehicleId;
use crate::state::VehicleState;
use crate::world::World;

use super::ops::{charge_at_base, idle_if_at_soc_limit};

/// Autonomous vehicles top up while parked at a base, head to the nearest
/// base after idling too long and stop fast charging at the ideal limit.
pub(super) fn generate_instruction(
    vehicle_id: &VehicleId,
    world: &World,
    env: &Environment,
) -> SimResult<Option<Instruction>> {
    let vehicle = world.get_vehicle(vehicle_id)?;
    match &vehicle.vehicle_state {
        VehicleState::ReserveBase(state) => {
            let mechatronics = env.mechatronics_for(vehicle)?;
            if mechatronics.is_full(vehicle) {
                return Ok(None);
            }
            let base = world.get_base(&state.base_id)?;
            charge_at_base(vehicle, base, world, env)
        }
        VehicleState::Idle(state) if state.idle_duration > env.config.dispatcher.idle_time_out_seconds => {
            let base = world.nearest_base(
                vehicle.cell(),
                env.config.dispatcher.max_search_radius_km,
                |base| base.has_available_stall(&vehicle.membership),
            )?;
            Ok(base.map(|base| Instruction::DispatchBase {
                vehicle_id: vehicle_id.clone(),
                base_id: base.id.clone(),
            }))
        }
        VehicleState::ChargingStation(_) => idle_if_at_soc_limit(vehicle, env),
        _ => Ok(None),
    }
}
