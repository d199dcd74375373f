//! Effects shared by several vehicle states.

use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{ChargerId, Passenger, RequestId, StationId, VehicleId};
use crate::reporting::ReportEvent;
use crate::roadnetwork::{traverse, Route};
use crate::world::World;

use super::VehicleState;

pub(crate) fn rejected(reason: RejectReason, detail: impl Into<String>) -> Transition {
    Ok(Outcome::rejected(reason, detail))
}

/// Stores `state` on the vehicle.
pub(crate) fn apply_new_vehicle_state(
    world: &World,
    vehicle_id: &VehicleId,
    state: VehicleState,
) -> Transition {
    let vehicle = world.get_vehicle(vehicle_id)?;
    let updated = world.modify_vehicle(vehicle.with_vehicle_state(state))?;
    Ok(Outcome::Updated(updated))
}

/// Exits `previous` then enters `next`. A rejection at either step leaves
/// the world unchanged.
pub fn transition_previous_to_next(
    world: &World,
    env: &Environment,
    previous: &VehicleState,
    next: &VehicleState,
) -> Transition {
    let exited = match previous.exit(next, world, env)? {
        Outcome::Updated(exited) => exited,
        Outcome::Rejected(rejection) => {
            debug!(
                vehicle_id = %previous.vehicle_id(),
                from = %previous.kind(),
                to = %next.kind(),
                %rejection,
                "exit rejected"
            );
            return Ok(Outcome::Rejected(rejection));
        }
    };
    match next.enter(&exited, env)? {
        Outcome::Updated(entered) => Ok(Outcome::Updated(entered)),
        Outcome::Rejected(rejection) => {
            debug!(
                vehicle_id = %previous.vehicle_id(),
                from = %previous.kind(),
                to = %next.kind(),
                %rejection,
                "enter rejected"
            );
            Ok(Outcome::Rejected(rejection))
        }
    }
}

/// Result of driving a vehicle for one timestep.
#[derive(Debug, Clone)]
pub(crate) struct MoveResult {
    pub world: World,
    pub remaining_route: Route,
    /// The vehicle ran dry and now sits in OutOfService.
    pub out_of_service: bool,
}

/// Advances a vehicle along `route` for one timestep, consuming energy.
///
/// A vehicle that runs dry leaves its current state (best effort) and enters
/// OutOfService; the caller must not write its own state back in that case.
pub(crate) fn move_vehicle(
    world: &World,
    env: &Environment,
    vehicle_id: &VehicleId,
    route: &Route,
) -> SimResult<MoveResult> {
    let vehicle = world.get_vehicle(vehicle_id)?;
    let mechatronics = env.mechatronics_for(vehicle)?;
    let traversal = traverse(route, world.timestep_seconds())
        .map_err(|e| e.context(format!("vehicle {vehicle_id} traversing route")))?;

    let Some(end_position) = traversal.experienced_route.end_position() else {
        return Ok(MoveResult {
            world: world.clone(),
            remaining_route: traversal.remaining_route,
            out_of_service: false,
        });
    };

    let energy_type = mechatronics.energy_type();
    let moved = mechatronics
        .apply_drive(vehicle, &traversal.experienced_route)
        .with_position(end_position)
        .tick_distance_traveled_km(traversal.traversal_distance_km);
    let energy_delta = moved.energy_of(energy_type) - vehicle.energy_of(energy_type);
    let moved_world = world.modify_vehicle(moved.clone())?;

    if mechatronics.is_empty(&moved) {
        warn!(%vehicle_id, state = %vehicle.vehicle_state.kind(), "vehicle ran out of energy");
        let out_of_service = VehicleState::out_of_service(vehicle_id.clone());
        let exited = match vehicle
            .vehicle_state
            .exit(&out_of_service, &moved_world, env)?
        {
            Outcome::Updated(exited) => exited,
            Outcome::Rejected(_) => moved_world,
        };
        let world = match out_of_service.enter(&exited, env)? {
            Outcome::Updated(entered) => entered,
            Outcome::Rejected(rejection) => {
                return Err(SimulationError::invalid_state(
                    vehicle_id,
                    format!("cannot enter out_of_service: {rejection}"),
                ))
            }
        };
        return Ok(MoveResult {
            world,
            remaining_route: Route::empty(),
            out_of_service: true,
        });
    }

    env.report(
        &moved_world,
        ReportEvent::VehicleMove {
            vehicle_id: vehicle_id.clone(),
            vehicle_state: vehicle.vehicle_state.kind().to_string(),
            start_cell: u64::from(vehicle.cell()),
            end_cell: u64::from(moved.cell()),
            distance_km: traversal.traversal_distance_km,
            energy_delta,
        },
    );
    Ok(MoveResult {
        world: moved_world,
        remaining_route: traversal.remaining_route,
        out_of_service: false,
    })
}

/// Per-tick effect of every state that follows a single route.
pub(crate) fn drive(world: &World, env: &Environment, state: &VehicleState) -> Transition {
    let vehicle_id = state.vehicle_id();
    let route = state.route().ok_or_else(|| {
        SimulationError::invalid_state(vehicle_id, format!("{} has no route to drive", state.kind()))
    })?;
    let moved = move_vehicle(world, env, vehicle_id, route)?;
    if moved.out_of_service {
        return Ok(Outcome::Updated(moved.world));
    }
    let next = state.with_route(moved.remaining_route).ok_or_else(|| {
        SimulationError::invalid_state(vehicle_id, format!("{} cannot carry a route", state.kind()))
    })?;
    apply_new_vehicle_state(&moved.world, vehicle_id, next)
}

/// Per-tick idle energy penalty.
pub(crate) fn idle_vehicle(world: &World, env: &Environment, vehicle_id: &VehicleId) -> SimResult<World> {
    let vehicle = world.get_vehicle(vehicle_id)?;
    let mechatronics = env.mechatronics_for(vehicle)?;
    let idled = mechatronics.apply_idle(vehicle, world.timestep_seconds());
    world.modify_vehicle(idled)
}

/// Charges a vehicle for one timestep and settles the payment with the station.
pub(crate) fn charge(
    world: &World,
    env: &Environment,
    vehicle_id: &VehicleId,
    station_id: &StationId,
    charger_id: &ChargerId,
) -> SimResult<World> {
    let vehicle = world.get_vehicle(vehicle_id)?;
    let station = world.get_station(station_id)?;
    let mechatronics = env.mechatronics_for(vehicle)?;
    let charger = station.get_charger_instance(charger_id)?;
    if mechatronics.is_full(vehicle) {
        return Err(SimulationError::invalid_state(
            vehicle_id,
            format!("charging at station {station_id} while already full"),
        ));
    }

    let applied = mechatronics.apply_charge(vehicle, charger, world.timestep_seconds());
    let price = applied.energy_delta * station.get_price(charger_id).unwrap_or(0.0);
    let charged = applied.vehicle.send_payment(price);
    let soc = mechatronics.state_of_charge(&charged);
    let paid_station = station.receive_payment(price);

    let updated = world
        .modify_vehicle(charged)?
        .modify_station(paid_station)?;
    env.report(
        &updated,
        ReportEvent::VehicleCharge {
            vehicle_id: vehicle_id.clone(),
            station_id: station_id.clone(),
            charger_id: charger_id.clone(),
            energy_delta: applied.energy_delta,
            price,
            soc,
        },
    );
    Ok(updated)
}

/// Collects the fare and removes the request from the world.
pub(crate) fn pick_up_trip(
    world: &World,
    env: &Environment,
    vehicle_id: &VehicleId,
    request_id: &RequestId,
) -> SimResult<World> {
    let vehicle = world.get_vehicle(vehicle_id)?;
    let request = world.get_request(request_id)?;
    let paid = vehicle.receive_payment(request.value);
    let updated = world.modify_vehicle(paid)?;
    env.report(
        &updated,
        ReportEvent::PickupRequest {
            vehicle_id: vehicle_id.clone(),
            request_id: request_id.clone(),
            cell: u64::from(vehicle.cell()),
            price: request.value,
            passengers: request.passenger_count(),
        },
    );
    updated.remove_request(request_id)
}

/// Checks every passenger has arrived and files the dropoff report.
pub(crate) fn drop_off_trip(
    world: &World,
    env: &Environment,
    vehicle_id: &VehicleId,
    request_id: &RequestId,
    passengers: &[Passenger],
    departure_time: u64,
) -> SimResult<World> {
    let vehicle = world.get_vehicle(vehicle_id)?;
    if let Some(passenger) = passengers
        .iter()
        .find(|p| p.destination != vehicle.cell())
    {
        return Err(SimulationError::invalid_state(
            vehicle_id,
            format!(
                "dropping off passenger {} at {} but destination is {}",
                passenger.id,
                vehicle.cell(),
                passenger.destination
            ),
        ));
    }
    env.report(
        world,
        ReportEvent::DropoffRequest {
            vehicle_id: vehicle_id.clone(),
            request_id: request_id.clone(),
            cell: u64::from(vehicle.cell()),
            passengers: passengers.len() as u32,
            departure_time,
        },
    );
    Ok(world.clone())
}

/// Assigns (or releases) requests still waiting in the world to a vehicle.
/// Requests that no longer exist are skipped.
pub(crate) fn modify_vehicle_assignment<'a, I>(
    world: &World,
    vehicle_id: &VehicleId,
    request_ids: I,
    unassign: bool,
) -> SimResult<World>
where
    I: IntoIterator<Item = &'a RequestId>,
{
    request_ids.into_iter().try_fold(world.clone(), |acc, request_id| {
        let Some(request) = acc.request(request_id) else {
            return Ok(acc);
        };
        if unassign {
            if request.dispatched_vehicle.as_ref() != Some(vehicle_id) {
                return Ok(acc);
            }
            let released = request.unassign_dispatched_vehicle();
            acc.modify_request(released)
        } else {
            let assigned = request.assign_dispatched_vehicle(vehicle_id, acc.sim_time());
            acc.modify_request(assigned)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reporting::MemoryReporter;
    use crate::state::VehicleStateKind;
    use crate::test_helpers::{
        cell_at_distance_km, mock_env, mock_request, mock_route, mock_station, mock_vehicle,
        mock_world, test_cell,
    };

    #[test]
    fn move_advances_and_reports() {
        let reporter = Arc::new(MemoryReporter::new());
        let env = mock_env().with_reporter(reporter.clone());
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .expect("add");
        let route = mock_route(test_cell(), 5.0);
        let result = move_vehicle(&world, &env, &VehicleId::from("v1"), &route).expect("move");
        assert!(!result.out_of_service);
        assert!(!result.remaining_route.is_empty());

        let moved = result.world.get_vehicle(&VehicleId::from("v1")).expect("vehicle");
        assert_ne!(moved.cell(), test_cell());
        assert!(moved.distance_traveled_km > 0.0);
        assert_eq!(reporter.reports_of_kind("vehicle_move").len(), 1);
    }

    #[test]
    fn empty_route_is_a_no_op() {
        let env = mock_env();
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .expect("add");
        let result =
            move_vehicle(&world, &env, &VehicleId::from("v1"), &Route::empty()).expect("move");
        assert!(result.remaining_route.is_empty());
        let vehicle = result.world.get_vehicle(&VehicleId::from("v1")).expect("vehicle");
        assert_eq!(vehicle.cell(), test_cell());
        assert_eq!(vehicle.distance_traveled_km, 0.0);
    }

    #[test]
    fn running_dry_goes_out_of_service() {
        let env = mock_env();
        let vehicle = mock_vehicle("v1", test_cell());
        let bev = env.mechatronics_for(&vehicle).expect("mechatronics");
        let nearly_empty = vehicle.with_energy(bev.initial_energy(0.0001));
        let world = mock_world().add_vehicle(nearly_empty).expect("add");
        let route = mock_route(test_cell(), 20.0);
        let result = move_vehicle(&world, &env, &VehicleId::from("v1"), &route).expect("move");
        assert!(result.out_of_service);
        let kind = result
            .world
            .get_vehicle(&VehicleId::from("v1"))
            .expect("vehicle")
            .vehicle_state
            .kind();
        assert_eq!(kind, VehicleStateKind::OutOfService);
    }

    #[test]
    fn pickup_pays_vehicle_and_removes_request() {
        let env = mock_env();
        let request = mock_request("r1", test_cell(), cell_at_distance_km(test_cell(), 2.0), 0)
            .with_value(12.5);
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .and_then(|w| w.add_request(request))
            .expect("setup");
        let updated =
            pick_up_trip(&world, &env, &VehicleId::from("v1"), &RequestId::from("r1")).expect("pickup");
        assert!(updated.request(&RequestId::from("r1")).is_none());
        let balance = updated.get_vehicle(&VehicleId::from("v1")).expect("vehicle").balance;
        assert_eq!(balance, 12.5);
    }

    #[test]
    fn dropoff_at_wrong_cell_is_an_error() {
        let env = mock_env();
        let request = mock_request("r1", test_cell(), cell_at_distance_km(test_cell(), 2.0), 0);
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .expect("add");
        let result = drop_off_trip(
            &world,
            &env,
            &VehicleId::from("v1"),
            &request.id,
            &request.passengers,
            0,
        );
        assert!(matches!(result, Err(SimulationError::InvalidState { .. })));
    }

    #[test]
    fn charge_moves_money_from_vehicle_to_station() {
        let env = mock_env();
        let vehicle = mock_vehicle("v1", test_cell());
        let bev = env.mechatronics_for(&vehicle).expect("mechatronics");
        let low = vehicle.with_energy(bev.initial_energy(0.2));
        let dcfc = crate::test_helpers::mock_dcfc_charger().id;
        let station = mock_station("s1", test_cell())
            .update_prices(&std::collections::BTreeMap::from([(dcfc.clone(), 0.5)]));
        let world = mock_world()
            .add_vehicle(low)
            .and_then(|w| w.add_station(station))
            .expect("setup");
        let updated = charge(
            &world,
            &env,
            &VehicleId::from("v1"),
            &StationId::from("s1"),
            &dcfc,
        )
        .expect("charge");
        let vehicle = updated.get_vehicle(&VehicleId::from("v1")).expect("vehicle");
        let station = updated.get_station(&StationId::from("s1")).expect("station");
        assert!(vehicle.balance < 0.0);
        assert!((vehicle.balance + station.balance).abs() < 1e-9);
    }
}
