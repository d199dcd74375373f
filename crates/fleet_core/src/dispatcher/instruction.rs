//! One-step directives from a policy to a vehicle.

use serde::Serialize;

use crate::environment::Environment;
use crate::error::{SimResult, SimulationError};
use crate::model::{BaseId, ChargerId, EntityPosition, LinkId, RequestId, StationId, VehicleId};
use crate::state::vehicle_state::{
    ChargingBase, ChargingStation, DispatchBase, DispatchPoolingTrip, DispatchStation, DispatchTrip,
    Repositioning, ReserveBase, TripPlan,
};
use crate::state::{TripPhase, VehicleState};
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "instruction_type", rename_all = "snake_case")]
pub enum Instruction {
    Idle {
        vehicle_id: VehicleId,
    },
    DispatchTrip {
        vehicle_id: VehicleId,
        request_id: RequestId,
    },
    DispatchPoolingTrip {
        vehicle_id: VehicleId,
        trip_plan: TripPlan,
    },
    DispatchStation {
        vehicle_id: VehicleId,
        station_id: StationId,
        charger_id: ChargerId,
    },
    ChargeStation {
        vehicle_id: VehicleId,
        station_id: StationId,
        charger_id: ChargerId,
    },
    ChargeBase {
        vehicle_id: VehicleId,
        base_id: BaseId,
        charger_id: ChargerId,
    },
    DispatchBase {
        vehicle_id: VehicleId,
        base_id: BaseId,
    },
    Reposition {
        vehicle_id: VehicleId,
        destination: LinkId,
    },
    ReserveBase {
        vehicle_id: VehicleId,
        base_id: BaseId,
    },
}

/// The transition an instruction asks for. Nothing has been exited or
/// entered yet.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionResult {
    pub prev_state: VehicleState,
    pub next_state: VehicleState,
}

impl Instruction {
    pub fn vehicle_id(&self) -> &VehicleId {
        match self {
            Instruction::Idle { vehicle_id }
            | Instruction::DispatchTrip { vehicle_id, .. }
            | Instruction::DispatchPoolingTrip { vehicle_id, .. }
            | Instruction::DispatchStation { vehicle_id, .. }
            | Instruction::ChargeStation { vehicle_id, .. }
            | Instruction::ChargeBase { vehicle_id, .. }
            | Instruction::DispatchBase { vehicle_id, .. }
            | Instruction::Reposition { vehicle_id, .. }
            | Instruction::ReserveBase { vehicle_id, .. } => vehicle_id,
        }
    }

    /// Builds the state this instruction moves the vehicle into, routed from
    /// where the vehicle stands in `world`.
    pub fn apply(&self, world: &World, _env: &Environment) -> SimResult<InstructionResult> {
        let vehicle = world.get_vehicle(self.vehicle_id())?;
        let vehicle_id = vehicle.id.clone();
        let network = world.road_network();
        let next_state = match self {
            Instruction::Idle { .. } => VehicleState::idle(vehicle_id),
            Instruction::DispatchTrip { request_id, .. } => {
                let request = world.request(request_id).ok_or_else(|| {
                    SimulationError::invalid_instruction(&vehicle_id, format!("request {request_id} not found"))
                })?;
                let route = network.route(&vehicle.position, &request.origin);
                VehicleState::DispatchTrip(DispatchTrip::new(vehicle_id, request_id.clone(), route))
            }
            Instruction::DispatchPoolingTrip { trip_plan, .. } => {
                validate_trip_plan(world, &vehicle_id, trip_plan)?;
                let boarded = match &vehicle.vehicle_state {
                    VehicleState::ServicingPoolingTrip(current) => Some(current),
                    _ => None,
                };
                let first_stop = match trip_plan.first() {
                    Some((request_id, TripPhase::Pickup)) => world.request(request_id).map(|r| r.origin.clone()),
                    Some((request_id, TripPhase::Dropoff)) => boarded
                        .and_then(|current| current.boarded_requests.get(request_id))
                        .map(|r| r.destination.clone()),
                    None => None,
                }
                .ok_or_else(|| SimulationError::invalid_instruction(&vehicle_id, "pooling plan has no reachable first stop"))?;
                let route = network.route(&vehicle.position, &first_stop);
                let state = DispatchPoolingTrip::new(vehicle_id, trip_plan.clone(), route);
                VehicleState::DispatchPoolingTrip(match boarded {
                    Some(current) => state.with_boarded(current),
                    None => state,
                })
            }
            Instruction::DispatchStation { station_id, charger_id, .. } => {
                let station = world.get_station(station_id)?;
                let route = network.route(&vehicle.position, &station.position);
                VehicleState::DispatchStation(DispatchStation::new(
                    vehicle_id,
                    station_id.clone(),
                    charger_id.clone(),
                    route,
                ))
            }
            Instruction::ChargeStation { station_id, charger_id, .. } => VehicleState::ChargingStation(
                ChargingStation::new(vehicle_id, station_id.clone(), charger_id.clone()),
            ),
            Instruction::ChargeBase { base_id, charger_id, .. } => {
                VehicleState::ChargingBase(ChargingBase::new(vehicle_id, base_id.clone(), charger_id.clone()))
            }
            Instruction::DispatchBase { base_id, .. } => {
                let base = world.get_base(base_id)?;
                let route = network.route(&vehicle.position, &base.position);
                VehicleState::DispatchBase(DispatchBase::new(vehicle_id, base_id.clone(), route))
            }
            Instruction::Reposition { destination, .. } => {
                let link = network.link_from_link_id(destination).ok_or_else(|| {
                    SimulationError::Routing(format!("unknown link {destination} for vehicle {vehicle_id}"))
                })?;
                let target = EntityPosition::new(destination.clone(), link.end);
                let route = network.route(&vehicle.position, &target);
                VehicleState::Repositioning(Repositioning::new(vehicle_id, route))
            }
            Instruction::ReserveBase { base_id, .. } => {
                VehicleState::ReserveBase(ReserveBase::new(vehicle_id, base_id.clone()))
            }
        };
        Ok(InstructionResult {
            prev_state: vehicle.vehicle_state.clone(),
            next_state,
        })
    }
}

/// Checks a pooling plan against the vehicle and the requests it names.
///
/// Every request must be picked up before it is dropped off and dropped off
/// before the plan ends, seats must never be exceeded, every request and the
/// driver must accept pooling, and a vehicle already serving a plan must keep
/// its passengers and pending stops.
fn validate_trip_plan(world: &World, vehicle_id: &VehicleId, trip_plan: &TripPlan) -> SimResult<()> {
    let invalid = |reason: String| SimulationError::invalid_instruction(vehicle_id, reason);
    let vehicle = world.get_vehicle(vehicle_id)?;
    if !vehicle.driver_state.allows_pooling() {
        return Err(invalid("driver does not accept pooling".to_string()));
    }
    let current = match &vehicle.vehicle_state {
        VehicleState::ServicingPoolingTrip(current) => Some(current),
        _ => None,
    };
    if let Some(current) = current {
        if !current.covered_by(trip_plan) {
            return Err(invalid("plan drops stops of the trip in progress".to_string()));
        }
    }

    let mut aboard: Vec<&RequestId> = current
        .map(|c| c.boarded_requests.keys().collect())
        .unwrap_or_default();
    let mut seats_taken = current.map_or(0, |c| c.num_passengers);
    for (request_id, phase) in trip_plan {
        match phase {
            TripPhase::Pickup => {
                let request = world
                    .request(request_id)
                    .ok_or_else(|| invalid(format!("request {request_id} not found")))?;
                if !request.allows_pooling {
                    return Err(invalid(format!("request {request_id} does not allow pooling")));
                }
                if aboard.contains(&request_id) {
                    return Err(invalid(format!("request {request_id} is picked up twice")));
                }
                seats_taken += request.passenger_count();
                if seats_taken > vehicle.total_seats {
                    return Err(invalid(format!(
                        "plan needs {seats_taken} seats but vehicle has {}",
                        vehicle.total_seats
                    )));
                }
                aboard.push(request_id);
            }
            TripPhase::Dropoff => {
                let position = aboard
                    .iter()
                    .position(|id| *id == request_id)
                    .ok_or_else(|| invalid(format!("request {request_id} dropped off before pickup")))?;
                aboard.remove(position);
                let passengers = world
                    .request(request_id)
                    .map(|r| r.passenger_count())
                    .or_else(|| {
                        current
                            .and_then(|c| c.boarded_requests.get(request_id))
                            .map(|r| r.passenger_count())
                    })
                    .unwrap_or(0);
                seats_taken = seats_taken.saturating_sub(passengers);
            }
        }
    }
    if let Some(left) = aboard.first() {
        return Err(invalid(format!("request {left} is never dropped off")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VehicleStateKind;
    use crate::test_helpers::{
        cell_at_distance_km, mock_base, mock_env, mock_request, mock_station, mock_vehicle, mock_world,
        test_cell,
    };

    fn world() -> World {
        let away = cell_at_distance_km(test_cell(), 2.0);
        mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .and_then(|w| w.add_request(mock_request("r1", away, test_cell(), 0).with_pooling(true)))
            .and_then(|w| w.add_request(mock_request("r2", away, test_cell(), 0).with_passenger_count(4).with_pooling(true)))
            .and_then(|w| w.add_station(mock_station("s1", away)))
            .and_then(|w| w.add_base(mock_base("b1", away, 1)))
            .expect("setup")
    }

    #[test]
    fn dispatch_instructions_route_to_their_target() {
        let env = mock_env();
        let world = world();
        let vehicle_id = VehicleId::from("v1");
        let trip = Instruction::DispatchTrip {
            vehicle_id: vehicle_id.clone(),
            request_id: RequestId::from("r1"),
        };
        let result = trip.apply(&world, &env).expect("apply");
        assert_eq!(result.prev_state.kind(), VehicleStateKind::Idle);
        let route = result.next_state.route().expect("dispatch has a route");
        assert!(route.corresponds_with(test_cell(), Some(cell_at_distance_km(test_cell(), 2.0))));

        let base = Instruction::DispatchBase {
            vehicle_id: vehicle_id.clone(),
            base_id: BaseId::from("b1"),
        };
        assert_eq!(
            base.apply(&world, &env).expect("apply").next_state.kind(),
            VehicleStateKind::DispatchBase
        );

        let missing = Instruction::DispatchTrip {
            vehicle_id,
            request_id: RequestId::from("nope"),
        };
        assert!(matches!(
            missing.apply(&world, &env),
            Err(SimulationError::InvalidInstruction { .. })
        ));
    }

    #[test]
    fn reposition_follows_the_destination_link() {
        let env = mock_env();
        let world = world();
        let target = cell_at_distance_km(test_cell(), 1.0);
        let instruction = Instruction::Reposition {
            vehicle_id: VehicleId::from("v1"),
            destination: world.road_network().position_from_cell(target).link_id,
        };
        let next = instruction.apply(&world, &env).expect("apply").next_state;
        assert_eq!(next.kind(), VehicleStateKind::Repositioning);
        assert!(next.route().is_some_and(|r| r.corresponds_with(test_cell(), Some(target))));
    }

    #[test]
    fn pooling_plans_are_validated() {
        let world = world();
        let vehicle_id = VehicleId::from("v1");
        let r1 = || RequestId::from("r1");
        let r2 = || RequestId::from("r2");

        let valid = vec![(r1(), TripPhase::Pickup), (r1(), TripPhase::Dropoff)];
        assert!(validate_trip_plan(&world, &vehicle_id, &valid).is_ok());

        let dropoff_first = vec![(r1(), TripPhase::Dropoff), (r1(), TripPhase::Pickup)];
        assert!(validate_trip_plan(&world, &vehicle_id, &dropoff_first).is_err());

        let abandoned = vec![(r1(), TripPhase::Pickup)];
        assert!(validate_trip_plan(&world, &vehicle_id, &abandoned).is_err());

        let overbooked = vec![
            (r1(), TripPhase::Pickup),
            (r2(), TripPhase::Pickup),
            (r1(), TripPhase::Dropoff),
            (r2(), TripPhase::Dropoff),
        ];
        assert!(validate_trip_plan(&world, &vehicle_id, &overbooked).is_err());

        let sequential = vec![
            (r1(), TripPhase::Pickup),
            (r1(), TripPhase::Dropoff),
            (r2(), TripPhase::Pickup),
            (r2(), TripPhase::Dropoff),
        ];
        assert!(validate_trip_plan(&world, &vehicle_id, &sequential).is_ok());
    }

    #[test]
    fn serializes_with_instruction_type_tag() {
        let instruction = Instruction::ReserveBase {
            vehicle_id: VehicleId::from("v1"),
            base_id: BaseId::from("b1"),
        };
        let json = serde_json::to_value(&instruction).expect("serialize");
        assert_eq!(json["instruction_type"], "reserve_base");
        assert_eq!(json["base_id"], "b1");
    }
}
