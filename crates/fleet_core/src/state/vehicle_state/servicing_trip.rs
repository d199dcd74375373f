use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, Transition};
use crate::model::{Passenger, RequestId, VehicleId};
use crate::roadnetwork::Route;
use crate::world::World;

use super::ops::{apply_new_vehicle_state, drive, drop_off_trip, pick_up_trip, rejected};
use super::{StateProtocol, VehicleState};

/// Carrying passengers of a single request to its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct ServicingTrip {
    pub vehicle_id: VehicleId,
    pub request_id: RequestId,
    pub departure_time: u64,
    pub route: Route,
    pub passengers: Vec<Passenger>,
}

impl ServicingTrip {
    pub fn new(
        vehicle_id: VehicleId,
        request_id: RequestId,
        departure_time: u64,
        route: Route,
        passengers: Vec<Passenger>,
    ) -> Self {
        Self {
            vehicle_id,
            request_id,
            departure_time,
            route,
            passengers,
        }
    }
}

impl StateProtocol for ServicingTrip {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    /// Picks up the request: the fare is paid and the request leaves the world.
    fn enter(&self, world: &World, env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let Some(request) = world.request(&self.request_id) else {
            return rejected(
                RejectReason::EntityMissing,
                format!("request {} no longer exists", self.request_id),
            );
        };
        if request.cell() != vehicle.cell() {
            return rejected(
                RejectReason::NotAtLocation,
                format!("vehicle {} is not at request {}", self.vehicle_id, self.request_id),
            );
        }
        if !request.membership.grants_access_to(&vehicle.membership) {
            return rejected(
                RejectReason::MembershipMismatch,
                format!("vehicle {} cannot serve request {}", self.vehicle_id, self.request_id),
            );
        }
        if !self
            .route
            .corresponds_with(request.origin.cell, Some(request.destination.cell))
        {
            return rejected(
                RejectReason::InvalidRoute,
                format!("route does not serve request {}", self.request_id),
            );
        }
        let picked_up = pick_up_trip(world, env, &self.vehicle_id, &self.request_id)?;
        apply_new_vehicle_state(&picked_up, &self.vehicle_id, VehicleState::ServicingTrip(self.clone()))
    }

    /// Only possible once the destination is reached, unless the vehicle ran dry.
    fn exit(&self, next: &VehicleState, world: &World, env: &Environment) -> Transition {
        if !self.route.is_empty() {
            if matches!(next, VehicleState::OutOfService(_)) {
                return Ok(Outcome::Updated(world.clone()));
            }
            return rejected(
                RejectReason::CannotExit,
                format!("vehicle {} still has passengers aboard", self.vehicle_id),
            );
        }
        let dropped = drop_off_trip(
            world,
            env,
            &self.vehicle_id,
            &self.request_id,
            &self.passengers,
            self.departure_time,
        )?;
        Ok(Outcome::Updated(dropped))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.route.is_empty())
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::idle(self.vehicle_id.clone()))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        drive(world, env, &VehicleState::ServicingTrip(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{cell_at_distance_km, mock_env, mock_request, mock_vehicle, mock_world, test_cell};

    #[test]
    fn cannot_exit_mid_trip() {
        let env = mock_env();
        let destination = cell_at_distance_km(test_cell(), 4.0);
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .and_then(|w| w.add_request(mock_request("r1", test_cell(), destination, 0)))
            .expect("setup");
        let request = world.get_request(&RequestId::from("r1")).expect("request").clone();
        let route = world.road_network().route(&request.origin, &request.destination);
        let state = ServicingTrip::new(
            VehicleId::from("v1"),
            RequestId::from("r1"),
            0,
            route,
            request.passengers.clone(),
        );
        let entered = state.enter(&world, &env).expect("enter").updated().expect("entered");
        assert!(entered.request(&RequestId::from("r1")).is_none());

        let idle = VehicleState::idle(VehicleId::from("v1"));
        let result = state.exit(&idle, &entered, &env).expect("exit");
        assert_eq!(result.rejection().map(|r| r.reason), Some(RejectReason::CannotExit));
    }
}
