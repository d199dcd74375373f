use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{RequestId, VehicleId};
use crate::roadnetwork::Route;
use crate::world::World;

use super::ops::{apply_new_vehicle_state, drive, modify_vehicle_assignment, rejected};
use super::pooling::ServicingPoolingTrip;
use super::servicing_trip::ServicingTrip;
use super::{StateProtocol, TripPhase, VehicleState};

/// Driving to a request's origin. The request is marked as dispatched to this
/// vehicle while the state is held.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTrip {
    pub vehicle_id: VehicleId,
    pub request_id: RequestId,
    pub route: Route,
}

impl DispatchTrip {
    pub fn new(vehicle_id: VehicleId, request_id: RequestId, route: Route) -> Self {
        Self {
            vehicle_id,
            request_id,
            route,
        }
    }
}

impl StateProtocol for DispatchTrip {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let Some(request) = world.request(&self.request_id) else {
            return rejected(
                RejectReason::EntityMissing,
                format!("request {} no longer exists", self.request_id),
            );
        };
        if request
            .dispatched_vehicle
            .as_ref()
            .is_some_and(|assigned| assigned != &self.vehicle_id)
        {
            return rejected(
                RejectReason::AlreadyDispatched,
                format!("request {} is already dispatched", self.request_id),
            );
        }
        if !request.membership.grants_access_to(&vehicle.membership) {
            return rejected(
                RejectReason::MembershipMismatch,
                format!("vehicle {} cannot serve request {}", self.vehicle_id, self.request_id),
            );
        }
        if !self.route.corresponds_with(vehicle.cell(), Some(request.cell())) {
            return rejected(
                RejectReason::InvalidRoute,
                format!("route does not lead to request {}", self.request_id),
            );
        }
        let assigned = modify_vehicle_assignment(world, &self.vehicle_id, [&self.request_id], false)?;
        apply_new_vehicle_state(&assigned, &self.vehicle_id, VehicleState::DispatchTrip(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let released = modify_vehicle_assignment(world, &self.vehicle_id, [&self.request_id], true)?;
        Ok(Outcome::Updated(released))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.route.is_empty())
    }

    fn default_terminal_state(&self, world: &World, _env: &Environment) -> SimResult<VehicleState> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let Some(request) = world.request(&self.request_id) else {
            return Ok(VehicleState::idle(self.vehicle_id.clone()));
        };
        if request.cell() != vehicle.cell() {
            return Err(SimulationError::invalid_state(
                &self.vehicle_id,
                format!(
                    "dispatch to request {} ended at {} but request is at {}",
                    self.request_id,
                    vehicle.cell(),
                    request.cell()
                ),
            ));
        }
        if vehicle.driver_state.allows_pooling() && request.allows_pooling {
            let plan = vec![
                (self.request_id.clone(), TripPhase::Pickup),
                (self.request_id.clone(), TripPhase::Dropoff),
            ];
            return Ok(VehicleState::ServicingPoolingTrip(ServicingPoolingTrip::new(
                self.vehicle_id.clone(),
                plan,
            )));
        }
        let route = world.road_network().route(&request.origin, &request.destination);
        let passengers = request
            .passengers
            .iter()
            .map(|p| p.board(&self.vehicle_id))
            .collect();
        Ok(VehicleState::ServicingTrip(ServicingTrip::new(
            self.vehicle_id.clone(),
            self.request_id.clone(),
            world.sim_time(),
            route,
            passengers,
        )))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        drive(world, env, &VehicleState::DispatchTrip(self.clone()))
    }
}
