//! Pooling trips: one vehicle serving several requests along a plan of
//! pickup and dropoff stops.
//!
//! Pending pickups in the plan stay dispatched to the vehicle while either
//! state is held. Requests already aboard travel with the state in
//! `boarded_requests`, because a pickup removes the request from the world.

use im::OrdMap;
use tracing::debug;

use crate::clock::SimTime;
use crate::environment::Environment;
use crate::error::{EntityKind, Outcome, RejectReason, SimResult, SimulationError, Transition};
use crate::model::{EntityPosition, Request, RequestId, VehicleId};
use crate::roadnetwork::Route;
use crate::world::World;

use super::ops::{
    apply_new_vehicle_state, drive, drop_off_trip, modify_vehicle_assignment, move_vehicle,
    pick_up_trip, rejected, transition_previous_to_next,
};
use super::{StateProtocol, TripPhase, VehicleState, VehicleStateKind};

/// Ordered stops of a pooling trip.
pub type TripPlan = Vec<(RequestId, TripPhase)>;

fn pending_pickups(plan: &[(RequestId, TripPhase)]) -> impl Iterator<Item = &RequestId> {
    plan.iter()
        .filter(|(_, phase)| *phase == TripPhase::Pickup)
        .map(|(request_id, _)| request_id)
}

/// Where a stop happens: a waiting request's origin or a boarded request's destination.
fn stop_position(
    world: &World,
    boarded: &OrdMap<RequestId, Request>,
    stop: &(RequestId, TripPhase),
) -> Option<EntityPosition> {
    let (request_id, phase) = stop;
    match phase {
        TripPhase::Pickup => world.request(request_id).map(|r| r.origin.clone()),
        TripPhase::Dropoff => boarded
            .get(request_id)
            .or_else(|| world.request(request_id))
            .map(|r| r.destination.clone()),
    }
}

/// One route per stop, chained from `start`.
fn plan_routes(
    world: &World,
    boarded: &OrdMap<RequestId, Request>,
    start: &EntityPosition,
    plan: &[(RequestId, TripPhase)],
) -> SimResult<Vec<Route>> {
    let mut from = start.clone();
    let mut routes = Vec::with_capacity(plan.len());
    for stop in plan {
        let to = stop_position(world, boarded, stop).ok_or_else(|| {
            SimulationError::not_found(EntityKind::Request, &stop.0)
                .context("planning pooling routes")
        })?;
        routes.push(world.road_network().route(&from, &to));
        from = to;
    }
    Ok(routes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPoolingTrip {
    pub vehicle_id: VehicleId,
    pub trip_plan: TripPlan,
    /// Route to the first stop of the plan.
    pub route: Route,
    pub boarded_requests: OrdMap<RequestId, Request>,
    pub departure_times: OrdMap<RequestId, SimTime>,
    pub num_passengers: u32,
}

impl DispatchPoolingTrip {
    pub fn new(vehicle_id: VehicleId, trip_plan: TripPlan, route: Route) -> Self {
        Self {
            vehicle_id,
            trip_plan,
            route,
            boarded_requests: OrdMap::new(),
            departure_times: OrdMap::new(),
            num_passengers: 0,
        }
    }

    /// Carries passengers already aboard into a re-planned trip.
    pub fn with_boarded(mut self, previous: &ServicingPoolingTrip) -> Self {
        self.boarded_requests = previous.boarded_requests.clone();
        self.departure_times = previous.departure_times.clone();
        self.num_passengers = previous.num_passengers;
        self
    }
}

impl StateProtocol for DispatchPoolingTrip {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        let Some(first_stop) = self.trip_plan.first() else {
            return rejected(
                RejectReason::EmptyPlan,
                format!("vehicle {} given an empty pooling plan", self.vehicle_id),
            );
        };
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        for request_id in pending_pickups(&self.trip_plan) {
            let Some(request) = world.request(request_id) else {
                return rejected(
                    RejectReason::EntityMissing,
                    format!("request {request_id} no longer exists"),
                );
            };
            if !request.membership.grants_access_to(&vehicle.membership) {
                return rejected(
                    RejectReason::MembershipMismatch,
                    format!("vehicle {} cannot serve request {request_id}", self.vehicle_id),
                );
            }
            if request
                .dispatched_vehicle
                .as_ref()
                .is_some_and(|assigned| assigned != &self.vehicle_id)
            {
                return rejected(
                    RejectReason::AlreadyDispatched,
                    format!("request {request_id} is already dispatched"),
                );
            }
        }
        let Some(first_position) = stop_position(world, &self.boarded_requests, first_stop) else {
            return rejected(
                RejectReason::EntityMissing,
                format!("first stop {} of the plan is unknown", first_stop.0),
            );
        };
        if !self
            .route
            .corresponds_with(vehicle.cell(), Some(first_position.cell))
        {
            return rejected(
                RejectReason::InvalidRoute,
                format!("route does not lead to the first stop {}", first_stop.0),
            );
        }
        let assigned =
            modify_vehicle_assignment(world, &self.vehicle_id, pending_pickups(&self.trip_plan), false)?;
        apply_new_vehicle_state(
            &assigned,
            &self.vehicle_id,
            VehicleState::DispatchPoolingTrip(self.clone()),
        )
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let released =
            modify_vehicle_assignment(world, &self.vehicle_id, pending_pickups(&self.trip_plan), true)?;
        Ok(Outcome::Updated(released))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.route.is_empty())
    }

    fn default_terminal_state(&self, world: &World, _env: &Environment) -> SimResult<VehicleState> {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let arrived_at = self
            .trip_plan
            .first()
            .and_then(|stop| stop_position(world, &self.boarded_requests, stop));
        match arrived_at {
            Some(position) if position.cell != vehicle.cell() => Err(SimulationError::invalid_state(
                &self.vehicle_id,
                format!(
                    "pooling dispatch ended at {} but first stop is at {}",
                    vehicle.cell(),
                    position.cell
                ),
            )),
            // first pickup was cancelled on the way
            None if self.boarded_requests.is_empty() => Ok(VehicleState::idle(self.vehicle_id.clone())),
            _ => Ok(VehicleState::ServicingPoolingTrip(ServicingPoolingTrip {
                vehicle_id: self.vehicle_id.clone(),
                trip_plan: self.trip_plan.clone(),
                boarded_requests: self.boarded_requests.clone(),
                departure_times: self.departure_times.clone(),
                routes: Vec::new(),
                num_passengers: self.num_passengers,
            })),
        }
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        drive(world, env, &VehicleState::DispatchPoolingTrip(self.clone()))
    }
}

/// Serving a pooling plan. `routes[i]` leads to `trip_plan[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServicingPoolingTrip {
    pub vehicle_id: VehicleId,
    pub trip_plan: TripPlan,
    pub boarded_requests: OrdMap<RequestId, Request>,
    pub departure_times: OrdMap<RequestId, SimTime>,
    pub routes: Vec<Route>,
    pub num_passengers: u32,
}

impl ServicingPoolingTrip {
    /// A plan whose first stop is where the vehicle stands now; entering the
    /// state completes that stop.
    pub fn new(vehicle_id: VehicleId, trip_plan: TripPlan) -> Self {
        Self {
            vehicle_id,
            trip_plan,
            boarded_requests: OrdMap::new(),
            departure_times: OrdMap::new(),
            routes: Vec::new(),
            num_passengers: 0,
        }
    }

    pub(crate) fn with_current_route(&self, route: Route) -> Self {
        let mut routes = self.routes.clone();
        match routes.first_mut() {
            Some(current) => *current = route,
            None => routes.push(route),
        }
        Self {
            routes,
            ..self.clone()
        }
    }

    /// True when `next_plan` still drops off everyone aboard and keeps every
    /// pending stop of this plan.
    pub fn covered_by(&self, next_plan: &[(RequestId, TripPhase)]) -> bool {
        let drops_boarded = self
            .boarded_requests
            .keys()
            .all(|id| next_plan.contains(&(id.clone(), TripPhase::Dropoff)));
        let keeps_pending = self.trip_plan.iter().all(|stop| next_plan.contains(stop));
        drops_boarded && keeps_pending
    }

    /// Completes the stop at the head of the plan. A pickup whose request is
    /// gone removes both of that request's stops instead.
    fn complete_stop(&self, world: &World, env: &Environment) -> SimResult<(World, Self)> {
        let Some((request_id, phase)) = self.trip_plan.first().cloned() else {
            return Err(SimulationError::invalid_state(&self.vehicle_id, "pooling plan is empty"));
        };
        let remaining_plan: TripPlan = self.trip_plan[1..].to_vec();
        match phase {
            TripPhase::Pickup => {
                let Some(request) = world.request(&request_id).cloned() else {
                    debug!(vehicle_id = %self.vehicle_id, %request_id, "pooled request gone before pickup");
                    let trip_plan = remaining_plan
                        .into_iter()
                        .filter(|(id, _)| id != &request_id)
                        .collect();
                    return Ok((world.clone(), Self { trip_plan, ..self.clone() }));
                };
                let vehicle = world.get_vehicle(&self.vehicle_id)?;
                if request.cell() != vehicle.cell() {
                    return Err(SimulationError::invalid_state(
                        &self.vehicle_id,
                        format!("picking up {request_id} at {} but request is at {}", vehicle.cell(), request.cell()),
                    ));
                }
                let picked_up = pick_up_trip(world, env, &self.vehicle_id, &request_id)?;
                let boarded = Request {
                    passengers: request
                        .passengers
                        .iter()
                        .map(|p| p.board(&self.vehicle_id))
                        .collect(),
                    ..request.clone()
                };
                Ok((
                    picked_up,
                    Self {
                        trip_plan: remaining_plan,
                        boarded_requests: self.boarded_requests.update(request_id.clone(), boarded),
                        departure_times: self.departure_times.update(request_id, world.sim_time()),
                        num_passengers: self.num_passengers + request.passenger_count(),
                        ..self.clone()
                    },
                ))
            }
            TripPhase::Dropoff => {
                let request = self.boarded_requests.get(&request_id).ok_or_else(|| {
                    SimulationError::invalid_state(
                        &self.vehicle_id,
                        format!("dropping off {request_id} which never boarded"),
                    )
                })?;
                let departure_time = self
                    .departure_times
                    .get(&request_id)
                    .copied()
                    .unwrap_or(request.departure_time);
                let dropped = drop_off_trip(
                    world,
                    env,
                    &self.vehicle_id,
                    &request_id,
                    &request.passengers,
                    departure_time,
                )?;
                Ok((
                    dropped,
                    Self {
                        trip_plan: remaining_plan,
                        boarded_requests: self.boarded_requests.without(&request_id),
                        departure_times: self.departure_times.without(&request_id),
                        num_passengers: self.num_passengers.saturating_sub(request.passenger_count()),
                        ..self.clone()
                    },
                ))
            }
        }
    }

    /// Stores the state after a completed stop, with fresh routes for what is left.
    fn store_after_stop(&self, world: &World, env: &Environment) -> Transition {
        let (world, next) = self.complete_stop(world, env)?;
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let held = modify_vehicle_assignment(&world, &self.vehicle_id, pending_pickups(&next.trip_plan), false)?;
        let routes = plan_routes(&held, &next.boarded_requests, &vehicle.position, &next.trip_plan)?;
        apply_new_vehicle_state(
            &held,
            &self.vehicle_id,
            VehicleState::ServicingPoolingTrip(Self { routes, ..next }),
        )
    }
}

impl StateProtocol for ServicingPoolingTrip {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        let previous = vehicle.vehicle_state.kind();
        if !matches!(
            previous,
            VehicleStateKind::DispatchTrip | VehicleStateKind::DispatchPoolingTrip
        ) {
            return Err(SimulationError::InvalidTransition {
                vehicle_id: self.vehicle_id.to_string(),
                from: previous,
                to: VehicleStateKind::ServicingPoolingTrip,
                reason: "a pooling trip starts from a dispatch".to_string(),
            });
        }
        let Some((request_id, phase)) = self.trip_plan.first() else {
            return rejected(
                RejectReason::EmptyPlan,
                format!("vehicle {} given an empty pooling plan", self.vehicle_id),
            );
        };
        if *phase == TripPhase::Pickup {
            let Some(request) = world.request(request_id) else {
                return rejected(
                    RejectReason::EntityMissing,
                    format!("request {request_id} no longer exists"),
                );
            };
            if request.cell() != vehicle.cell() {
                return rejected(
                    RejectReason::NotAtLocation,
                    format!("vehicle {} is not at request {request_id}", self.vehicle_id),
                );
            }
            if !request.membership.grants_access_to(&vehicle.membership) {
                return rejected(
                    RejectReason::MembershipMismatch,
                    format!("vehicle {} cannot serve request {request_id}", self.vehicle_id),
                );
            }
        }
        self.store_after_stop(world, env)
    }

    fn exit(&self, next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        let allowed = match next {
            _ if self.trip_plan.is_empty() => true,
            VehicleState::OutOfService(_) => true,
            VehicleState::DispatchPoolingTrip(replan) => self.covered_by(&replan.trip_plan),
            _ => false,
        };
        if !allowed {
            return rejected(
                RejectReason::CannotExit,
                format!(
                    "vehicle {} has {} stops left in its pooling plan",
                    self.vehicle_id,
                    self.trip_plan.len()
                ),
            );
        }
        let released =
            modify_vehicle_assignment(world, &self.vehicle_id, pending_pickups(&self.trip_plan), true)?;
        Ok(Outcome::Updated(released))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.trip_plan.is_empty() && self.routes.iter().all(Route::is_empty))
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::idle(self.vehicle_id.clone()))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        let current = self.routes.first().cloned().unwrap_or_else(Route::empty);
        let moved = move_vehicle(world, env, &self.vehicle_id, &current)?;
        if moved.out_of_service {
            return Ok(Outcome::Updated(moved.world));
        }
        if !moved.remaining_route.is_empty() {
            return apply_new_vehicle_state(
                &moved.world,
                &self.vehicle_id,
                VehicleState::ServicingPoolingTrip(self.with_current_route(moved.remaining_route)),
            );
        }

        let stored = match self.store_after_stop(&moved.world, env)? {
            Outcome::Updated(stored) => stored,
            rejection @ Outcome::Rejected(_) => return Ok(rejection),
        };
        let state = stored.get_vehicle(&self.vehicle_id)?.vehicle_state.clone();
        match &state {
            VehicleState::ServicingPoolingTrip(s) if s.trip_plan.is_empty() => {
                let idle = VehicleState::idle(self.vehicle_id.clone());
                match transition_previous_to_next(&stored, env, &state, &idle)? {
                    Outcome::Updated(idled) => Ok(Outcome::Updated(idled)),
                    Outcome::Rejected(_) => Ok(Outcome::Updated(stored)),
                }
            }
            _ => Ok(Outcome::Updated(stored)),
        }
    }
}
