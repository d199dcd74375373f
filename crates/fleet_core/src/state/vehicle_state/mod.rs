//! The vehicle state machine.
//!
//! Every vehicle carries exactly one [`VehicleState`]. All states follow the
//! same protocol:
//!
//! - **enter**: acquire what the state needs (charger, stall, request assignment);
//!   an expected failure is a rejection, not an error
//! - **exit**: release what the state holds
//! - **update**: one timestep. When the state's task is complete it exits, enters
//!   its default successor and updates that successor within the same step;
//!   otherwise it performs its own per-tick effect (drive, charge, idle)
//!
//! States only change through [`ops::transition_previous_to_next`] or the
//! update cascade; nothing writes a vehicle's state directly.

mod charge_queueing;
mod charging_base;
mod charging_station;
mod dispatch_base;
mod dispatch_station;
mod dispatch_trip;
mod idle;
mod out_of_service;
mod pooling;
mod repositioning;
mod reserve_base;
mod servicing_trip;

pub mod ops;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::environment::Environment;
use crate::error::{Outcome, SimResult, SimulationError, Transition};
use crate::model::VehicleId;
use crate::roadnetwork::Route;
use crate::world::World;

pub use charge_queueing::ChargeQueueing;
pub use charging_base::ChargingBase;
pub use charging_station::ChargingStation;
pub use dispatch_base::DispatchBase;
pub use dispatch_station::DispatchStation;
pub use dispatch_trip::DispatchTrip;
pub use idle::Idle;
pub use out_of_service::OutOfService;
pub use pooling::{DispatchPoolingTrip, ServicingPoolingTrip, TripPlan};
pub use repositioning::Repositioning;
pub use reserve_base::ReserveBase;
pub use servicing_trip::ServicingTrip;

/// Terminal transitions chained within one update never exceed this depth.
const MAX_CASCADE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStateKind {
    Idle,
    Repositioning,
    DispatchTrip,
    ServicingTrip,
    DispatchPoolingTrip,
    ServicingPoolingTrip,
    DispatchStation,
    ChargingStation,
    ChargeQueueing,
    DispatchBase,
    ChargingBase,
    ReserveBase,
    OutOfService,
}

impl VehicleStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStateKind::Idle => "idle",
            VehicleStateKind::Repositioning => "repositioning",
            VehicleStateKind::DispatchTrip => "dispatch_trip",
            VehicleStateKind::ServicingTrip => "servicing_trip",
            VehicleStateKind::DispatchPoolingTrip => "dispatch_pooling_trip",
            VehicleStateKind::ServicingPoolingTrip => "servicing_pooling_trip",
            VehicleStateKind::DispatchStation => "dispatch_station",
            VehicleStateKind::ChargingStation => "charging_station",
            VehicleStateKind::ChargeQueueing => "charge_queueing",
            VehicleStateKind::DispatchBase => "dispatch_base",
            VehicleStateKind::ChargingBase => "charging_base",
            VehicleStateKind::ReserveBase => "reserve_base",
            VehicleStateKind::OutOfService => "out_of_service",
        }
    }
}

impl fmt::Display for VehicleStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Stage of a request within a pooling trip plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    Pickup,
    Dropoff,
}

/// Per-state half of the protocol. [`VehicleState`] supplies the update template.
pub(crate) trait StateProtocol {
    fn vehicle_id(&self) -> &VehicleId;

    fn enter(&self, world: &World, env: &Environment) -> Transition;

    fn exit(&self, next: &VehicleState, world: &World, env: &Environment) -> Transition;

    fn has_reached_terminal_condition(&self, world: &World, env: &Environment) -> SimResult<bool>;

    fn default_terminal_state(&self, world: &World, env: &Environment) -> SimResult<VehicleState>;

    fn perform_update(&self, world: &World, env: &Environment) -> Transition;
}

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleState {
    Idle(Idle),
    Repositioning(Repositioning),
    DispatchTrip(DispatchTrip),
    ServicingTrip(ServicingTrip),
    DispatchPoolingTrip(DispatchPoolingTrip),
    ServicingPoolingTrip(ServicingPoolingTrip),
    DispatchStation(DispatchStation),
    ChargingStation(ChargingStation),
    ChargeQueueing(ChargeQueueing),
    DispatchBase(DispatchBase),
    ChargingBase(ChargingBase),
    ReserveBase(ReserveBase),
    OutOfService(OutOfService),
}

impl VehicleState {
    pub fn idle(vehicle_id: VehicleId) -> Self {
        VehicleState::Idle(Idle::new(vehicle_id))
    }

    pub fn out_of_service(vehicle_id: VehicleId) -> Self {
        VehicleState::OutOfService(OutOfService::new(vehicle_id))
    }

    pub fn kind(&self) -> VehicleStateKind {
        match self {
            VehicleState::Idle(_) => VehicleStateKind::Idle,
            VehicleState::Repositioning(_) => VehicleStateKind::Repositioning,
            VehicleState::DispatchTrip(_) => VehicleStateKind::DispatchTrip,
            VehicleState::ServicingTrip(_) => VehicleStateKind::ServicingTrip,
            VehicleState::DispatchPoolingTrip(_) => VehicleStateKind::DispatchPoolingTrip,
            VehicleState::ServicingPoolingTrip(_) => VehicleStateKind::ServicingPoolingTrip,
            VehicleState::DispatchStation(_) => VehicleStateKind::DispatchStation,
            VehicleState::ChargingStation(_) => VehicleStateKind::ChargingStation,
            VehicleState::ChargeQueueing(_) => VehicleStateKind::ChargeQueueing,
            VehicleState::DispatchBase(_) => VehicleStateKind::DispatchBase,
            VehicleState::ChargingBase(_) => VehicleStateKind::ChargingBase,
            VehicleState::ReserveBase(_) => VehicleStateKind::ReserveBase,
            VehicleState::OutOfService(_) => VehicleStateKind::OutOfService,
        }
    }

    fn protocol(&self) -> &dyn StateProtocol {
        match self {
            VehicleState::Idle(s) => s,
            VehicleState::Repositioning(s) => s,
            VehicleState::DispatchTrip(s) => s,
            VehicleState::ServicingTrip(s) => s,
            VehicleState::DispatchPoolingTrip(s) => s,
            VehicleState::ServicingPoolingTrip(s) => s,
            VehicleState::DispatchStation(s) => s,
            VehicleState::ChargingStation(s) => s,
            VehicleState::ChargeQueueing(s) => s,
            VehicleState::DispatchBase(s) => s,
            VehicleState::ChargingBase(s) => s,
            VehicleState::ReserveBase(s) => s,
            VehicleState::OutOfService(s) => s,
        }
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        self.protocol().vehicle_id()
    }

    pub fn enter(&self, world: &World, env: &Environment) -> Transition {
        self.protocol().enter(world, env)
    }

    pub fn exit(&self, next: &VehicleState, world: &World, env: &Environment) -> Transition {
        self.protocol().exit(next, world, env)
    }

    pub fn has_reached_terminal_condition(&self, world: &World, env: &Environment) -> SimResult<bool> {
        self.protocol().has_reached_terminal_condition(world, env)
    }

    /// Advances this vehicle by one timestep.
    pub fn update(&self, world: &World, env: &Environment) -> Transition {
        self.update_with_depth(world, env, 0)
    }

    fn update_with_depth(&self, world: &World, env: &Environment, depth: usize) -> Transition {
        let state = self.protocol();
        if !state.has_reached_terminal_condition(world, env)? {
            return state.perform_update(world, env);
        }
        if depth >= MAX_CASCADE_DEPTH {
            return Err(SimulationError::invalid_state(
                self.vehicle_id(),
                format!("terminal transitions from {} did not settle", self.kind()),
            ));
        }

        let next = state.default_terminal_state(world, env)?;
        let transitioned = match ops::transition_previous_to_next(world, env, self, &next)
            .map_err(|e| {
                e.context(format!(
                    "vehicle {}: terminal transition {} -> {}",
                    self.vehicle_id(),
                    self.kind(),
                    next.kind()
                ))
            })? {
            Outcome::Updated(world) => world,
            Outcome::Rejected(rejection) if next.kind() == VehicleStateKind::Idle => {
                return Ok(Outcome::Rejected(rejection))
            }
            Outcome::Rejected(rejection) => {
                // a refused follow-on state falls back to Idle
                debug!(vehicle_id = %self.vehicle_id(), next = %next.kind(), %rejection, "default state refused");
                let idle = VehicleState::idle(self.vehicle_id().clone());
                match ops::transition_previous_to_next(world, env, self, &idle)? {
                    Outcome::Updated(world) => world,
                    Outcome::Rejected(rejection) => return Ok(Outcome::Rejected(rejection)),
                }
            }
        };

        // enter may have reshaped the successor, so update the stored copy
        let current = transitioned
            .get_vehicle(self.vehicle_id())?
            .vehicle_state
            .clone();
        match current.update_with_depth(&transitioned, env, depth + 1)? {
            Outcome::Updated(updated) => Ok(Outcome::Updated(updated)),
            Outcome::Rejected(_) => Ok(Outcome::Updated(transitioned)),
        }
    }

    /// The route currently being driven, for states that drive.
    pub fn route(&self) -> Option<&Route> {
        match self {
            VehicleState::Repositioning(s) => Some(&s.route),
            VehicleState::DispatchTrip(s) => Some(&s.route),
            VehicleState::ServicingTrip(s) => Some(&s.route),
            VehicleState::DispatchPoolingTrip(s) => Some(&s.route),
            VehicleState::ServicingPoolingTrip(s) => s.routes.first(),
            VehicleState::DispatchStation(s) => Some(&s.route),
            VehicleState::DispatchBase(s) => Some(&s.route),
            _ => None,
        }
    }

    /// Same state with its current route replaced; `None` for states without one.
    pub fn with_route(&self, route: Route) -> Option<VehicleState> {
        let updated = match self {
            VehicleState::Repositioning(s) => VehicleState::Repositioning(Repositioning { route, ..s.clone() }),
            VehicleState::DispatchTrip(s) => VehicleState::DispatchTrip(DispatchTrip { route, ..s.clone() }),
            VehicleState::ServicingTrip(s) => VehicleState::ServicingTrip(ServicingTrip { route, ..s.clone() }),
            VehicleState::DispatchPoolingTrip(s) => {
                VehicleState::DispatchPoolingTrip(DispatchPoolingTrip { route, ..s.clone() })
            }
            VehicleState::ServicingPoolingTrip(s) => {
                VehicleState::ServicingPoolingTrip(s.with_current_route(route))
            }
            VehicleState::DispatchStation(s) => VehicleState::DispatchStation(DispatchStation { route, ..s.clone() }),
            VehicleState::DispatchBase(s) => VehicleState::DispatchBase(DispatchBase { route, ..s.clone() }),
            _ => return None,
        };
        Some(updated)
    }

    /// Enqueue time of a queueing vehicle, used to order queue service.
    pub fn enqueue_time(&self) -> Option<u64> {
        match self {
            VehicleState::ChargeQueueing(s) => Some(s.enqueue_time),
            _ => None,
        }
    }
}
