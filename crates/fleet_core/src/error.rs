//! Error and outcome types shared by every mutating operation.
//!
//! Operations that change the world report one of three results:
//!
//! - `Err(SimulationError)`: an invariant violation that must surface to the caller
//! - `Ok(Outcome::Updated(world))`: the new world
//! - `Ok(Outcome::Rejected(rejection))`: an expected, recoverable no-op
//!   (charger busy, vehicle not at the target, membership mismatch, ...)

use std::fmt;

use h3o::CellIndex;
use thiserror::Error;

use crate::state::VehicleStateKind;
use crate::world::World;

/// Kinds of entities addressed by id in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Vehicle,
    Request,
    Station,
    Base,
    Charger,
    Mechatronics,
    Schedule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vehicle => "vehicle",
            EntityKind::Request => "request",
            EntityKind::Station => "station",
            EntityKind::Base => "base",
            EntityKind::Charger => "charger",
            EntityKind::Mechatronics => "mechatronics",
            EntityKind::Schedule => "schedule",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} {id} already exists")]
    Duplicate { kind: EntityKind, id: String },

    #[error("{kind} {id} at cell {cell} is outside the road network geofence")]
    OutsideGeofence {
        kind: EntityKind,
        id: String,
        cell: CellIndex,
    },

    #[error("{kind} {id} cannot be relocated from {from} to {to}")]
    IllegalRelocation {
        kind: EntityKind,
        id: String,
        from: CellIndex,
        to: CellIndex,
    },

    #[error("resource overflow at {owner}: {message}")]
    ResourceOverflow { owner: String, message: String },

    #[error("resource underflow at {owner}: {message}")]
    ResourceUnderflow { owner: String, message: String },

    #[error("cell {cell} has resolution {actual}, expected at least {expected}")]
    ResolutionMismatch {
        cell: CellIndex,
        actual: u8,
        expected: u8,
    },

    #[error("{kind} {id} is invalid: {reason}")]
    InvalidEntity {
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("spatial index is inconsistent: {0}")]
    IndexInconsistency(String),

    #[error("membership id '{0}' is reserved")]
    ReservedMembership(String),

    #[error("vehicle {vehicle_id}: invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        vehicle_id: String,
        from: VehicleStateKind,
        to: VehicleStateKind,
        reason: String,
    },

    #[error("invalid instruction for vehicle {vehicle_id}: {reason}")]
    InvalidInstruction { vehicle_id: String, reason: String },

    #[error("invalid state for vehicle {vehicle_id}: {reason}")]
    InvalidState { vehicle_id: String, reason: String },

    #[error("routing failed: {0}")]
    Routing(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<SimulationError>,
    },
}

impl SimulationError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        SimulationError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(vehicle_id: impl fmt::Display, reason: impl Into<String>) -> Self {
        SimulationError::InvalidState {
            vehicle_id: vehicle_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_instruction(vehicle_id: impl fmt::Display, reason: impl Into<String>) -> Self {
        SimulationError::InvalidInstruction {
            vehicle_id: vehicle_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Broken world bookkeeping (indices, resource pools). The step loop
    /// aborts on these instead of logging and skipping.
    pub fn is_fatal(&self) -> bool {
        match self {
            SimulationError::IndexInconsistency(_)
            | SimulationError::ResourceOverflow { .. }
            | SimulationError::ResourceUnderflow { .. } => true,
            SimulationError::Context { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Wraps this error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        SimulationError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Why an operation had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ChargerUnavailable,
    StallUnavailable,
    NotAtLocation,
    MembershipMismatch,
    InvalidRoute,
    EntityMissing,
    CannotExit,
    AlreadyDispatched,
    EmptyPlan,
    VehicleFull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.reason, self.detail)
    }
}

/// Successful result of an operation that may be legitimately refused.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Updated(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    pub fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        Outcome::Rejected(Rejection::new(reason, detail))
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Outcome::Updated(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    pub fn updated(self) -> Option<T> {
        match self {
            Outcome::Updated(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Updated(_) => None,
            Outcome::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Result of a vehicle state transition or per-tick update.
pub type Transition = SimResult<Outcome<World>>;
