//! Vehicle and driver state machines.

pub mod driver_state;
pub mod vehicle_state;

pub use driver_state::{DriverState, HumanDriverAttributes, HumanUnavailableChargeParameters};
pub use vehicle_state::{TripPhase, VehicleState, VehicleStateKind};
