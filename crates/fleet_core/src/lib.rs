//! Discrete-time fleet simulation kernel.
//!
//! The crate is organised leaf-first:
//!
//! - [`spatial`] and [`model`]: grid indices, entities and resource pools
//! - [`world`]: the immutable [`world::World`] aggregate; every mutation returns a new world
//! - [`state`]: the vehicle state machine and driver states
//! - [`dispatcher`]: instructions, instruction generators and the assignment solver
//! - [`update`] and [`runner`]: the per-timestep step loop
//!
//! External collaborators (road network, vehicle energy model, reporting sink) are
//! consumed through the traits in [`roadnetwork`], [`mechatronics`] and [`reporting`].

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod mechatronics;
pub mod model;
pub mod reporting;
pub mod roadnetwork;
pub mod runner;
pub mod scenario;
pub mod spatial;
pub mod state;
pub mod update;
pub mod world;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{Outcome, RejectReason, Rejection, SimResult, SimulationError, Transition};
pub use world::World;
