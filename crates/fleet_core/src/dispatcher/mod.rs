//! Instructions, the generators that propose them and the assignment solver.
//!
//! Every step, each [`InstructionGenerator`] looks at the same world snapshot
//! and proposes instructions. They land on an [`InstructionStack`] in
//! generator order, followed by each driver's own instruction, and the last
//! one pushed for a vehicle is the one applied.

pub mod assignment;
mod charging_fleet_manager;
mod generator;
mod instruction;
pub mod ops;
mod trip_dispatcher;

pub use assignment::{find_assignment, AssignmentSolution, StationRanking, MAX_DIST};
pub use charging_fleet_manager::ChargingFleetManager;
pub use generator::{generate_instructions, InstructionGenerator, InstructionStack};
pub use instruction::{Instruction, InstructionResult};
pub use trip_dispatcher::Dispatcher;

/// The bundled generators in their default order.
pub fn default_generators() -> Vec<Box<dyn InstructionGenerator>> {
    vec![Box::new(ChargingFleetManager::new()), Box::new(Dispatcher::new())]
}
