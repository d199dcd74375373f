//! Driver states: who is behind the wheel and whether they are working.
//!
//! A driver state never moves the vehicle itself. Each step it may flip
//! between on- and off-shift ([`DriverState::update`]) and may propose one
//! [`Instruction`] ([`DriverState::generate_instruction`]) that is pushed
//! onto the instruction stack after every generator, so it wins.

mod autonomous;
mod human;
mod ops;

use crate::dispatcher::Instruction;
use crate::environment::Environment;
use crate::error::{Outcome, SimResult, Transition};
use crate::model::{BaseId, ScheduleId, VehicleId};
use crate::world::World;

pub use human::HumanUnavailableChargeParameters;

/// Fixed facts about a human driver.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanDriverAttributes {
    pub vehicle_id: VehicleId,
    pub schedule_id: ScheduleId,
    pub home_base_id: BaseId,
    pub allows_pooling: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    Autonomous {
        vehicle_id: VehicleId,
    },
    HumanAvailable(HumanDriverAttributes),
    HumanUnavailable(HumanDriverAttributes, HumanUnavailableChargeParameters),
}

impl DriverState {
    pub fn autonomous(vehicle_id: VehicleId) -> Self {
        DriverState::Autonomous { vehicle_id }
    }

    /// A human driver starting on shift.
    pub fn human(attributes: HumanDriverAttributes) -> Self {
        DriverState::HumanAvailable(attributes)
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        match self {
            DriverState::Autonomous { vehicle_id } => vehicle_id,
            DriverState::HumanAvailable(attributes) | DriverState::HumanUnavailable(attributes, _) => {
                &attributes.vehicle_id
            }
        }
    }

    /// Whether the vehicle may be offered work.
    pub fn available(&self) -> bool {
        !matches!(self, DriverState::HumanUnavailable(..))
    }

    pub fn allows_pooling(&self) -> bool {
        match self {
            DriverState::Autonomous { .. } => true,
            DriverState::HumanAvailable(attributes) | DriverState::HumanUnavailable(attributes, _) => {
                attributes.allows_pooling
            }
        }
    }

    pub fn home_base_id(&self) -> Option<&BaseId> {
        match self {
            DriverState::Autonomous { .. } => None,
            DriverState::HumanAvailable(attributes) | DriverState::HumanUnavailable(attributes, _) => {
                Some(&attributes.home_base_id)
            }
        }
    }

    pub fn schedule_id(&self) -> Option<&ScheduleId> {
        match self {
            DriverState::Autonomous { .. } => None,
            DriverState::HumanAvailable(attributes) | DriverState::HumanUnavailable(attributes, _) => {
                Some(&attributes.schedule_id)
            }
        }
    }

    /// The driver's own idea of what the vehicle should do next, if any.
    pub fn generate_instruction(&self, world: &World, env: &Environment) -> SimResult<Option<Instruction>> {
        match self {
            DriverState::Autonomous { vehicle_id } => autonomous::generate_instruction(vehicle_id, world, env),
            DriverState::HumanAvailable(attributes) => human::available_instruction(attributes, world, env),
            DriverState::HumanUnavailable(attributes, params) => {
                human::unavailable_instruction(attributes, params, world, env)
            }
        }
    }

    /// Checks the driver's schedule and switches shift when it says so.
    pub fn update(&self, world: &World, env: &Environment) -> Transition {
        match self {
            DriverState::Autonomous { .. } => Ok(Outcome::Updated(world.clone())),
            DriverState::HumanAvailable(attributes) => human::update_available(attributes, world, env),
            DriverState::HumanUnavailable(attributes, _) => human::update_unavailable(attributes, world, env),
        }
    }
}
