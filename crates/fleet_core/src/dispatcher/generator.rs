use im::OrdMap;
use tracing::debug;

use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::VehicleId;
use crate::world::World;

use super::Instruction;

/// A named policy proposing instructions from a world snapshot.
///
/// Generators run in a fixed order every step and may keep state between
/// steps through `&mut self`. A later generator's instruction for a vehicle
/// replaces any earlier one.
pub trait InstructionGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate_instructions(&mut self, world: &World, env: &Environment) -> SimResult<Vec<Instruction>>;
}

/// Per-vehicle instruction stacks. Only the top of each stack is applied.
#[derive(Debug, Clone, Default)]
pub struct InstructionStack {
    stacks: OrdMap<VehicleId, Vec<Instruction>>,
}

impl InstructionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.stacks
            .entry(instruction.vehicle_id().clone())
            .or_insert_with(Vec::new)
            .push(instruction);
    }

    pub fn extend<I>(&mut self, instructions: I)
    where
        I: IntoIterator<Item = Instruction>,
    {
        for instruction in instructions {
            self.push(instruction);
        }
    }

    /// Every instruction proposed for `vehicle_id`, oldest first.
    pub fn stack_for(&self, vehicle_id: &VehicleId) -> &[Instruction] {
        self.stacks.get(vehicle_id).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// The winning instruction per vehicle, in vehicle id order.
    pub fn resolve(&self) -> Vec<Instruction> {
        self.stacks
            .iter()
            .filter_map(|(vehicle_id, stack)| {
                if stack.len() > 1 {
                    debug!(%vehicle_id, overridden = stack.len() - 1, "instruction overridden");
                }
                stack.last().cloned()
            })
            .collect()
    }
}

/// Runs every generator against the same snapshot, then lets drivers have the last word.
pub fn generate_instructions(
    generators: &mut [Box<dyn InstructionGenerator>],
    world: &World,
    env: &Environment,
) -> SimResult<InstructionStack> {
    let mut stack = InstructionStack::new();
    for generator in generators.iter_mut() {
        let instructions = generator.generate_instructions(world, env)?;
        debug!(generator = generator.name(), count = instructions.len(), "instructions generated");
        stack.extend(instructions);
    }
    for vehicle in world.vehicles().values() {
        if let Some(instruction) = vehicle.driver_state.generate_instruction(world, env)? {
            stack.push(instruction);
        }
    }
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BaseId, StationId};
    use crate::test_helpers::{mock_env, mock_vehicle, mock_world, test_cell};

    struct Fixed {
        name: &'static str,
        instructions: Vec<Instruction>,
    }

    impl InstructionGenerator for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn generate_instructions(
            &mut self,
            _world: &World,
            _env: &Environment,
        ) -> SimResult<Vec<Instruction>> {
            Ok(self.instructions.clone())
        }
    }

    #[test]
    fn last_writer_wins() {
        let v1 = VehicleId::from("v1");
        let low = Instruction::DispatchBase {
            vehicle_id: v1.clone(),
            base_id: BaseId::from("b1"),
        };
        let high = Instruction::DispatchStation {
            vehicle_id: v1.clone(),
            station_id: StationId::from("s1"),
            charger_id: "DCFC".into(),
        };
        let mut generators: Vec<Box<dyn InstructionGenerator>> = vec![
            Box::new(Fixed {
                name: "balance",
                instructions: vec![low.clone()],
            }),
            Box::new(Fixed {
                name: "charge",
                instructions: vec![high.clone()],
            }),
        ];
        let world = mock_world().add_vehicle(mock_vehicle("v1", test_cell())).expect("vehicle");
        let stack = generate_instructions(&mut generators, &world, &mock_env()).expect("generate");

        assert_eq!(stack.stack_for(&v1), &[low, high.clone()]);
        assert_eq!(stack.resolve(), vec![high]);
    }

    #[test]
    fn empty_stack_resolves_to_nothing() {
        let stack = InstructionStack::new();
        assert!(stack.is_empty());
        assert!(stack.resolve().is_empty());
        assert!(stack.stack_for(&VehicleId::from("v1")).is_empty());
    }
}
