use crate::environment::Environment;
use crate::error::{Outcome, RejectReason, SimResult, Transition};
use crate::model::VehicleId;
use crate::roadnetwork::Route;
use crate::world::World;

use super::ops::{apply_new_vehicle_state, drive, rejected};
use super::{StateProtocol, VehicleState};

#[derive(Debug, Clone, PartialEq)]
pub struct Repositioning {
    pub vehicle_id: VehicleId,
    pub route: Route,
}

impl Repositioning {
    pub fn new(vehicle_id: VehicleId, route: Route) -> Self {
        Self { vehicle_id, route }
    }
}

impl StateProtocol for Repositioning {
    fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    fn enter(&self, world: &World, _env: &Environment) -> Transition {
        let vehicle = world.get_vehicle(&self.vehicle_id)?;
        if !self.route.corresponds_with(vehicle.cell(), None) {
            return rejected(
                RejectReason::InvalidRoute,
                format!("reposition route does not start at vehicle {}", self.vehicle_id),
            );
        }
        apply_new_vehicle_state(world, &self.vehicle_id, VehicleState::Repositioning(self.clone()))
    }

    fn exit(&self, _next: &VehicleState, world: &World, _env: &Environment) -> Transition {
        Ok(Outcome::Updated(world.clone()))
    }

    fn has_reached_terminal_condition(&self, _world: &World, _env: &Environment) -> SimResult<bool> {
        Ok(self.route.is_empty())
    }

    fn default_terminal_state(&self, _world: &World, _env: &Environment) -> SimResult<VehicleState> {
        Ok(VehicleState::idle(self.vehicle_id.clone()))
    }

    fn perform_update(&self, world: &World, env: &Environment) -> Transition {
        drive(world, env, &VehicleState::Repositioning(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VehicleStateKind;
    use crate::test_helpers::{mock_env, mock_route, mock_vehicle, mock_world, test_cell, test_neighbor_cell};

    #[test]
    fn route_must_start_at_vehicle() {
        let env = mock_env();
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .expect("add");
        let elsewhere = Repositioning::new(VehicleId::from("v1"), mock_route(test_neighbor_cell(), 1.0));
        let result = elsewhere.enter(&world, &env).expect("enter");
        assert_eq!(result.rejection().map(|r| r.reason), Some(RejectReason::InvalidRoute));
    }

    #[test]
    fn arrives_and_goes_idle() {
        let env = mock_env();
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .expect("add");
        let state = VehicleState::Repositioning(Repositioning::new(
            VehicleId::from("v1"),
            mock_route(test_cell(), 0.3),
        ));
        let mut current = state.enter(&world, &env).expect("enter").updated().expect("entered");
        for _ in 0..5 {
            let vehicle = current.get_vehicle(&VehicleId::from("v1")).expect("vehicle").clone();
            current = vehicle
                .vehicle_state
                .update(&current, &env)
                .expect("update")
                .updated()
                .expect("updated");
        }
        let vehicle = current.get_vehicle(&VehicleId::from("v1")).expect("vehicle");
        assert_eq!(vehicle.vehicle_state.kind(), VehicleStateKind::Idle);
        assert_ne!(vehicle.cell(), test_cell());
    }
}
