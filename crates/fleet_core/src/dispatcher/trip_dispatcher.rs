use std::collections::BTreeSet;

use tracing::debug;

use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::{Membership, MembershipId, Request, RequestId, Vehicle, VehicleId};
use crate::world::World;

use super::assignment::{find_assignment, h3_distance_cost};
use super::ops::is_valid_for_dispatch;
use super::{Instruction, InstructionGenerator};

/// Matches available vehicles to undispatched requests by grid distance.
///
/// Each fleet in `Environment::fleet_ids` is solved on its own; with no
/// fleets configured everything is one public partition. A vehicle or request
/// matched in an earlier partition is not offered again.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    fn in_partition(membership: &Membership, partition: Option<&MembershipId>) -> bool {
        partition.map_or(true, |id| membership.grants_access_to_id(id))
    }

    fn solve_partition(
        world: &World,
        env: &Environment,
        partition: Option<&MembershipId>,
        taken_vehicles: &mut BTreeSet<VehicleId>,
        taken_requests: &mut BTreeSet<RequestId>,
    ) -> SimResult<Vec<Instruction>> {
        let mut vehicles: Vec<&Vehicle> = Vec::new();
        for vehicle in world.vehicles().values() {
            if taken_vehicles.contains(&vehicle.id) || !Self::in_partition(&vehicle.membership, partition) {
                continue;
            }
            if is_valid_for_dispatch(vehicle, env)? {
                vehicles.push(vehicle);
            }
        }
        let mut requests: Vec<&Request> = world
            .requests()
            .values()
            .filter(|r| !r.is_dispatched() && !taken_requests.contains(&r.id))
            .filter(|r| Self::in_partition(&r.membership, partition))
            .collect();
        // highest value first; the stable sort keeps id order among equals
        requests.sort_by(|a, b| b.value.total_cmp(&a.value));

        // a request that does not admit the vehicle is never a feasible pair
        let solution = find_assignment(&vehicles, &requests, |vehicle: &Vehicle, request: &Request| {
            if request.membership.grants_access_to(&vehicle.membership) {
                h3_distance_cost(vehicle, request)
            } else {
                f64::INFINITY
            }
        });
        debug!(
            fleet = partition.map_or("public", |id| id.as_str()),
            vehicles = vehicles.len(),
            requests = requests.len(),
            matched = solution.pairs.len(),
            cost = solution.cost,
            "trip assignment solved"
        );
        Ok(solution
            .pairs
            .into_iter()
            .map(|(vehicle_id, request_id)| {
                taken_vehicles.insert(vehicle_id.clone());
                taken_requests.insert(request_id.clone());
                Instruction::DispatchTrip {
                    vehicle_id,
                    request_id,
                }
            })
            .collect())
    }
}

impl InstructionGenerator for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn generate_instructions(&mut self, world: &World, env: &Environment) -> SimResult<Vec<Instruction>> {
        let mut taken_vehicles = BTreeSet::new();
        let mut taken_requests = BTreeSet::new();
        if env.fleet_ids.is_empty() {
            return Self::solve_partition(world, env, None, &mut taken_vehicles, &mut taken_requests);
        }
        let mut instructions = Vec::new();
        for fleet_id in &env.fleet_ids {
            instructions.extend(Self::solve_partition(
                world,
                env,
                Some(fleet_id),
                &mut taken_vehicles,
                &mut taken_requests,
            )?);
        }
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{cell_at_distance_km, mock_env, mock_request, mock_vehicle, mock_world, test_cell};

    fn fleet(id: &str) -> Membership {
        Membership::single(MembershipId::from(id)).expect("membership")
    }

    #[test]
    fn each_request_gets_the_closest_vehicle() {
        let env = mock_env();
        let far = cell_at_distance_km(test_cell(), 6.0);
        let world = mock_world()
            .add_vehicle(mock_vehicle("v_near", test_cell()))
            .and_then(|w| w.add_vehicle(mock_vehicle("v_far", far)))
            .and_then(|w| w.add_request(mock_request("r1", test_cell(), far, 0)))
            .expect("setup");

        let instructions = Dispatcher::new().generate_instructions(&world, &env).expect("instructions");
        assert_eq!(
            instructions,
            vec![Instruction::DispatchTrip {
                vehicle_id: VehicleId::from("v_near"),
                request_id: RequestId::from("r1"),
            }]
        );
    }

    #[test]
    fn dispatched_requests_are_skipped() {
        let env = mock_env();
        let request = mock_request("r1", test_cell(), cell_at_distance_km(test_cell(), 2.0), 0)
            .assign_dispatched_vehicle(&VehicleId::from("v0"), 0);
        let world = mock_world()
            .add_vehicle(mock_vehicle("v1", test_cell()))
            .and_then(|w| w.add_request(request))
            .expect("setup");
        let instructions = Dispatcher::new().generate_instructions(&world, &env).expect("instructions");
        assert!(instructions.is_empty());
    }

    #[test]
    fn fleets_are_matched_separately() {
        let env = mock_env()
            .with_fleet_id(MembershipId::from("fleet_a"))
            .with_fleet_id(MembershipId::from("fleet_b"));
        let elsewhere = cell_at_distance_km(test_cell(), 2.0);
        let world = mock_world()
            .add_vehicle(mock_vehicle("va", test_cell()).with_membership(fleet("fleet_a")))
            .and_then(|w| w.add_vehicle(mock_vehicle("vb", elsewhere).with_membership(fleet("fleet_b"))))
            .and_then(|w| w.add_request(mock_request("rb", test_cell(), elsewhere, 0).with_membership(fleet("fleet_b"))))
            .expect("setup");
        let instructions = Dispatcher::new().generate_instructions(&world, &env).expect("instructions");
        assert_eq!(
            instructions,
            vec![Instruction::DispatchTrip {
                vehicle_id: VehicleId::from("vb"),
                request_id: RequestId::from("rb"),
            }]
        );
    }

    #[test]
    fn public_vehicles_are_not_paired_with_fleet_requests() {
        let env = mock_env().with_fleet_id(MembershipId::from("fleet_a"));
        let elsewhere = cell_at_distance_km(test_cell(), 3.0);
        let world = mock_world()
            .add_vehicle(mock_vehicle("v_public", test_cell()))
            .and_then(|w| w.add_vehicle(mock_vehicle("v_member", elsewhere).with_membership(fleet("fleet_a"))))
            .and_then(|w| w.add_request(mock_request("r1", test_cell(), elsewhere, 0).with_membership(fleet("fleet_a"))))
            .expect("setup");
        let instructions = Dispatcher::new().generate_instructions(&world, &env).expect("instructions");
        assert_eq!(
            instructions,
            vec![Instruction::DispatchTrip {
                vehicle_id: VehicleId::from("v_member"),
                request_id: RequestId::from("r1"),
            }]
        );
    }
}
