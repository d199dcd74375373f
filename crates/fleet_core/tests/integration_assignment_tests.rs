use fleet_core::dispatcher::assignment::h3_distance_cost;
use fleet_core::dispatcher::{
    default_generators, find_assignment, generate_instructions, Dispatcher, Instruction, InstructionGenerator,
};
use fleet_core::model::{Request, RequestId, Vehicle, VehicleId};
use fleet_core::test_helpers::{cell_at_distance_km, mock_env, mock_request, mock_vehicle, mock_world, test_cell};
use fleet_core::world::World;

fn dispatch(vehicle: &str, request: &str) -> Instruction {
    Instruction::DispatchTrip {
        vehicle_id: VehicleId::from(vehicle),
        request_id: RequestId::from(request),
    }
}

fn index_of(id: &str) -> usize {
    id[1..].parse::<usize>().expect("numbered id") - 1
}

#[test]
fn matrix_costs_pick_the_cheapest_total() {
    let costs = [[1.0, 3.0], [4.0, 2.0]];
    let vehicles = [mock_vehicle("v1", test_cell()), mock_vehicle("v2", test_cell())];
    let requests = [
        mock_request("r1", test_cell(), test_cell(), 0),
        mock_request("r2", test_cell(), test_cell(), 0),
    ];
    let vehicle_refs: Vec<&Vehicle> = vehicles.iter().collect();
    let request_refs: Vec<&Request> = requests.iter().collect();

    let solution = find_assignment(&vehicle_refs, &request_refs, |v: &Vehicle, r: &Request| {
        costs[index_of(v.id.as_str())][index_of(r.id.as_str())]
    });
    assert_eq!(
        solution.pairs,
        vec![
            (VehicleId::from("v1"), RequestId::from("r1")),
            (VehicleId::from("v2"), RequestId::from("r2")),
        ]
    );
    assert!((solution.cost - 3.0).abs() < 1e-9);
}

#[test]
fn infeasible_pairs_are_never_matched() {
    let costs = [[f64::INFINITY, 5.0], [f64::INFINITY, 1.0], [f64::INFINITY, 2.0]];
    let vehicles = [
        mock_vehicle("v1", test_cell()),
        mock_vehicle("v2", test_cell()),
        mock_vehicle("v3", test_cell()),
    ];
    let requests = [
        mock_request("r1", test_cell(), test_cell(), 0),
        mock_request("r2", test_cell(), test_cell(), 0),
    ];
    let vehicle_refs: Vec<&Vehicle> = vehicles.iter().collect();
    let request_refs: Vec<&Request> = requests.iter().collect();

    let solution = find_assignment(&vehicle_refs, &request_refs, |v: &Vehicle, r: &Request| {
        costs[index_of(v.id.as_str())][index_of(r.id.as_str())]
    });
    assert_eq!(solution.pairs, vec![(VehicleId::from("v2"), RequestId::from("r2"))]);
    assert!((solution.cost - 1.0).abs() < 1e-9);
}

/// Vehicle `a` is nearest to r1, but sending it there strands r2 with `b`
/// three kilometres away. The optimal pairing swaps them.
fn crossing_world() -> World {
    mock_world()
        .add_vehicle(mock_vehicle("a", test_cell()))
        .and_then(|w| w.add_vehicle(mock_vehicle("b", cell_at_distance_km(test_cell(), 1.8))))
        .and_then(|w| {
            w.add_request(mock_request(
                "r1",
                cell_at_distance_km(test_cell(), 0.9),
                cell_at_distance_km(test_cell(), 5.0),
                0,
            ))
        })
        .and_then(|w| {
            w.add_request(mock_request(
                "r2",
                cell_at_distance_km(test_cell(), -1.2),
                cell_at_distance_km(test_cell(), -5.0),
                0,
            ))
        })
        .expect("crossing world")
}

#[test]
fn dispatcher_minimises_total_pickup_distance() {
    let world = crossing_world();
    let mut instructions = Dispatcher::new()
        .generate_instructions(&world, &mock_env())
        .expect("instructions");
    instructions.sort_by(|x, y| x.vehicle_id().cmp(y.vehicle_id()));
    assert_eq!(instructions, vec![dispatch("a", "r2"), dispatch("b", "r1")]);

    let vehicles: Vec<&Vehicle> = world.vehicles().values().collect();
    let requests: Vec<&Request> = world.requests().values().collect();
    let optimal = find_assignment(&vehicles, &requests, h3_distance_cost);
    let a_cell = world.get_vehicle(&VehicleId::from("a")).expect("a").cell();
    let r1_cell = world.get_request(&RequestId::from("r1")).expect("r1").cell();
    let nearest_first = a_cell.grid_distance(r1_cell).expect("distance")
        + world
            .get_vehicle(&VehicleId::from("b"))
            .expect("b")
            .cell()
            .grid_distance(world.get_request(&RequestId::from("r2")).expect("r2").cell())
            .expect("distance");
    assert!(optimal.cost < f64::from(nearest_first));
}

#[test]
fn the_default_pipeline_resolves_one_instruction_per_vehicle() {
    let world = crossing_world();
    let env = mock_env();
    let mut generators = default_generators();
    let stack = generate_instructions(&mut generators, &world, &env).expect("generate");
    let mut resolved = stack.resolve();
    resolved.sort_by(|x, y| x.vehicle_id().cmp(y.vehicle_id()));
    assert_eq!(resolved, vec![dispatch("a", "r2"), dispatch("b", "r1")]);
}
