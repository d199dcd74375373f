//! Performance benchmarks for fleet_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use fleet_core::dispatcher::assignment::h3_distance_cost;
use fleet_core::dispatcher::find_assignment;
use fleet_core::model::{Request, Vehicle};
use fleet_core::runner::{run, run_step, run_steps, RunnerPayload};
use fleet_core::scenario::{build_scenario, ScenarioParams};
use fleet_core::test_helpers::{
    cell_at_distance_km, mock_request, mock_station, mock_vehicle, mock_world, test_cell,
};

fn params(vehicles: usize, requests: usize) -> ScenarioParams {
    let mut params = ScenarioParams::default()
        .with_seed(42)
        .with_fleet(vehicles, requests)
        .with_request_window_hours(1);
    params.sim = params.sim.clone().with_time_range(0, 3600); // 1 hour
    params
}

fn bench_simulation_run(c: &mut Criterion) {
    let scenarios = vec![("small", 50, 100), ("medium", 200, 500), ("large", 500, 1000)];

    let mut group = c.benchmark_group("simulation_run");
    group.sample_size(10);
    for (name, vehicles, requests) in scenarios {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(vehicles, requests),
            |b, &(vehicles, requests)| {
                b.iter(|| {
                    let mut payload = build_scenario(&params(vehicles, requests)).expect("scenario");
                    black_box(run(&mut payload).expect("run"));
                });
            },
        );
    }
    group.finish();
}

fn warmed_up(vehicles: usize) -> RunnerPayload {
    // requests and charging sessions are in flight after twenty steps
    let mut payload = build_scenario(&params(vehicles, vehicles * 2)).expect("scenario");
    run_steps(&mut payload, 20).expect("warm up");
    payload
}

fn bench_single_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_step");
    group.sample_size(10);
    for vehicles in [100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(vehicles), &vehicles, |b, &vehicles| {
            b.iter_batched(
                || warmed_up(vehicles),
                |mut payload| black_box(run_step(&mut payload).expect("step")),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_assignment(c: &mut Criterion) {
    let origin = test_cell();
    let disk = origin.grid_disk::<Vec<_>>(10);
    let vehicles: Vec<Vehicle> = disk
        .iter()
        .take(100)
        .enumerate()
        .map(|(i, cell)| mock_vehicle(&format!("v{i}"), *cell))
        .collect();
    let requests: Vec<Request> = disk
        .iter()
        .skip(100)
        .take(200)
        .enumerate()
        .map(|(i, cell)| mock_request(&format!("r{i}"), *cell, origin, 0))
        .collect();
    let vehicle_refs: Vec<&Vehicle> = vehicles.iter().collect();
    let request_refs: Vec<&Request> = requests.iter().collect();

    let mut group = c.benchmark_group("assignment");
    group.bench_function("hungarian_100x200", |b| {
        b.iter(|| black_box(find_assignment(&vehicle_refs, &request_refs, h3_distance_cost)));
    });
    group.bench_function("hungarian_200x100", |b| {
        b.iter(|| black_box(find_assignment(&request_refs, &vehicle_refs, h3_distance_cost)));
    });
    group.finish();
}

fn bench_nearest_station(c: &mut Criterion) {
    let origin = test_cell();
    let world = (0..200)
        .try_fold(mock_world(), |world, i| {
            let km = 2.0 + f64::from(i) * 0.25;
            world.add_station(mock_station(&format!("s{i}"), cell_at_distance_km(origin, km)))
        })
        .expect("stations");

    let mut group = c.benchmark_group("nearest_station");
    for max_km in [10.0, 50.0] {
        group.bench_with_input(BenchmarkId::from_parameter(max_km), &max_km, |b, &max_km| {
            b.iter(|| black_box(world.nearest_station(origin, max_km, |_| true).expect("search")));
        });
    }
    group.bench_function("rejecting_filter_10km", |b| {
        b.iter(|| black_box(world.nearest_station(origin, 10.0, |_| false).expect("search")));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_simulation_run,
    bench_single_step,
    bench_assignment,
    bench_nearest_station
);
criterion_main!(benches);
