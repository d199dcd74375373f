use std::sync::Arc;

use fleet_core::reporting::MemoryReporter;
use fleet_core::runner::{run, run_with_hook, RunnerPayload};
use fleet_core::scenario::{build_scenario, ScenarioParams};
use serde_json::Value;

fn two_hours(seed: u64) -> ScenarioParams {
    let mut params = ScenarioParams::default()
        .with_seed(seed)
        .with_fleet(20, 60)
        .with_infrastructure(3, 2)
        .with_request_window_hours(1);
    params.sim = params.sim.clone().with_time_range(0, 2 * 3600);
    params
}

fn recorded(params: &ScenarioParams) -> (RunnerPayload, Arc<MemoryReporter>) {
    let mut payload = build_scenario(params).expect("scenario");
    let reporter = Arc::new(MemoryReporter::new());
    payload.env = payload.env.clone().with_reporter(reporter.clone());
    (payload, reporter)
}

#[test]
fn a_scenario_runs_to_its_end_time_with_consistent_indices() {
    let (mut payload, reporter) = recorded(&two_hours(3));
    let steps = run_with_hook(&mut payload, |world, _| {
        world.check_index_consistency().expect("consistent indices");
    })
    .expect("run");
    assert_eq!(steps, 120);
    assert_eq!(payload.world.sim_time(), 2 * 3600);
    assert_eq!(payload.world.vehicles().len(), 20);
    assert!(!reporter.reports_of_kind("pickup_request").is_empty());
    assert!(!reporter.reports_of_kind("vehicle_move").is_empty());
}

#[test]
fn every_released_request_is_picked_up_cancelled_or_still_waiting() {
    let (mut payload, reporter) = recorded(&two_hours(5));
    run(&mut payload).expect("run");

    let added = reporter.reports_of_kind("add_request").len();
    let picked_up = reporter.reports_of_kind("pickup_request").len();
    let cancelled = reporter.reports_of_kind("cancel_request").len();
    assert_eq!(added, 60);
    assert_eq!(added, picked_up + cancelled + payload.world.requests().len());
    assert!(reporter.reports_of_kind("dropoff_request").len() <= picked_up);
}

#[test]
fn reports_serialize_with_their_type_tag() {
    let (mut payload, reporter) = recorded(&two_hours(8));
    run(&mut payload).expect("run");

    let reports = reporter.reports();
    assert!(!reports.is_empty());
    for report in &reports {
        let json = serde_json::to_value(report).expect("serializable report");
        assert_eq!(json["report_type"], Value::from(report.event.kind()));
        assert_eq!(json["sim_time"], Value::from(report.sim_time));
    }
    let instruction = reports
        .iter()
        .find(|r| r.event.kind() == "instruction")
        .expect("at least one instruction");
    let json = serde_json::to_value(instruction).expect("serializable");
    assert!(json["instruction"].is_object(), "instruction report: {json}");
}

#[test]
fn the_same_seed_replays_the_same_run() {
    let params = two_hours(21);
    let (mut first, first_reports) = recorded(&params);
    let (mut second, second_reports) = recorded(&params);
    run(&mut first).expect("first run");
    run(&mut second).expect("second run");

    assert_eq!(first.world.vehicles(), second.world.vehicles());
    assert_eq!(first.world.stations(), second.world.stations());
    assert_eq!(first_reports.reports(), second_reports.reports());
}
