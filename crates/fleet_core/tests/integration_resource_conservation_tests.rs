use std::collections::BTreeMap;

use fleet_core::model::{BaseId, ChargerId, StationId};
use fleet_core::runner::run_with_hook;
use fleet_core::scenario::{build_scenario, ScenarioParams};
use fleet_core::state::VehicleState;
use fleet_core::world::World;

/// Every plug and stall is either free or held by exactly one vehicle whose
/// state says so, and every queued vehicle is counted at its charger.
fn assert_resources_conserved(world: &World) {
    let mut plugged: BTreeMap<(StationId, ChargerId), u32> = BTreeMap::new();
    let mut queued: BTreeMap<(StationId, ChargerId), u32> = BTreeMap::new();
    let mut stalls: BTreeMap<BaseId, u32> = BTreeMap::new();

    for vehicle in world.vehicles().values() {
        match &vehicle.vehicle_state {
            VehicleState::ChargingStation(s) => {
                *plugged.entry((s.station_id.clone(), s.charger_id.clone())).or_default() += 1;
            }
            VehicleState::ChargeQueueing(s) => {
                *queued.entry((s.station_id.clone(), s.charger_id.clone())).or_default() += 1;
            }
            VehicleState::ChargingBase(s) => {
                let station_id = world
                    .get_base(&s.base_id)
                    .ok()
                    .and_then(|b| b.station_id.clone())
                    .expect("charging base has a station");
                *plugged.entry((station_id, s.charger_id.clone())).or_default() += 1;
                *stalls.entry(s.base_id.clone()).or_default() += 1;
            }
            VehicleState::ReserveBase(s) => {
                *stalls.entry(s.base_id.clone()).or_default() += 1;
            }
            _ => {}
        }
    }

    for station in world.stations().values() {
        for state in station.charger_states() {
            let key = (station.id.clone(), state.charger.id.clone());
            let in_use = plugged.get(&key).copied().unwrap_or(0);
            assert_eq!(
                state.available_chargers + in_use,
                state.total_chargers,
                "t={} station {} charger {}",
                world.sim_time(),
                station.id,
                state.charger.id
            );
            assert_eq!(
                state.enqueued_vehicles,
                queued.get(&key).copied().unwrap_or(0),
                "t={} queue at station {} charger {}",
                world.sim_time(),
                station.id,
                state.charger.id
            );
        }
    }
    for base in world.bases().values() {
        let held = stalls.get(&base.id).copied().unwrap_or(0);
        assert_eq!(
            base.available_stalls + held,
            base.total_stalls,
            "t={} base {}",
            world.sim_time(),
            base.id
        );
    }
}

/// A crowded scenario: low batteries, one fast plug per station and small bases.
fn crowded() -> ScenarioParams {
    let mut params = ScenarioParams::default()
        .with_seed(11)
        .with_fleet(30, 120)
        .with_infrastructure(3, 2)
        .with_request_window_hours(1);
    params.dcfc_per_station = 1;
    params.l2_per_station = 1;
    params.stalls_per_base = 2;
    params.min_initial_soc = 0.08;
    params.max_initial_soc = 0.3;
    params.radius_km = 4.0;
    params.dispatcher.charging_range_km_threshold = 60.0;
    params.dispatcher.idle_time_out_seconds = 300;
    params.sim = params.sim.clone().with_time_range(0, 3 * 3600);
    params
}

#[test]
fn plugs_stalls_and_queues_balance_every_step() {
    let mut payload = build_scenario(&crowded()).expect("scenario");
    assert_resources_conserved(&payload.world);

    let mut saw_queue = false;
    let mut saw_reserve = false;
    let steps = run_with_hook(&mut payload, |world, _| {
        assert_resources_conserved(world);
        world.check_index_consistency().expect("consistent indices");
        for vehicle in world.vehicles().values() {
            saw_queue |= matches!(vehicle.vehicle_state, VehicleState::ChargeQueueing(_));
            saw_reserve |= matches!(vehicle.vehicle_state, VehicleState::ReserveBase(_));
        }
    })
    .expect("run");

    assert_eq!(steps, 3 * 60);
    assert!(saw_queue, "scenario never queued a vehicle");
    assert!(saw_reserve, "scenario never parked a vehicle at a base");
}

#[test]
fn vehicles_are_never_lost() {
    let params = crowded();
    let mut payload = build_scenario(&params).expect("scenario");
    let fleet: Vec<_> = payload.world.vehicles().keys().cloned().collect();
    run_with_hook(&mut payload, |world, _| {
        assert_eq!(world.vehicles().len(), fleet.len());
    })
    .expect("run");
    assert_eq!(payload.world.vehicles().keys().cloned().collect::<Vec<_>>(), fleet);
}
