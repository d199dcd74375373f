mod support;

use fleet_core::mechatronics::Mechatronics;
use fleet_core::model::{ChargerId, StationId, VehicleId};
use fleet_core::runner::{run_with_hook, RunnerPayload};
use fleet_core::state::VehicleStateKind;
use fleet_core::test_helpers::{cell_at_distance_km, mock_bev, test_cell};
use fleet_core::update::{ChargingPriceUpdate, PriceRow, PriceTarget, RequestFeed, Update};
use support::world::{state_of, TestWorldBuilder};

/// A vehicle at 15% charge with a station five kilometres away. Its range
/// (about 34 km) is under the soft threshold and the reserve is raised so the
/// trip to the station plus reserve exceeds it.
fn low_vehicle_near_a_station() -> TestWorldBuilder {
    TestWorldBuilder::new()
        .with_time_range(0, 3600)
        .with_dispatcher(|d| d.charging_range_km_threshold = 40.0)
        .with_vehicle_at_soc("v1", test_cell(), 0.15)
        .with_station("s1", station_cell())
}

fn station_cell() -> h3o::CellIndex {
    cell_at_distance_km(test_cell(), 5.0)
}

#[test]
fn low_vehicle_drives_to_the_station_charges_and_frees_the_plug() {
    let (mut payload, reporter) = low_vehicle_near_a_station().build_payload(None);
    let mut kinds = Vec::new();
    run_with_hook(&mut payload, |world, _| {
        let kind = state_of(world, "v1");
        if kind == VehicleStateKind::ChargingStation {
            let station = world.get_station(&StationId::from("s1")).expect("station");
            let dcfc = ChargerId::from("DCFC");
            assert_eq!(Some(station.available_chargers(&dcfc) + 1), station.total_chargers(&dcfc));
        }
        kinds.push(kind);
    })
    .expect("run");

    assert_eq!(kinds.first(), Some(&VehicleStateKind::DispatchStation));
    assert!(kinds.contains(&VehicleStateKind::ChargingStation), "states: {kinds:?}");
    assert_eq!(kinds.last(), Some(&VehicleStateKind::Idle));

    let world = &payload.world;
    let vehicle = world.get_vehicle(&VehicleId::from("v1")).expect("vehicle");
    // charging stops at the fast charge limit, then idling drains a little
    let soc = mock_bev().state_of_charge(vehicle);
    assert!(soc >= 0.75, "soc after charging was {soc}");
    assert_eq!(vehicle.cell(), station_cell());

    let station = world.get_station(&StationId::from("s1")).expect("station");
    for charger_id in station.charger_ids() {
        assert_eq!(
            Some(station.available_chargers(charger_id)),
            station.total_chargers(charger_id),
            "charger {charger_id} still checked out"
        );
    }
    assert_eq!(reporter.reports_of_kind("refuel_search").len(), 1);
    assert!(!reporter.reports_of_kind("vehicle_charge").is_empty());
    world.check_index_consistency().expect("consistent indices");
}

#[test]
fn default_thresholds_leave_the_vehicle_idle() {
    let (mut payload, reporter) = TestWorldBuilder::new()
        .with_time_range(0, 600)
        .with_vehicle_at_soc("v1", test_cell(), 0.15)
        .with_station("s1", station_cell())
        .build_payload(None);
    run_with_hook(&mut payload, |world, _| {
        assert_eq!(state_of(world, "v1"), VehicleStateKind::Idle);
    })
    .expect("run");
    assert!(reporter.reports_of_kind("refuel_search").is_empty());
}

#[test]
fn charging_pays_the_station_price() {
    let (sim, feed) = low_vehicle_near_a_station().build();
    let prices = ChargingPriceUpdate::new(vec![PriceRow::new(
        0,
        PriceTarget::Station(StationId::from("s1")),
        "DCFC".into(),
        0.5,
    )]);
    let update = Update::build(prices, RequestFeed::new(feed, Default::default()), None);
    let mut payload = RunnerPayload::new(sim.world, sim.env, update);
    run_with_hook(&mut payload, |_, _| {}).expect("run");

    let vehicle = payload.world.get_vehicle(&VehicleId::from("v1")).expect("vehicle");
    let station = payload.world.get_station(&StationId::from("s1")).expect("station");
    assert!(vehicle.balance < 0.0, "vehicle balance {}", vehicle.balance);
    assert!((station.balance + vehicle.balance).abs() < 1e-6);
    assert_eq!(station.get_price(&"DCFC".into()), Some(0.5));
}
