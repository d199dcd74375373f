//! Test helpers for common test setup and utilities.
//!
//! The mocks share one road network (straight lines at 40 km/h, resolution
//! 10 locations, resolution 7 search cells), one battery electric vehicle
//! model and two charger kinds, so fixtures built in different tests line up.

use std::sync::Arc;

use h3o::{CellIndex, LatLng, Resolution};

use crate::clock::{SimTime, SECONDS_PER_DAY};
use crate::config::{SimConfig, SimulationConfig};
use crate::environment::Environment;
use crate::mechatronics::{Bev, Ice, Mechatronics, TabularPowercurve, TabularPowertrain};
use crate::model::{
    Base, BaseId, Charger, EntityPosition, MechatronicsId, Request, RequestId, Station, StationId,
    Vehicle, VehicleId,
};
use crate::roadnetwork::{Geofence, HaversineRoadNetwork, LinkTraversal, RoadNetwork, Route, DEFAULT_HAVERSINE_SPEED_KMPH};
use crate::world::World;

/// A standard test cell used across test files for consistency.
/// This is a valid H3 cell at resolution 10 in the San Francisco Bay Area.
pub const TEST_CELL: u64 = 0x8a1fb46622dffff;

pub const MOCK_LOCATION_RESOLUTION: u8 = 10;
pub const MOCK_SEARCH_RESOLUTION: u8 = 7;
pub const MOCK_BEV_ID: &str = "bev";
pub const MOCK_ICE_ID: &str = "ice";

const KM_PER_DEGREE_LATITUDE: f64 = 111.195;
const MOCK_BATTERY_CAPACITY_KWH: f64 = 50.0;
const MOCK_WATT_HOUR_PER_MILE: f64 = 350.0;
const MOCK_DCFC_KW: f64 = 150.0;
const MOCK_L2_KW: f64 = 7.2;

/// Get the test cell as a `CellIndex`.
///
/// # Panics
///
/// Panics if the test cell constant is invalid (should never happen).
pub fn test_cell() -> CellIndex {
    CellIndex::try_from(TEST_CELL).expect("TEST_CELL should be a valid H3 cell")
}

/// Get a neighbor cell of the test cell for testing purposes.
pub fn test_neighbor_cell() -> CellIndex {
    test_cell()
        .grid_disk::<Vec<_>>(1)
        .into_iter()
        .find(|c| *c != test_cell())
        .expect("test cell should have neighbors")
}

/// The cell `km` kilometres due north of `origin`, at `origin`'s resolution.
pub fn cell_at_distance_km(origin: CellIndex, km: f64) -> CellIndex {
    let center = LatLng::from(origin);
    LatLng::new(center.lat() + km / KM_PER_DEGREE_LATITUDE, center.lng())
        .expect("offset stays a valid coordinate")
        .to_cell(origin.resolution())
}

pub fn mock_road_network() -> HaversineRoadNetwork {
    HaversineRoadNetwork::new(location_resolution())
}

fn location_resolution() -> Resolution {
    Resolution::try_from(MOCK_LOCATION_RESOLUTION).expect("valid resolution")
}

pub fn mock_position(cell: CellIndex) -> EntityPosition {
    mock_road_network().position_from_cell(cell)
}

/// A straight route of roughly `km` heading north from `origin`.
pub fn mock_route(origin: CellIndex, km: f64) -> Route {
    let end = cell_at_distance_km(origin, km);
    Route::new(vec![LinkTraversal::new(
        format!("{origin}-{end}").into(),
        origin,
        end,
        DEFAULT_HAVERSINE_SPEED_KMPH,
        None,
    )])
}

pub fn mock_sim_config() -> SimConfig {
    SimConfig::default()
        .with_resolutions(MOCK_LOCATION_RESOLUTION, MOCK_SEARCH_RESOLUTION)
        .with_time_range(0, SECONDS_PER_DAY)
        .with_timestep(60)
}

pub fn mock_world_with(sim: &SimConfig) -> World {
    World::new(Arc::new(mock_road_network()), sim).expect("mock world")
}

/// An empty world at time zero.
pub fn mock_world() -> World {
    mock_world_with(&mock_sim_config())
}

/// An empty world whose clock starts at `time`.
pub fn mock_world_at(time: SimTime) -> World {
    mock_world_with(&mock_sim_config().with_time_range(time, time + SECONDS_PER_DAY))
}

/// An empty world whose road network only covers the test cell's resolution 5 parent.
pub fn mock_fenced_world() -> World {
    let fence = test_cell()
        .parent(Resolution::Five)
        .and_then(|cell| Geofence::new([cell]))
        .expect("geofence");
    let network = mock_road_network().with_geofence(fence);
    World::new(Arc::new(network), &mock_sim_config()).expect("fenced world")
}

/// 50 kWh at 350 Wh/mile: about 230 km of range when full.
pub fn mock_bev() -> Bev {
    let powertrain = TabularPowertrain::flat(MOCK_WATT_HOUR_PER_MILE / 1000.0);
    let powercurve = TabularPowercurve::from_normalized(
        &[(0.0, 1.0), (0.5, 1.0), (0.8, 0.5), (1.0, 0.05)],
        MOCK_BATTERY_CAPACITY_KWH,
        MOCK_DCFC_KW,
        15,
    );
    Bev::new(
        MechatronicsId::from(MOCK_BEV_ID),
        MOCK_BATTERY_CAPACITY_KWH,
        0.8,
        MOCK_WATT_HOUR_PER_MILE,
        50.0,
        powertrain,
        powercurve,
    )
}

/// 15 gallon tank at 30 mpg.
pub fn mock_ice() -> Ice {
    Ice::new(
        MechatronicsId::from(MOCK_ICE_ID),
        15.0,
        0.2,
        30.0,
        TabularPowertrain::flat(1.0 / 30.0),
    )
}

pub fn mock_dcfc_charger() -> Charger {
    Charger::electric("DCFC", MOCK_DCFC_KW)
}

pub fn mock_l2_charger() -> Charger {
    Charger::electric("LEVEL_2", MOCK_L2_KW)
}

pub fn mock_env_with(sim: SimConfig) -> Environment {
    let config = SimulationConfig {
        sim,
        ..SimulationConfig::default()
    };
    Environment::new(config)
        .with_mechatronics(Arc::new(mock_bev()))
        .with_mechatronics(Arc::new(mock_ice()))
        .with_charger(mock_dcfc_charger())
        .with_charger(mock_l2_charger())
}

/// An environment knowing the mock BEV and ICE models and both mock chargers.
pub fn mock_env() -> Environment {
    mock_env_with(mock_sim_config())
}

/// An idle autonomous BEV at 80% charge.
pub fn mock_vehicle(id: &str, cell: CellIndex) -> Vehicle {
    let bev = mock_bev();
    Vehicle::new(
        VehicleId::from(id),
        mock_position(cell),
        bev.id().clone(),
        bev.initial_energy(0.8),
        4,
    )
}

pub fn mock_request(id: &str, origin: CellIndex, destination: CellIndex, departure_time: SimTime) -> Request {
    Request::new(
        RequestId::from(id),
        mock_position(origin),
        mock_position(destination),
        departure_time,
    )
}

/// A public station with two DCFC and two Level 2 plugs.
pub fn mock_station(id: &str, cell: CellIndex) -> Station {
    Station::new(
        StationId::from(id),
        mock_position(cell),
        [(mock_dcfc_charger(), 2), (mock_l2_charger(), 2)],
    )
}

pub fn mock_base(id: &str, cell: CellIndex, stalls: u32) -> Base {
    Base::new(BaseId::from(id), mock_position(cell), stalls)
}
