//! Seeded synthetic scenarios: a fleet, a request feed, stations and bases
//! scattered around a centre point.
//!
//! Useful for benchmarks, demos and end-to-end tests. The same seed always
//! produces the same scenario.

use std::sync::Arc;

use h3o::{CellIndex, LatLng};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::clock::SimTime;
use crate::config::{DispatcherConfig, SimConfig, SimulationConfig};
use crate::environment::Environment;
use crate::error::{SimResult, SimulationError};
use crate::mechatronics::{Bev, Mechatronics, TabularPowercurve, TabularPowertrain};
use crate::model::{
    Base, BaseId, Charger, MechatronicsId, Request, RequestId, RequestRateStructure, Station,
    StationId, Vehicle, VehicleId,
};
use crate::roadnetwork::{HaversineRoadNetwork, RoadNetwork};
use crate::runner::RunnerPayload;
use crate::update::{ChargingPriceUpdate, RequestFeed, Update};
use crate::world::World;

/// Default centre: San Francisco, CA (approx).
const DEFAULT_CENTER_LAT: f64 = 37.7749;
const DEFAULT_CENTER_LNG: f64 = -122.4194;
const KM_PER_DEGREE_LATITUDE: f64 = 111.195;

pub const SCENARIO_BEV_ID: &str = "scenario_bev";
pub const SCENARIO_DCFC_ID: &str = "DCFC";
pub const SCENARIO_L2_ID: &str = "LEVEL_2";

/// Parameters for building a synthetic scenario.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub num_vehicles: usize,
    pub num_requests: usize,
    pub num_stations: usize,
    /// Bases are placed on the first stations, so at most `num_stations` of them get a station.
    pub num_bases: usize,
    pub stalls_per_base: u32,
    pub dcfc_per_station: u32,
    pub l2_per_station: u32,
    pub center_lat: f64,
    pub center_lng: f64,
    /// Everything is placed within this distance of the centre.
    pub radius_km: f64,
    /// Requests depart uniformly in `[start_time, start_time + request_window_seconds)`.
    pub request_window_seconds: u64,
    pub min_trip_km: f64,
    pub max_trip_km: f64,
    /// Initial state of charge is drawn uniformly from this range.
    pub min_initial_soc: f64,
    pub max_initial_soc: f64,
    pub rates: RequestRateStructure,
    pub seed: Option<u64>,
    pub sim: SimConfig,
    pub dispatcher: DispatcherConfig,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            num_vehicles: 50,
            num_requests: 500,
            num_stations: 5,
            num_bases: 3,
            stalls_per_base: 20,
            dcfc_per_station: 4,
            l2_per_station: 4,
            center_lat: DEFAULT_CENTER_LAT,
            center_lng: DEFAULT_CENTER_LNG,
            radius_km: 8.0,
            request_window_seconds: 4 * 3600,
            min_trip_km: 1.0,
            max_trip_km: 10.0,
            min_initial_soc: 0.5,
            max_initial_soc: 1.0,
            rates: RequestRateStructure {
                base_price: 2.5,
                price_per_mile: 1.5,
                minimum_price: 5.0,
            },
            seed: None,
            sim: SimConfig::default().with_resolutions(12, 7),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ScenarioParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_fleet(mut self, num_vehicles: usize, num_requests: usize) -> Self {
        self.num_vehicles = num_vehicles;
        self.num_requests = num_requests;
        self
    }

    pub fn with_infrastructure(mut self, num_stations: usize, num_bases: usize) -> Self {
        self.num_stations = num_stations;
        self.num_bases = num_bases;
        self
    }

    pub fn with_center(mut self, lat: f64, lng: f64, radius_km: f64) -> Self {
        self.center_lat = lat;
        self.center_lng = lng;
        self.radius_km = radius_km;
        self
    }

    pub fn with_request_window_hours(mut self, hours: u64) -> Self {
        self.request_window_seconds = hours * 3600;
        self
    }

    pub fn with_trip_km(mut self, min_km: f64, max_km: f64) -> Self {
        self.min_trip_km = min_km;
        self.max_trip_km = max_km;
        self
    }

    pub fn with_sim_config(mut self, sim: SimConfig) -> Self {
        self.sim = sim;
        self
    }

    fn validate(&self) -> SimResult<()> {
        self.sim.validate()?;
        if !(self.radius_km > 0.0) {
            return Err(SimulationError::Config(format!(
                "radius_km must be positive, got {}",
                self.radius_km
            )));
        }
        if !(0.0 <= self.min_trip_km && self.min_trip_km <= self.max_trip_km) {
            return Err(SimulationError::Config(format!(
                "trip range {}..{} km is invalid",
                self.min_trip_km, self.max_trip_km
            )));
        }
        if !(0.0 <= self.min_initial_soc
            && self.min_initial_soc <= self.max_initial_soc
            && self.max_initial_soc <= 1.0)
        {
            return Err(SimulationError::Config(format!(
                "initial soc range {}..{} is invalid",
                self.min_initial_soc, self.max_initial_soc
            )));
        }
        Ok(())
    }
}

/// The vehicle model every scenario vehicle uses: 60 kWh at 300 Wh/mile.
pub fn scenario_bev() -> Bev {
    let capacity_kwh = 60.0;
    let powercurve = TabularPowercurve::from_normalized(
        &[(0.0, 0.8), (0.6, 1.0), (0.8, 0.6), (1.0, 0.1)],
        capacity_kwh,
        150.0,
        15,
    );
    Bev::new(
        MechatronicsId::from(SCENARIO_BEV_ID),
        capacity_kwh,
        0.8,
        300.0,
        50.0,
        TabularPowertrain::flat(0.3),
        powercurve,
    )
}

pub fn scenario_chargers() -> [Charger; 2] {
    [
        Charger::electric(SCENARIO_DCFC_ID, 150.0),
        Charger::electric(SCENARIO_L2_ID, 7.2),
    ]
}

/// A uniformly random point within `radius_km` of the centre.
fn random_cell_near<R: Rng>(rng: &mut R, center: LatLng, radius_km: f64, network: &dyn RoadNetwork) -> SimResult<CellIndex> {
    let distance = radius_km * rng.gen::<f64>().sqrt();
    let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
    offset_cell(center, distance, bearing, network)
}

fn offset_cell(origin: LatLng, distance_km: f64, bearing: f64, network: &dyn RoadNetwork) -> SimResult<CellIndex> {
    let dlat = distance_km * bearing.cos() / KM_PER_DEGREE_LATITUDE;
    let dlng = distance_km * bearing.sin() / (KM_PER_DEGREE_LATITUDE * origin.lat().to_radians().cos());
    let point = LatLng::new(origin.lat() + dlat, origin.lng() + dlng)
        .map_err(|e| SimulationError::Config(format!("scenario point out of range: {e}")))?;
    Ok(point.to_cell(network.location_resolution()))
}

fn build_world<R: Rng>(
    rng: &mut R,
    params: &ScenarioParams,
    center: LatLng,
    network: Arc<HaversineRoadNetwork>,
    bev: &Bev,
) -> SimResult<World> {
    let mut world = World::new(network.clone(), &params.sim)?;
    let [dcfc, l2] = scenario_chargers();

    for i in 0..params.num_stations {
        let cell = random_cell_near(rng, center, params.radius_km, network.as_ref())?;
        let station = Station::new(
            StationId::new(format!("s{i}")),
            network.position_from_cell(cell),
            [(dcfc.clone(), params.dcfc_per_station), (l2.clone(), params.l2_per_station)]
                .into_iter()
                .filter(|(_, count)| *count > 0),
        );
        world = world.add_station(station)?;
    }

    let station_ids: Vec<StationId> = world.stations().keys().cloned().collect();
    for i in 0..params.num_bases {
        let base_id = BaseId::new(format!("b{i}"));
        let base = match station_ids.get(i).and_then(|id| world.station(id)) {
            Some(station) => Base::new(base_id, station.position.clone(), params.stalls_per_base)
                .with_station(station.id.clone()),
            None => {
                let cell = random_cell_near(rng, center, params.radius_km, network.as_ref())?;
                Base::new(base_id, network.position_from_cell(cell), params.stalls_per_base)
            }
        };
        world = world.add_base(base)?;
    }

    for i in 0..params.num_vehicles {
        let cell = random_cell_near(rng, center, params.radius_km, network.as_ref())?;
        let soc = rng.gen_range(params.min_initial_soc..=params.max_initial_soc);
        let vehicle = Vehicle::new(
            VehicleId::new(format!("v{i}")),
            network.position_from_cell(cell),
            bev.id().clone(),
            bev.initial_energy(soc),
            4,
        );
        world = world.add_vehicle(vehicle)?;
    }
    Ok(world)
}

fn build_requests<R: Rng>(
    rng: &mut R,
    params: &ScenarioParams,
    center: LatLng,
    network: &dyn RoadNetwork,
) -> SimResult<Vec<Request>> {
    let window_end: SimTime = params.sim.start_time + params.request_window_seconds.max(1);
    let mut requests = Vec::with_capacity(params.num_requests);
    for i in 0..params.num_requests {
        let origin = random_cell_near(rng, center, params.radius_km, network)?;
        let trip_km = rng.gen_range(params.min_trip_km..=params.max_trip_km);
        let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
        let destination = offset_cell(LatLng::from(origin), trip_km, bearing, network)?;
        let departure_time = rng.gen_range(params.sim.start_time..window_end);
        let request = Request::new(
            RequestId::new(format!("r{i}")),
            network.position_from_cell(origin),
            network.position_from_cell(destination),
            departure_time,
        )
        .with_cancel_time(departure_time + params.sim.request_cancel_time_seconds)
        .with_passenger_count(rng.gen_range(1..=2));
        requests.push(request);
    }
    Ok(requests)
}

/// Builds a ready-to-run scenario: the initial world, an environment that
/// knows the scenario vehicle model and chargers, and an update with a request
/// feed, zero charging prices and the bundled generators.
pub fn build_scenario(params: &ScenarioParams) -> SimResult<RunnerPayload> {
    params.validate()?;
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let center = LatLng::new(params.center_lat, params.center_lng)
        .map_err(|e| SimulationError::Config(format!("scenario centre: {e}")))?;
    let network = Arc::new(HaversineRoadNetwork::new(params.sim.location_resolution()?));
    let bev = scenario_bev();

    let world = build_world(&mut rng, params, center, network.clone(), &bev)?;
    let requests = build_requests(&mut rng, params, center, network.as_ref())?;

    let chargers = scenario_chargers();
    let prices = ChargingPriceUpdate::zero_prices(chargers.iter().map(|c| &c.id));
    let feed = RequestFeed::new(requests, params.rates);

    let config = SimulationConfig {
        sim: params.sim.clone(),
        dispatcher: params.dispatcher.clone(),
    };
    let env = chargers
        .into_iter()
        .fold(Environment::new(config), Environment::with_charger)
        .with_mechatronics(Arc::new(bev));

    info!(
        vehicles = world.vehicles().len(),
        stations = world.stations().len(),
        bases = world.bases().len(),
        requests = feed.pending_requests(),
        seed = ?params.seed,
        "scenario built"
    );
    Ok(RunnerPayload::new(world, env, Update::build(prices, feed, None)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::run_steps;
    use crate::spatial::distance_km_between_cells;

    fn small() -> ScenarioParams {
        ScenarioParams::default()
            .with_seed(7)
            .with_fleet(10, 40)
            .with_infrastructure(3, 2)
            .with_request_window_hours(1)
    }

    #[test]
    fn same_seed_same_scenario() {
        let a = build_scenario(&small()).expect("scenario");
        let b = build_scenario(&small()).expect("scenario");
        assert_eq!(a.world.vehicles(), b.world.vehicles());
        assert_eq!(a.world.stations(), b.world.stations());
        assert_eq!(a.update.pre_step_names(), b.update.pre_step_names());
    }

    #[test]
    fn entities_are_placed_near_the_centre() {
        let params = small();
        let payload = build_scenario(&params).expect("scenario");
        assert_eq!(payload.world.vehicles().len(), 10);
        assert_eq!(payload.world.stations().len(), 3);
        assert_eq!(payload.world.bases().len(), 2);
        assert!(payload.world.requests().is_empty());

        let center = LatLng::new(params.center_lat, params.center_lng)
            .expect("centre")
            .to_cell(payload.world.location_resolution());
        for vehicle in payload.world.vehicles().values() {
            assert!(distance_km_between_cells(center, vehicle.cell()) <= params.radius_km + 0.1);
        }
        for base in payload.world.bases().values() {
            assert!(base.station_id.is_some());
        }
        payload.world.check_index_consistency().expect("consistent indices");
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = small().with_trip_km(5.0, 1.0);
        assert!(matches!(build_scenario(&params), Err(SimulationError::Config(_))));
        let params = small().with_center(0.0, 0.0, 0.0);
        assert!(build_scenario(&params).is_err());
    }

    #[test]
    fn a_scenario_runs() {
        let mut payload = build_scenario(&small()).expect("scenario");
        let steps = run_steps(&mut payload, 30).expect("run");
        assert_eq!(steps, 30);
        assert_eq!(payload.world.sim_time(), 30 * 60);
        payload.world.check_index_consistency().expect("consistent indices");
    }
}
