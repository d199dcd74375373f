use std::sync::Arc;

use fleet_core::clock::SimTime;
use fleet_core::config::{DispatcherConfig, SimConfig};
use fleet_core::dispatcher::InstructionGenerator;
use fleet_core::environment::Environment;
use fleet_core::mechatronics::Mechatronics;
use fleet_core::model::{Base, Request, RequestRateStructure, Station, Vehicle, VehicleId};
use fleet_core::reporting::MemoryReporter;
use fleet_core::runner::RunnerPayload;
use fleet_core::state::VehicleStateKind;
use fleet_core::test_helpers::{
    mock_base, mock_bev, mock_env_with, mock_request, mock_sim_config, mock_station, mock_vehicle,
    mock_world_with,
};
use fleet_core::update::{ChargingPriceUpdate, RequestFeed, Update};
use fleet_core::world::World;
use h3o::CellIndex;

/// Builder configuration for reproducible test worlds.
#[derive(Clone, Debug)]
pub struct TestWorldConfig {
    pub sim: SimConfig,
    pub dispatcher: DispatcherConfig,
    pub vehicles: Vec<Vehicle>,
    pub stations: Vec<Station>,
    pub bases: Vec<Base>,
    /// Requests released through the request feed rather than placed up front.
    pub feed: Vec<Request>,
}

impl Default for TestWorldConfig {
    fn default() -> Self {
        Self {
            sim: mock_sim_config(),
            dispatcher: DispatcherConfig::default(),
            vehicles: Vec::new(),
            stations: Vec::new(),
            bases: Vec::new(),
            feed: Vec::new(),
        }
    }
}

/// A built world with its environment and the reporter capturing its events.
pub struct TestSim {
    pub world: World,
    pub env: Environment,
    pub reporter: Arc<MemoryReporter>,
}

impl TestSim {
    pub fn state_of(&self, vehicle_id: &str) -> VehicleStateKind {
        state_of(&self.world, vehicle_id)
    }
}

pub fn state_of(world: &World, vehicle_id: &str) -> VehicleStateKind {
    world
        .get_vehicle(&VehicleId::from(vehicle_id))
        .map(|v| v.vehicle_state.kind())
        .expect("vehicle")
}

/// Helper that assembles worlds, environments and runner payloads for integration tests.
#[derive(Debug, Default)]
pub struct TestWorldBuilder {
    config: TestWorldConfig,
}

impl TestWorldBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run from `start` until `end` (seconds).
    pub fn with_time_range(mut self, start: SimTime, end: SimTime) -> Self {
        self.config.sim = self.config.sim.with_time_range(start, end);
        self
    }

    /// Tweak dispatcher thresholds.
    pub fn with_dispatcher<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut DispatcherConfig),
    {
        f(&mut self.config.dispatcher);
        self
    }

    /// Add an idle mock vehicle at 80% charge.
    pub fn with_vehicle(self, id: &str, cell: CellIndex) -> Self {
        self.with_vehicle_at_soc(id, cell, 0.8)
    }

    pub fn with_vehicle_at_soc(mut self, id: &str, cell: CellIndex, soc: f64) -> Self {
        let vehicle = mock_vehicle(id, cell).with_energy(mock_bev().initial_energy(soc));
        self.config.vehicles.push(vehicle);
        self
    }

    pub fn with_custom_vehicle(mut self, vehicle: Vehicle) -> Self {
        self.config.vehicles.push(vehicle);
        self
    }

    /// Add a station with two DCFC and two Level 2 plugs.
    pub fn with_station(mut self, id: &str, cell: CellIndex) -> Self {
        self.config.stations.push(mock_station(id, cell));
        self
    }

    pub fn with_custom_station(mut self, station: Station) -> Self {
        self.config.stations.push(station);
        self
    }

    pub fn with_base(mut self, id: &str, cell: CellIndex, stalls: u32) -> Self {
        self.config.bases.push(mock_base(id, cell, stalls));
        self
    }

    /// Queue a request for release through the request feed at its departure time.
    pub fn with_request(
        mut self,
        id: &str,
        origin: CellIndex,
        destination: CellIndex,
        departure_time: SimTime,
    ) -> Self {
        self.config
            .feed
            .push(mock_request(id, origin, destination, departure_time));
        self
    }

    pub fn with_custom_request(mut self, request: Request) -> Self {
        self.config.feed.push(request);
        self
    }

    /// Build the world with every vehicle, station and base placed; feed requests are not added.
    pub fn build(self) -> (TestSim, Vec<Request>) {
        let TestWorldConfig {
            sim,
            dispatcher,
            vehicles,
            stations,
            bases,
            feed,
        } = self.config;
        let reporter = Arc::new(MemoryReporter::new());
        let mut env = mock_env_with(sim.clone()).with_reporter(reporter.clone());
        env.config.dispatcher = dispatcher;

        let mut world = mock_world_with(&sim);
        for station in stations {
            world = world.add_station(station).expect("station");
        }
        for base in bases {
            world = world.add_base(base).expect("base");
        }
        for vehicle in vehicles {
            world = world.add_vehicle(vehicle).expect("vehicle");
        }
        (
            TestSim {
                world,
                env,
                reporter,
            },
            feed,
        )
    }

    /// Build a runner payload whose request feed holds every queued request.
    pub fn build_payload(
        self,
        generators: Option<Vec<Box<dyn InstructionGenerator>>>,
    ) -> (RunnerPayload, Arc<MemoryReporter>) {
        let (sim, feed) = self.build();
        let update = Update::build(
            ChargingPriceUpdate::default(),
            RequestFeed::new(feed, RequestRateStructure::default()),
            generators,
        );
        (RunnerPayload::new(sim.world, sim.env, update), sim.reporter)
    }
}
