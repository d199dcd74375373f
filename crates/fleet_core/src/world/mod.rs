//! The immutable world state.
//!
//! A [`World`] holds the clock, the four entity tables and their paired
//! location/search indices. Every mutator in [`ops`] returns a new world that
//! structurally shares unchanged tables with the old one; nothing is edited
//! in place, so any number of readers can hold a snapshot while the step loop
//! builds the next one.

mod ops;

use std::fmt;
use std::sync::Arc;

use h3o::{CellIndex, Resolution};
use im::OrdMap;

use crate::clock::{SimTime, SimulationClock};
use crate::config::SimConfig;
use crate::dispatcher::Instruction;
use crate::error::{EntityKind, SimResult, SimulationError};
use crate::model::{Base, BaseId, Request, RequestId, Station, StationId, Vehicle, VehicleId};
use crate::roadnetwork::RoadNetwork;
use crate::spatial::{distance_km_between_cells, EntityCells};

/// Ids of every entity located in one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitiesAtCell {
    pub vehicles: Vec<VehicleId>,
    pub requests: Vec<RequestId>,
    pub stations: Vec<StationId>,
    pub bases: Vec<BaseId>,
}

#[derive(Clone)]
pub struct World {
    road_network: Arc<dyn RoadNetwork>,
    clock: SimulationClock,
    location_resolution: Resolution,
    search_resolution: Resolution,
    vehicles: OrdMap<VehicleId, Vehicle>,
    requests: OrdMap<RequestId, Request>,
    stations: OrdMap<StationId, Station>,
    bases: OrdMap<BaseId, Base>,
    vehicle_cells: EntityCells<VehicleId>,
    request_cells: EntityCells<RequestId>,
    station_cells: EntityCells<StationId>,
    base_cells: EntityCells<BaseId>,
    applied_instructions: OrdMap<VehicleId, Instruction>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("sim_time", &self.clock.now())
            .field("vehicles", &self.vehicles.len())
            .field("requests", &self.requests.len())
            .field("stations", &self.stations.len())
            .field("bases", &self.bases.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// An empty world at `config.start_time`.
    pub fn new(road_network: Arc<dyn RoadNetwork>, config: &SimConfig) -> SimResult<Self> {
        config.validate()?;
        let location_resolution = config.location_resolution()?;
        let search_resolution = config.search_resolution()?;
        if road_network.location_resolution() != location_resolution {
            return Err(SimulationError::Config(format!(
                "road network resolution {} differs from location_resolution {}",
                road_network.location_resolution(),
                location_resolution
            )));
        }
        Ok(Self {
            road_network,
            clock: SimulationClock::new(config.start_time, config.timestep_duration_seconds),
            location_resolution,
            search_resolution,
            vehicles: OrdMap::new(),
            requests: OrdMap::new(),
            stations: OrdMap::new(),
            bases: OrdMap::new(),
            vehicle_cells: EntityCells::new(search_resolution),
            request_cells: EntityCells::new(search_resolution),
            station_cells: EntityCells::new(search_resolution),
            base_cells: EntityCells::new(search_resolution),
            applied_instructions: OrdMap::new(),
        })
    }

    pub fn clock(&self) -> SimulationClock {
        self.clock
    }

    pub fn sim_time(&self) -> SimTime {
        self.clock.now()
    }

    pub fn timestep_seconds(&self) -> u64 {
        self.clock.timestep_seconds()
    }

    pub fn road_network(&self) -> &dyn RoadNetwork {
        self.road_network.as_ref()
    }

    pub fn location_resolution(&self) -> Resolution {
        self.location_resolution
    }

    pub fn search_resolution(&self) -> Resolution {
        self.search_resolution
    }

    /// Advances the clock by one timestep.
    pub fn tick(&self) -> Self {
        Self {
            clock: self.clock.tick(),
            ..self.clone()
        }
    }

    pub fn vehicles(&self) -> &OrdMap<VehicleId, Vehicle> {
        &self.vehicles
    }

    pub fn requests(&self) -> &OrdMap<RequestId, Request> {
        &self.requests
    }

    pub fn stations(&self) -> &OrdMap<StationId, Station> {
        &self.stations
    }

    pub fn bases(&self) -> &OrdMap<BaseId, Base> {
        &self.bases
    }

    pub fn vehicle(&self, id: &VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    pub fn request(&self, id: &RequestId) -> Option<&Request> {
        self.requests.get(id)
    }

    pub fn station(&self, id: &StationId) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn base(&self, id: &BaseId) -> Option<&Base> {
        self.bases.get(id)
    }

    pub fn get_vehicle(&self, id: &VehicleId) -> SimResult<&Vehicle> {
        self.vehicle(id)
            .ok_or_else(|| SimulationError::not_found(EntityKind::Vehicle, id))
    }

    pub fn get_request(&self, id: &RequestId) -> SimResult<&Request> {
        self.request(id)
            .ok_or_else(|| SimulationError::not_found(EntityKind::Request, id))
    }

    pub fn get_station(&self, id: &StationId) -> SimResult<&Station> {
        self.station(id)
            .ok_or_else(|| SimulationError::not_found(EntityKind::Station, id))
    }

    pub fn get_base(&self, id: &BaseId) -> SimResult<&Base> {
        self.base(id)
            .ok_or_else(|| SimulationError::not_found(EntityKind::Base, id))
    }

    /// Vehicles matching `filter`, in id order.
    pub fn vehicles_where<F>(&self, filter: F) -> Vec<&Vehicle>
    where
        F: Fn(&Vehicle) -> bool,
    {
        self.vehicles.values().filter(|v| filter(v)).collect()
    }

    pub fn vehicle_cells(&self) -> &EntityCells<VehicleId> {
        &self.vehicle_cells
    }

    pub fn request_cells(&self) -> &EntityCells<RequestId> {
        &self.request_cells
    }

    pub fn station_cells(&self) -> &EntityCells<StationId> {
        &self.station_cells
    }

    pub fn base_cells(&self) -> &EntityCells<BaseId> {
        &self.base_cells
    }

    pub fn at_cell(&self, cell: CellIndex) -> EntitiesAtCell {
        fn ids<K: Ord + Clone>(cells: &EntityCells<K>, cell: CellIndex) -> Vec<K> {
            cells
                .at_location(cell)
                .map(|bucket| bucket.iter().cloned().collect())
                .unwrap_or_default()
        }
        EntitiesAtCell {
            vehicles: ids(&self.vehicle_cells, cell),
            requests: ids(&self.request_cells, cell),
            stations: ids(&self.station_cells, cell),
            bases: ids(&self.base_cells, cell),
        }
    }

    pub fn vehicle_at_station(&self, vehicle_id: &VehicleId, station_id: &StationId) -> bool {
        match (self.vehicle(vehicle_id), self.station(station_id)) {
            (Some(vehicle), Some(station)) => vehicle.cell() == station.cell(),
            _ => false,
        }
    }

    pub fn vehicle_at_base(&self, vehicle_id: &VehicleId, base_id: &BaseId) -> bool {
        match (self.vehicle(vehicle_id), self.base(base_id)) {
            (Some(vehicle), Some(base)) => vehicle.cell() == base.cell(),
            _ => false,
        }
    }

    pub fn vehicle_at_request(&self, vehicle_id: &VehicleId, request_id: &RequestId) -> bool {
        match (self.vehicle(vehicle_id), self.request(request_id)) {
            (Some(vehicle), Some(request)) => vehicle.cell() == request.cell(),
            _ => false,
        }
    }

    /// Closest station to `origin` accepted by `filter`, by great-circle distance.
    pub fn nearest_station<F>(
        &self,
        origin: CellIndex,
        max_search_distance_km: f64,
        filter: F,
    ) -> SimResult<Option<&Station>>
    where
        F: Fn(&Station) -> bool,
    {
        let nearest = self
            .station_cells
            .nearest_entity(origin, max_search_distance_km, |id| {
                let station = self.stations.get(id)?;
                filter(station).then(|| distance_km_between_cells(origin, station.cell()))
            })?;
        Ok(nearest.and_then(|(id, _)| self.stations.get(&id)))
    }

    /// Closest base to `origin` accepted by `filter`, by great-circle distance.
    pub fn nearest_base<F>(
        &self,
        origin: CellIndex,
        max_search_distance_km: f64,
        filter: F,
    ) -> SimResult<Option<&Base>>
    where
        F: Fn(&Base) -> bool,
    {
        let nearest = self
            .base_cells
            .nearest_entity(origin, max_search_distance_km, |id| {
                let base = self.bases.get(id)?;
                filter(base).then(|| distance_km_between_cells(origin, base.cell()))
            })?;
        Ok(nearest.and_then(|(id, _)| self.bases.get(&id)))
    }

    /// Instructions applied during the current step, keyed by vehicle.
    pub fn applied_instructions(&self) -> &OrdMap<VehicleId, Instruction> {
        &self.applied_instructions
    }

    pub fn with_applied_instruction(&self, instruction: Instruction) -> Self {
        Self {
            applied_instructions: self
                .applied_instructions
                .update(instruction.vehicle_id().clone(), instruction),
            ..self.clone()
        }
    }

    pub fn clear_applied_instructions(&self) -> Self {
        Self {
            applied_instructions: OrdMap::new(),
            ..self.clone()
        }
    }

    /// Checks that every entity is indexed exactly once at its current cell.
    pub fn check_index_consistency(&self) -> SimResult<()> {
        self.vehicle_cells
            .check_consistency(self.vehicles.iter().map(|(id, v)| (id, v.cell())))
            .and_then(|_| {
                self.request_cells
                    .check_consistency(self.requests.iter().map(|(id, r)| (id, r.cell())))
            })
            .and_then(|_| {
                self.station_cells
                    .check_consistency(self.stations.iter().map(|(id, s)| (id, s.cell())))
            })
            .and_then(|_| {
                self.base_cells
                    .check_consistency(self.bases.iter().map(|(id, b)| (id, b.cell())))
            })
            .map_err(SimulationError::IndexInconsistency)
    }
}
