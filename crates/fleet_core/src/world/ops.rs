use std::fmt;

use h3o::CellIndex;

use crate::error::{EntityKind, SimResult, SimulationError};
use crate::model::{Base, BaseId, Request, RequestId, Station, StationId, Vehicle, VehicleId};

use super::World;

impl World {
    fn validate_cell(&self, kind: EntityKind, id: &impl fmt::Display, cell: CellIndex) -> SimResult<()> {
        if cell.resolution() != self.location_resolution {
            return Err(SimulationError::ResolutionMismatch {
                cell,
                actual: u8::from(cell.resolution()),
                expected: u8::from(self.location_resolution),
            }
            .context(format!("{kind} {id}")));
        }
        if !self.road_network.cell_within_geofence(cell) {
            return Err(SimulationError::OutsideGeofence {
                kind,
                id: id.to_string(),
                cell,
            });
        }
        Ok(())
    }

    pub fn add_vehicle(&self, vehicle: Vehicle) -> SimResult<Self> {
        if self.vehicles.contains_key(&vehicle.id) {
            return Err(SimulationError::Duplicate {
                kind: EntityKind::Vehicle,
                id: vehicle.id.to_string(),
            });
        }
        self.validate_cell(EntityKind::Vehicle, &vehicle.id, vehicle.cell())?;
        Ok(Self {
            vehicle_cells: self.vehicle_cells.insert(vehicle.id.clone(), vehicle.cell())?,
            vehicles: self.vehicles.update(vehicle.id.clone(), vehicle),
            ..self.clone()
        })
    }

    /// Replaces a vehicle. Indices only change when the vehicle changed cell.
    pub fn modify_vehicle(&self, vehicle: Vehicle) -> SimResult<Self> {
        let previous = self.get_vehicle(&vehicle.id)?;
        if previous.cell() == vehicle.cell() {
            return Ok(Self {
                vehicles: self.vehicles.update(vehicle.id.clone(), vehicle),
                ..self.clone()
            });
        }
        self.validate_cell(EntityKind::Vehicle, &vehicle.id, vehicle.cell())?;
        Ok(Self {
            vehicle_cells: self
                .vehicle_cells
                .relocate(&vehicle.id, previous.cell(), vehicle.cell())?,
            vehicles: self.vehicles.update(vehicle.id.clone(), vehicle),
            ..self.clone()
        })
    }

    pub fn remove_vehicle(&self, vehicle_id: &VehicleId) -> SimResult<Self> {
        let vehicle = self.get_vehicle(vehicle_id)?;
        Ok(Self {
            vehicle_cells: self.vehicle_cells.remove(vehicle_id, vehicle.cell())?,
            vehicles: self.vehicles.without(vehicle_id),
            ..self.clone()
        })
    }

    /// Adds a request. Requests without passengers or whose cancel time has
    /// already passed are refused.
    pub fn add_request(&self, request: Request) -> SimResult<Self> {
        if self.requests.contains_key(&request.id) {
            return Err(SimulationError::Duplicate {
                kind: EntityKind::Request,
                id: request.id.to_string(),
            });
        }
        if request.passengers.is_empty() {
            return Err(SimulationError::InvalidEntity {
                kind: EntityKind::Request,
                id: request.id.to_string(),
                reason: "request has no passengers".to_string(),
            });
        }
        if request.cancel_time <= self.sim_time() {
            return Err(SimulationError::InvalidEntity {
                kind: EntityKind::Request,
                id: request.id.to_string(),
                reason: format!(
                    "cancel time {} is not after current time {}",
                    request.cancel_time,
                    self.sim_time()
                ),
            });
        }
        self.validate_cell(EntityKind::Request, &request.id, request.origin.cell)?;
        self.validate_cell(EntityKind::Request, &request.id, request.destination.cell)?;
        Ok(Self {
            request_cells: self.request_cells.insert(request.id.clone(), request.cell())?,
            requests: self.requests.update(request.id.clone(), request),
            ..self.clone()
        })
    }

    pub fn modify_request(&self, request: Request) -> SimResult<Self> {
        let previous = self.get_request(&request.id)?;
        if previous.cell() == request.cell() {
            return Ok(Self {
                requests: self.requests.update(request.id.clone(), request),
                ..self.clone()
            });
        }
        self.validate_cell(EntityKind::Request, &request.id, request.cell())?;
        Ok(Self {
            request_cells: self
                .request_cells
                .relocate(&request.id, previous.cell(), request.cell())?,
            requests: self.requests.update(request.id.clone(), request),
            ..self.clone()
        })
    }

    pub fn remove_request(&self, request_id: &RequestId) -> SimResult<Self> {
        let request = self.get_request(request_id)?;
        Ok(Self {
            request_cells: self.request_cells.remove(request_id, request.cell())?,
            requests: self.requests.without(request_id),
            ..self.clone()
        })
    }

    pub fn add_station(&self, station: Station) -> SimResult<Self> {
        if self.stations.contains_key(&station.id) {
            return Err(SimulationError::Duplicate {
                kind: EntityKind::Station,
                id: station.id.to_string(),
            });
        }
        self.validate_cell(EntityKind::Station, &station.id, station.cell())?;
        Ok(Self {
            station_cells: self.station_cells.insert(station.id.clone(), station.cell())?,
            stations: self.stations.update(station.id.clone(), station),
            ..self.clone()
        })
    }

    /// Replaces a station's state. Stations never move.
    pub fn modify_station(&self, station: Station) -> SimResult<Self> {
        let previous = self.get_station(&station.id)?;
        if previous.cell() != station.cell() {
            return Err(SimulationError::IllegalRelocation {
                kind: EntityKind::Station,
                id: station.id.to_string(),
                from: previous.cell(),
                to: station.cell(),
            });
        }
        Ok(Self {
            stations: self.stations.update(station.id.clone(), station),
            ..self.clone()
        })
    }

    pub fn remove_station(&self, station_id: &StationId) -> SimResult<Self> {
        let station = self.get_station(station_id)?;
        Ok(Self {
            station_cells: self.station_cells.remove(station_id, station.cell())?,
            stations: self.stations.without(station_id),
            ..self.clone()
        })
    }

    pub fn add_base(&self, base: Base) -> SimResult<Self> {
        if self.bases.contains_key(&base.id) {
            return Err(SimulationError::Duplicate {
                kind: EntityKind::Base,
                id: base.id.to_string(),
            });
        }
        self.validate_cell(EntityKind::Base, &base.id, base.cell())?;
        Ok(Self {
            base_cells: self.base_cells.insert(base.id.clone(), base.cell())?,
            bases: self.bases.update(base.id.clone(), base),
            ..self.clone()
        })
    }

    /// Replaces a base's state. Bases never move.
    pub fn modify_base(&self, base: Base) -> SimResult<Self> {
        let previous = self.get_base(&base.id)?;
        if previous.cell() != base.cell() {
            return Err(SimulationError::IllegalRelocation {
                kind: EntityKind::Base,
                id: base.id.to_string(),
                from: previous.cell(),
                to: base.cell(),
            });
        }
        Ok(Self {
            bases: self.bases.update(base.id.clone(), base),
            ..self.clone()
        })
    }

    pub fn remove_base(&self, base_id: &BaseId) -> SimResult<Self> {
        let base = self.get_base(base_id)?;
        Ok(Self {
            base_cells: self.base_cells.remove(base_id, base.cell())?,
            bases: self.bases.without(base_id),
            ..self.clone()
        })
    }
}
