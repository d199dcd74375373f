use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::clock::SimTime;
use crate::roadnetwork::RoadNetwork;

use super::ids::{RequestId, VehicleId};
use super::membership::Membership;
use super::position::EntityPosition;

const MILES_PER_KM: f64 = 0.621371;

/// Seconds a request waits for pickup when no cancel time is given.
pub const DEFAULT_CANCEL_AFTER_SECONDS: u64 = 600;

#[derive(Debug, Clone, PartialEq)]
pub struct Passenger {
    pub id: String,
    pub origin: CellIndex,
    pub destination: CellIndex,
    pub departure_time: SimTime,
    pub vehicle_id: Option<VehicleId>,
}

impl Passenger {
    pub fn board(&self, vehicle_id: &VehicleId) -> Self {
        Self {
            vehicle_id: Some(vehicle_id.clone()),
            ..self.clone()
        }
    }
}

/// Pricing used to value a request when it enters the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestRateStructure {
    pub base_price: f64,
    pub price_per_mile: f64,
    pub minimum_price: f64,
}

impl RequestRateStructure {
    pub fn price(&self, distance_km: f64) -> f64 {
        let fare = self.base_price + self.price_per_mile * distance_km * MILES_PER_KM;
        fare.max(self.minimum_price)
    }
}

/// A trip request: one or more passengers travelling from `origin` to `destination`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub origin: EntityPosition,
    pub destination: EntityPosition,
    pub departure_time: SimTime,
    pub cancel_time: SimTime,
    pub passengers: Vec<Passenger>,
    pub allows_pooling: bool,
    pub membership: Membership,
    pub value: f64,
    pub dispatched_vehicle: Option<VehicleId>,
    pub dispatched_vehicle_time: Option<SimTime>,
}

impl Request {
    /// A single-passenger, public request that cancels after the default wait.
    pub fn new(
        id: RequestId,
        origin: EntityPosition,
        destination: EntityPosition,
        departure_time: SimTime,
    ) -> Self {
        let mut request = Self {
            id,
            origin,
            destination,
            departure_time,
            cancel_time: departure_time + DEFAULT_CANCEL_AFTER_SECONDS,
            passengers: Vec::new(),
            allows_pooling: false,
            membership: Membership::public(),
            value: 0.0,
            dispatched_vehicle: None,
            dispatched_vehicle_time: None,
        };
        request.passengers = request.build_passengers(1);
        request
    }

    fn build_passengers(&self, count: u32) -> Vec<Passenger> {
        (0..count)
            .map(|i| Passenger {
                id: format!("{}-{}", self.id, i),
                origin: self.origin.cell,
                destination: self.destination.cell,
                departure_time: self.departure_time,
                vehicle_id: None,
            })
            .collect()
    }

    pub fn with_passenger_count(mut self, count: u32) -> Self {
        self.passengers = self.build_passengers(count);
        self
    }

    pub fn with_cancel_time(mut self, cancel_time: SimTime) -> Self {
        self.cancel_time = cancel_time;
        self
    }

    pub fn with_pooling(mut self, allows_pooling: bool) -> Self {
        self.allows_pooling = allows_pooling;
        self
    }

    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = membership;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn cell(&self) -> CellIndex {
        self.origin.cell
    }

    pub fn passenger_count(&self) -> u32 {
        self.passengers.len() as u32
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_vehicle.is_some()
    }

    pub fn assign_dispatched_vehicle(&self, vehicle_id: &VehicleId, time: SimTime) -> Self {
        Self {
            dispatched_vehicle: Some(vehicle_id.clone()),
            dispatched_vehicle_time: Some(time),
            ..self.clone()
        }
    }

    pub fn unassign_dispatched_vehicle(&self) -> Self {
        Self {
            dispatched_vehicle: None,
            dispatched_vehicle_time: None,
            ..self.clone()
        }
    }

    /// Prices the trip by its routed distance.
    pub fn assign_value(&self, rates: &RequestRateStructure, road_network: &dyn RoadNetwork) -> Self {
        let distance_km = road_network
            .route(&self.origin, &self.destination)
            .distance_km();
        self.clone().with_value(rates.price(distance_km))
    }
}
