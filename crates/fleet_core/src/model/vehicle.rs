use std::collections::BTreeMap;

use h3o::CellIndex;

use crate::state::{DriverState, VehicleState};

use super::energy::EnergyType;
use super::ids::{MechatronicsId, VehicleId};
use super::membership::Membership;
use super::position::EntityPosition;

/// A fleet vehicle. Every update produces a modified copy; states only change
/// through the vehicle state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: EntityPosition,
    pub membership: Membership,
    pub mechatronics_id: MechatronicsId,
    pub energy: BTreeMap<EnergyType, f64>,
    pub vehicle_state: VehicleState,
    pub driver_state: DriverState,
    pub total_seats: u32,
    pub balance: f64,
    pub distance_traveled_km: f64,
}

impl Vehicle {
    /// An idle, autonomous, public vehicle.
    pub fn new(
        id: VehicleId,
        position: EntityPosition,
        mechatronics_id: MechatronicsId,
        energy: BTreeMap<EnergyType, f64>,
        total_seats: u32,
    ) -> Self {
        Self {
            vehicle_state: VehicleState::idle(id.clone()),
            driver_state: DriverState::autonomous(id.clone()),
            id,
            position,
            membership: Membership::public(),
            mechatronics_id,
            energy,
            total_seats,
            balance: 0.0,
            distance_traveled_km: 0.0,
        }
    }

    pub fn cell(&self) -> CellIndex {
        self.position.cell
    }

    pub fn energy_of(&self, energy_type: EnergyType) -> f64 {
        self.energy.get(&energy_type).copied().unwrap_or(0.0)
    }

    pub fn with_membership(&self, membership: Membership) -> Self {
        Self {
            membership,
            ..self.clone()
        }
    }

    pub fn with_position(&self, position: EntityPosition) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn with_energy(&self, energy: BTreeMap<EnergyType, f64>) -> Self {
        Self {
            energy,
            ..self.clone()
        }
    }

    pub fn with_energy_of(&self, energy_type: EnergyType, amount: f64) -> Self {
        let mut energy = self.energy.clone();
        energy.insert(energy_type, amount);
        self.with_energy(energy)
    }

    pub fn with_vehicle_state(&self, vehicle_state: VehicleState) -> Self {
        Self {
            vehicle_state,
            ..self.clone()
        }
    }

    pub fn with_driver_state(&self, driver_state: DriverState) -> Self {
        Self {
            driver_state,
            ..self.clone()
        }
    }

    pub fn send_payment(&self, amount: f64) -> Self {
        Self {
            balance: self.balance - amount,
            ..self.clone()
        }
    }

    pub fn receive_payment(&self, amount: f64) -> Self {
        Self {
            balance: self.balance + amount,
            ..self.clone()
        }
    }

    pub fn tick_distance_traveled_km(&self, distance_km: f64) -> Self {
        Self {
            distance_traveled_km: self.distance_traveled_km + distance_km,
            ..self.clone()
        }
    }
}
