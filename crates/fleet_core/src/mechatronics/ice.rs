use std::collections::BTreeMap;

use crate::model::{Charger, EnergyType, MechatronicsId, Vehicle};
use crate::roadnetwork::Route;

use super::tables::TabularPowertrain;
use super::{ChargeApplied, Mechatronics, KM_PER_MILE, SECONDS_PER_HOUR};

/// Internal combustion vehicle; energy is gallons of gasoline.
#[derive(Debug, Clone)]
pub struct Ice {
    id: MechatronicsId,
    tank_capacity_gallons: f64,
    idle_gallons_per_hour: f64,
    nominal_miles_per_gallon: f64,
    powertrain: TabularPowertrain,
}

impl Ice {
    pub fn new(
        id: MechatronicsId,
        tank_capacity_gallons: f64,
        idle_gallons_per_hour: f64,
        nominal_miles_per_gallon: f64,
        powertrain: TabularPowertrain,
    ) -> Self {
        Self {
            id,
            tank_capacity_gallons,
            idle_gallons_per_hour,
            nominal_miles_per_gallon,
            powertrain,
        }
    }

    fn gallons(&self, vehicle: &Vehicle) -> f64 {
        vehicle.energy_of(EnergyType::Gasoline)
    }
}

impl Mechatronics for Ice {
    fn id(&self) -> &MechatronicsId {
        &self.id
    }

    fn energy_type(&self) -> EnergyType {
        EnergyType::Gasoline
    }

    fn initial_energy(&self, soc: f64) -> BTreeMap<EnergyType, f64> {
        BTreeMap::from([(EnergyType::Gasoline, self.tank_capacity_gallons * soc.clamp(0.0, 1.0))])
    }

    fn range_remaining_km(&self, vehicle: &Vehicle) -> f64 {
        self.gallons(vehicle) * self.nominal_miles_per_gallon * KM_PER_MILE
    }

    fn calc_required_soc(&self, required_range_km: f64) -> f64 {
        required_range_km / KM_PER_MILE / self.nominal_miles_per_gallon / self.tank_capacity_gallons
    }

    fn state_of_charge(&self, vehicle: &Vehicle) -> f64 {
        self.gallons(vehicle) / self.tank_capacity_gallons
    }

    fn is_empty(&self, vehicle: &Vehicle) -> bool {
        self.gallons(vehicle) <= 0.0
    }

    fn is_full(&self, vehicle: &Vehicle) -> bool {
        self.gallons(vehicle) >= self.tank_capacity_gallons
    }

    fn apply_drive(&self, vehicle: &Vehicle, route: &Route) -> Vehicle {
        let used = self.powertrain.energy_cost(route);
        vehicle.with_energy_of(EnergyType::Gasoline, (self.gallons(vehicle) - used).max(0.0))
    }

    fn apply_idle(&self, vehicle: &Vehicle, duration_seconds: u64) -> Vehicle {
        let used = self.idle_gallons_per_hour * duration_seconds as f64 / SECONDS_PER_HOUR;
        vehicle.with_energy_of(EnergyType::Gasoline, (self.gallons(vehicle) - used).max(0.0))
    }

    fn apply_charge(&self, vehicle: &Vehicle, charger: &Charger, duration_seconds: u64) -> ChargeApplied {
        if !self.valid_charger(charger) {
            return ChargeApplied::unchanged(vehicle);
        }
        let start = self.gallons(vehicle);
        let refueled = (start + charger.rate * duration_seconds as f64).min(self.tank_capacity_gallons);
        ChargeApplied {
            vehicle: vehicle.with_energy_of(EnergyType::Gasoline, refueled),
            energy_delta: refueled - start,
            charge_time_seconds: duration_seconds,
        }
    }
}
