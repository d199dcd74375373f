use std::collections::BTreeMap;

use crate::model::{Charger, EnergyType, MechatronicsId, Vehicle};
use crate::roadnetwork::Route;

use super::tables::{TabularPowercurve, TabularPowertrain};
use super::{ChargeApplied, Mechatronics, KM_PER_MILE, SECONDS_PER_HOUR};

const KWH_PER_WH: f64 = 0.001;
pub const DEFAULT_BATTERY_FULL_THRESHOLD_KWH: f64 = 0.1;

/// Battery electric vehicle.
#[derive(Debug, Clone)]
pub struct Bev {
    id: MechatronicsId,
    battery_capacity_kwh: f64,
    idle_kwh_per_hour: f64,
    nominal_watt_hour_per_mile: f64,
    /// Chargers below this rate charge linearly; faster ones follow the powercurve.
    charge_taper_cutoff_kw: f64,
    battery_full_threshold_kwh: f64,
    powertrain: TabularPowertrain,
    powercurve: TabularPowercurve,
}

impl Bev {
    pub fn new(
        id: MechatronicsId,
        battery_capacity_kwh: f64,
        idle_kwh_per_hour: f64,
        nominal_watt_hour_per_mile: f64,
        charge_taper_cutoff_kw: f64,
        powertrain: TabularPowertrain,
        powercurve: TabularPowercurve,
    ) -> Self {
        Self {
            id,
            battery_capacity_kwh,
            idle_kwh_per_hour,
            nominal_watt_hour_per_mile,
            charge_taper_cutoff_kw,
            battery_full_threshold_kwh: DEFAULT_BATTERY_FULL_THRESHOLD_KWH,
            powertrain,
            powercurve,
        }
    }

    pub fn with_battery_full_threshold_kwh(mut self, threshold_kwh: f64) -> Self {
        self.battery_full_threshold_kwh = threshold_kwh;
        self
    }

    pub fn battery_capacity_kwh(&self) -> f64 {
        self.battery_capacity_kwh
    }

    fn kwh_per_mile(&self) -> f64 {
        self.nominal_watt_hour_per_mile * KWH_PER_WH
    }

    fn kwh(&self, vehicle: &Vehicle) -> f64 {
        vehicle.energy_of(EnergyType::Electric)
    }

    fn full_kwh(&self) -> f64 {
        self.battery_capacity_kwh - self.battery_full_threshold_kwh
    }
}

impl Mechatronics for Bev {
    fn id(&self) -> &MechatronicsId {
        &self.id
    }

    fn energy_type(&self) -> EnergyType {
        EnergyType::Electric
    }

    fn initial_energy(&self, soc: f64) -> BTreeMap<EnergyType, f64> {
        BTreeMap::from([(EnergyType::Electric, self.battery_capacity_kwh * soc.clamp(0.0, 1.0))])
    }

    fn range_remaining_km(&self, vehicle: &Vehicle) -> f64 {
        self.kwh(vehicle) / self.kwh_per_mile() * KM_PER_MILE
    }

    fn calc_required_soc(&self, required_range_km: f64) -> f64 {
        required_range_km / KM_PER_MILE * self.kwh_per_mile() / self.battery_capacity_kwh
    }

    fn state_of_charge(&self, vehicle: &Vehicle) -> f64 {
        self.kwh(vehicle) / self.battery_capacity_kwh
    }

    fn is_empty(&self, vehicle: &Vehicle) -> bool {
        self.kwh(vehicle) <= 0.0
    }

    fn is_full(&self, vehicle: &Vehicle) -> bool {
        self.kwh(vehicle) >= self.full_kwh()
    }

    fn apply_drive(&self, vehicle: &Vehicle, route: &Route) -> Vehicle {
        let used = self.powertrain.energy_cost(route);
        vehicle.with_energy_of(EnergyType::Electric, (self.kwh(vehicle) - used).max(0.0))
    }

    fn apply_idle(&self, vehicle: &Vehicle, duration_seconds: u64) -> Vehicle {
        let used = self.idle_kwh_per_hour * duration_seconds as f64 / SECONDS_PER_HOUR;
        vehicle.with_energy_of(EnergyType::Electric, (self.kwh(vehicle) - used).max(0.0))
    }

    fn apply_charge(&self, vehicle: &Vehicle, charger: &Charger, duration_seconds: u64) -> ChargeApplied {
        if !self.valid_charger(charger) {
            return ChargeApplied::unchanged(vehicle);
        }
        let start = self.kwh(vehicle);
        let (charged, seconds) = if charger.rate < self.charge_taper_cutoff_kw {
            let charged = start + charger.rate * duration_seconds as f64 / SECONDS_PER_HOUR;
            (charged, duration_seconds)
        } else {
            self.powercurve
                .charge(start, self.full_kwh(), charger.rate, duration_seconds)
        };
        let new_kwh = charged.min(self.battery_capacity_kwh);
        ChargeApplied {
            vehicle: vehicle.with_energy_of(EnergyType::Electric, new_kwh),
            energy_delta: new_kwh - start,
            charge_time_seconds: seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mock_bev, mock_dcfc_charger, mock_l2_charger, mock_route, mock_vehicle, test_cell};

    #[test]
    fn range_and_required_soc_are_inverse() {
        let bev = mock_bev();
        let vehicle = mock_vehicle("v1", test_cell()).with_energy(bev.initial_energy(0.5));
        let range = bev.range_remaining_km(&vehicle);
        assert!((bev.calc_required_soc(range) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn slow_charger_is_linear() {
        let bev = mock_bev();
        let vehicle = mock_vehicle("v1", test_cell()).with_energy(bev.initial_energy(0.2));
        let l2 = mock_l2_charger();
        let applied = bev.apply_charge(&vehicle, &l2, 3600);
        assert_eq!(applied.charge_time_seconds, 3600);
        assert!((applied.energy_delta - l2.rate).abs() < 1e-9);
    }

    #[test]
    fn fast_charge_stops_at_full_threshold() {
        let bev = mock_bev();
        let vehicle = mock_vehicle("v1", test_cell()).with_energy(bev.initial_energy(0.1));
        let applied = bev.apply_charge(&vehicle, &mock_dcfc_charger(), 24 * 3600);
        assert!(bev.is_full(&applied.vehicle));
        assert!(applied.charge_time_seconds < 24 * 3600);
        assert!(bev.state_of_charge(&applied.vehicle) <= 1.0);
    }

    #[test]
    fn drive_and_idle_never_go_negative() {
        let bev = mock_bev();
        let vehicle = mock_vehicle("v1", test_cell()).with_energy(bev.initial_energy(0.001));
        let driven = bev.apply_drive(&vehicle, &mock_route(test_cell(), 50.0));
        assert!(bev.is_empty(&driven));
        let idled = bev.apply_idle(&vehicle, 10 * 24 * 3600);
        assert_eq!(idled.energy_of(EnergyType::Electric), 0.0);
    }

    #[test]
    fn gasoline_charger_is_invalid() {
        let bev = mock_bev();
        let vehicle = mock_vehicle("v1", test_cell()).with_energy(bev.initial_energy(0.2));
        let applied = bev.apply_charge(&vehicle, &Charger::gasoline("pump", 0.1), 3600);
        assert_eq!(applied, ChargeApplied::unchanged(&vehicle));
    }
}
