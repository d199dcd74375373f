//! Vehicle energy models.
//!
//! The kernel only talks to [`Mechatronics`]: state of charge, range, and the
//! energy effect of charging, idling and driving. [`Bev`] and [`Ice`] are the
//! bundled models, both driven by tabular curves.

mod bev;
mod ice;
mod tables;

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{Charger, EnergyType, MechatronicsId, Vehicle};
use crate::roadnetwork::Route;

pub use bev::Bev;
pub use ice::Ice;
pub use tables::{interpolate, TabularPowercurve, TabularPowertrain};

pub(crate) const KM_PER_MILE: f64 = 1.609344;
pub(crate) const SECONDS_PER_HOUR: f64 = 3600.0;

/// Upper bound on simulated charge slices when estimating time to full.
const MAX_CHARGE_STEPS: usize = 100_000;

/// Result of plugging a vehicle into a charger for some duration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeApplied {
    pub vehicle: Vehicle,
    pub energy_delta: f64,
    pub charge_time_seconds: u64,
}

impl ChargeApplied {
    pub fn unchanged(vehicle: &Vehicle) -> Self {
        Self {
            vehicle: vehicle.clone(),
            energy_delta: 0.0,
            charge_time_seconds: 0,
        }
    }
}

pub trait Mechatronics: Send + Sync + fmt::Debug {
    fn id(&self) -> &MechatronicsId;

    /// Energy type stored by this vehicle.
    fn energy_type(&self) -> EnergyType;

    fn valid_charger(&self, charger: &Charger) -> bool {
        charger.energy_type == self.energy_type()
    }

    /// Energy map for a vehicle starting at `soc` (0..=1) of capacity.
    fn initial_energy(&self, soc: f64) -> BTreeMap<EnergyType, f64>;

    fn range_remaining_km(&self, vehicle: &Vehicle) -> f64;

    /// State of charge needed to cover `required_range_km`.
    fn calc_required_soc(&self, required_range_km: f64) -> f64;

    fn state_of_charge(&self, vehicle: &Vehicle) -> f64;

    fn is_empty(&self, vehicle: &Vehicle) -> bool;

    fn is_full(&self, vehicle: &Vehicle) -> bool;

    fn apply_drive(&self, vehicle: &Vehicle, route: &Route) -> Vehicle;

    fn apply_idle(&self, vehicle: &Vehicle, duration_seconds: u64) -> Vehicle;

    fn apply_charge(&self, vehicle: &Vehicle, charger: &Charger, duration_seconds: u64)
        -> ChargeApplied;
}

/// Seconds of charging on `charger` until `target_soc`, simulated in `step_seconds` slices.
///
/// Stops early when a slice makes no progress, so an unreachable target yields
/// the time spent until charging stalls.
pub fn time_to_full(
    vehicle: &Vehicle,
    mechatronics: &dyn Mechatronics,
    charger: &Charger,
    target_soc: f64,
    step_seconds: u64,
) -> u64 {
    if step_seconds == 0 {
        return 0;
    }
    let mut current = vehicle.clone();
    let mut elapsed = 0;
    for _ in 0..MAX_CHARGE_STEPS {
        if mechatronics.state_of_charge(&current) >= target_soc {
            break;
        }
        let applied = mechatronics.apply_charge(&current, charger, step_seconds);
        if applied.charge_time_seconds == 0 || applied.energy_delta <= 0.0 {
            break;
        }
        elapsed += applied.charge_time_seconds;
        current = applied.vehicle;
    }
    elapsed
}
