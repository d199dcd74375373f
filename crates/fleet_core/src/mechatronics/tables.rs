use crate::roadnetwork::{LinkTraversal, Route};

use super::{KM_PER_MILE, SECONDS_PER_HOUR};

/// Piecewise-linear interpolation over sorted `xs`, clamped at both ends.
pub fn interpolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let upper = xs[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

fn sorted_columns(points: &[(f64, f64)], x_scale: f64, y_scale: f64) -> (Vec<f64>, Vec<f64>) {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    sorted
        .into_iter()
        .map(|(x, y)| (x * x_scale, y * y_scale))
        .unzip()
}

/// Energy use per mile as a function of speed.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularPowertrain {
    speeds_mph: Vec<f64>,
    energy_per_mile: Vec<f64>,
}

impl TabularPowertrain {
    /// `points` are `(speed_mph, normalized energy per mile)`; `scale` converts
    /// the normalized value into the vehicle's energy units per mile.
    pub fn from_normalized(points: &[(f64, f64)], scale: f64) -> Self {
        let (speeds_mph, energy_per_mile) = sorted_columns(points, 1.0, scale);
        Self {
            speeds_mph,
            energy_per_mile,
        }
    }

    /// Constant consumption regardless of speed.
    pub fn flat(energy_per_mile: f64) -> Self {
        Self::from_normalized(&[(0.0, 1.0), (100.0, 1.0)], energy_per_mile)
    }

    pub fn link_cost(&self, link: &LinkTraversal) -> f64 {
        let speed_mph = link.speed_kmph / KM_PER_MILE;
        let distance_miles = link.distance_km / KM_PER_MILE;
        interpolate(speed_mph, &self.speeds_mph, &self.energy_per_mile) * distance_miles
    }

    pub fn energy_cost(&self, route: &Route) -> f64 {
        route.links().iter().map(|link| self.link_cost(link)).sum()
    }
}

/// Charging power as a function of stored energy.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularPowercurve {
    energy_kwh: Vec<f64>,
    power_kw: Vec<f64>,
    step_size_seconds: u64,
}

impl TabularPowercurve {
    /// `points` are `(normalized energy, normalized power)`, scaled by the
    /// battery capacity and the nominal maximum charge power.
    pub fn from_normalized(
        points: &[(f64, f64)],
        battery_capacity_kwh: f64,
        nominal_max_charge_kw: f64,
        step_size_seconds: u64,
    ) -> Self {
        let (energy_kwh, power_kw) =
            sorted_columns(points, battery_capacity_kwh, nominal_max_charge_kw);
        Self {
            energy_kwh,
            power_kw,
            step_size_seconds: step_size_seconds.max(1),
        }
    }

    /// Integrates the curve from `start_kwh` for up to `duration_seconds`,
    /// stopping at `full_kwh`. Power never exceeds `max_power_kw`.
    ///
    /// Returns the new energy and the seconds spent charging.
    pub fn charge(
        &self,
        start_kwh: f64,
        full_kwh: f64,
        max_power_kw: f64,
        duration_seconds: u64,
    ) -> (f64, u64) {
        let mut energy = start_kwh;
        let mut elapsed = 0;
        while elapsed < duration_seconds && energy < full_kwh {
            let power = interpolate(energy, &self.energy_kwh, &self.power_kw).min(max_power_kw);
            if power <= 0.0 {
                break;
            }
            let step = self.step_size_seconds.min(duration_seconds - elapsed);
            energy += power * step as f64 / SECONDS_PER_HOUR;
            elapsed += step;
        }
        (energy, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_clamps_and_blends() {
        let xs = [0.0, 10.0, 20.0];
        let ys = [1.0, 2.0, 4.0];
        assert_eq!(interpolate(-5.0, &xs, &ys), 1.0);
        assert_eq!(interpolate(5.0, &xs, &ys), 1.5);
        assert_eq!(interpolate(15.0, &xs, &ys), 3.0);
        assert_eq!(interpolate(25.0, &xs, &ys), 4.0);
        assert_eq!(interpolate(10.0, &xs, &ys), 2.0);
    }

    #[test]
    fn powercurve_respects_charger_limit_and_duration() {
        let curve = TabularPowercurve::from_normalized(&[(0.0, 1.0), (1.0, 1.0)], 100.0, 100.0, 15);
        // limited to 36 kW for one hour
        let (energy, elapsed) = curve.charge(10.0, 99.9, 36.0, 3600);
        assert_eq!(elapsed, 3600);
        assert!((energy - 46.0).abs() < 1e-6);

        let (energy, elapsed) = curve.charge(99.9, 99.9, 36.0, 3600);
        assert_eq!(elapsed, 0);
        assert_eq!(energy, 99.9);
    }

    #[test]
    fn flat_powertrain_costs_distance() {
        let powertrain = TabularPowertrain::flat(0.25);
        let link = LinkTraversal {
            link_id: crate::model::LinkId::from("l"),
            start: crate::test_helpers::test_cell(),
            end: crate::test_helpers::test_neighbor_cell(),
            distance_km: KM_PER_MILE * 4.0,
            speed_kmph: 40.0,
        };
        assert!((powertrain.link_cost(&link) - 1.0).abs() < 1e-9);
    }
}
