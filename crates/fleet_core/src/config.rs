use h3o::Resolution;
use serde::{Deserialize, Serialize};

use crate::clock::{SimTime, SECONDS_PER_DAY};
use crate::error::{SimResult, SimulationError};
use crate::state::VehicleStateKind;

const DEFAULT_SIM_NAME: &str = "fleet_sim";
const DEFAULT_TIMESTEP_SECONDS: u64 = 60;
const DEFAULT_LOCATION_RESOLUTION: u8 = 15;
const DEFAULT_SEARCH_RESOLUTION: u8 = 7;
const DEFAULT_REQUEST_CANCEL_TIME_SECONDS: u64 = 600;

/// Clock and grid settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub sim_name: String,
    pub timestep_duration_seconds: u64,
    pub start_time: SimTime,
    /// The run stops once the clock reaches this time.
    pub end_time: SimTime,
    /// Fine H3 resolution entities are located at.
    pub location_resolution: u8,
    /// Coarse H3 resolution used to narrow spatial searches. Must be coarser than the location resolution.
    pub search_resolution: u8,
    /// Default wait before an unserved request is cancelled.
    pub request_cancel_time_seconds: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_name: DEFAULT_SIM_NAME.to_string(),
            timestep_duration_seconds: DEFAULT_TIMESTEP_SECONDS,
            start_time: 0,
            end_time: SECONDS_PER_DAY,
            location_resolution: DEFAULT_LOCATION_RESOLUTION,
            search_resolution: DEFAULT_SEARCH_RESOLUTION,
            request_cancel_time_seconds: DEFAULT_REQUEST_CANCEL_TIME_SECONDS,
        }
    }
}

fn resolution(value: u8, name: &str) -> SimResult<Resolution> {
    Resolution::try_from(value)
        .map_err(|e| SimulationError::Config(format!("{name} {value}: {e}")))
}

impl SimConfig {
    pub fn location_resolution(&self) -> SimResult<Resolution> {
        resolution(self.location_resolution, "location_resolution")
    }

    pub fn search_resolution(&self) -> SimResult<Resolution> {
        resolution(self.search_resolution, "search_resolution")
    }

    pub fn validate(&self) -> SimResult<()> {
        let location = self.location_resolution()?;
        let search = self.search_resolution()?;
        if search >= location {
            return Err(SimulationError::Config(format!(
                "search_resolution {} must be coarser than location_resolution {}",
                self.search_resolution, self.location_resolution
            )));
        }
        if self.timestep_duration_seconds == 0 {
            return Err(SimulationError::Config(
                "timestep_duration_seconds must be positive".to_string(),
            ));
        }
        if self.start_time >= self.end_time {
            return Err(SimulationError::Config(format!(
                "start_time {} must precede end_time {}",
                self.start_time, self.end_time
            )));
        }
        Ok(())
    }

    pub fn with_resolutions(mut self, location: u8, search: u8) -> Self {
        self.location_resolution = location;
        self.search_resolution = search;
        self
    }

    pub fn with_time_range(mut self, start_time: SimTime, end_time: SimTime) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_timestep(mut self, timestep_duration_seconds: u64) -> Self {
        self.timestep_duration_seconds = timestep_duration_seconds;
        self
    }
}

/// How a charging dispatcher ranks candidate stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingSearchType {
    /// Grid distance scaled by queue length.
    #[default]
    NearestShortestQueue,
    /// Drive time plus estimated wait plus charge time.
    ShortestTimeToCharge,
}

const DEFAULT_UPDATE_INTERVAL_SECONDS: u64 = 600;
const DEFAULT_MATCHING_RANGE_KM: f64 = 20.0;
const DEFAULT_CHARGING_RANGE_KM: f64 = 20.0;
const DEFAULT_CHARGING_RANGE_SOFT_KM: f64 = 50.0;
const DEFAULT_BASE_CHARGING_RANGE_KM: f64 = 100.0;
const DEFAULT_IDEAL_FASTCHARGE_SOC_LIMIT: f64 = 0.8;
const DEFAULT_MAX_SEARCH_RADIUS_KM: f64 = 100.0;
const DEFAULT_OFF_SHIFT_CHARGE_TARGET: f64 = 1.0;
const DEFAULT_IDLE_TIME_OUT_SECONDS: u64 = 1800;

/// Tuning for the bundled instruction generators and driver behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub default_update_interval_seconds: u64,
    /// Vehicles need more range than this to be offered trips.
    pub matching_range_km_threshold: f64,
    /// Reserve range a vehicle keeps beyond the distance to the nearest station.
    pub charging_range_km_threshold: f64,
    /// Vehicles at or below this range are considered for charging.
    pub charging_range_km_soft_threshold: f64,
    /// Vehicles charging at a base below this range are not offered trips.
    pub base_charging_range_km_threshold: f64,
    /// Fast charging stops at this state of charge.
    pub ideal_fastcharge_soc_limit: f64,
    pub max_search_radius_km: f64,
    pub charging_search_type: ChargingSearchType,
    /// State of charge human drivers charge to when going off shift.
    pub human_driver_off_shift_charge_target: f64,
    /// Idle vehicles are sent home or repositioned after this long.
    pub idle_time_out_seconds: u64,
    pub valid_dispatch_states: Vec<VehicleStateKind>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_update_interval_seconds: DEFAULT_UPDATE_INTERVAL_SECONDS,
            matching_range_km_threshold: DEFAULT_MATCHING_RANGE_KM,
            charging_range_km_threshold: DEFAULT_CHARGING_RANGE_KM,
            charging_range_km_soft_threshold: DEFAULT_CHARGING_RANGE_SOFT_KM,
            base_charging_range_km_threshold: DEFAULT_BASE_CHARGING_RANGE_KM,
            ideal_fastcharge_soc_limit: DEFAULT_IDEAL_FASTCHARGE_SOC_LIMIT,
            max_search_radius_km: DEFAULT_MAX_SEARCH_RADIUS_KM,
            charging_search_type: ChargingSearchType::default(),
            human_driver_off_shift_charge_target: DEFAULT_OFF_SHIFT_CHARGE_TARGET,
            idle_time_out_seconds: DEFAULT_IDLE_TIME_OUT_SECONDS,
            valid_dispatch_states: vec![VehicleStateKind::Idle, VehicleStateKind::Repositioning],
        }
    }
}

impl DispatcherConfig {
    pub fn is_valid_dispatch_state(&self, kind: VehicleStateKind) -> bool {
        self.valid_dispatch_states.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub sim: SimConfig,
    pub dispatcher: DispatcherConfig,
}

impl SimulationConfig {
    pub fn validate(&self) -> SimResult<()> {
        self.sim.validate()
    }
}
