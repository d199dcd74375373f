//! Run-wide context shared read-only by every operation: configuration,
//! energy models, charger catalogue, driver schedules and the reporting sink.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::clock::SECONDS_PER_DAY;
use crate::config::SimulationConfig;
use crate::error::{EntityKind, SimResult, SimulationError};
use crate::mechatronics::Mechatronics;
use crate::model::{Charger, ChargerId, MechatronicsId, MembershipId, ScheduleId, Vehicle, VehicleId};
use crate::reporting::{NullReporter, Report, ReportEvent, Reporter};
use crate::world::World;

/// Whether a human driver is on shift at the world's current time.
pub type ScheduleFn = Arc<dyn Fn(&World, &VehicleId) -> bool + Send + Sync>;

/// On shift between two seconds-of-day; a start after the end wraps past midnight.
pub fn time_range_schedule(start_seconds: u64, end_seconds: u64) -> ScheduleFn {
    let start = start_seconds % SECONDS_PER_DAY;
    let end = end_seconds % SECONDS_PER_DAY;
    Arc::new(move |world: &World, _vehicle_id: &VehicleId| {
        let now = world.clock().seconds_of_day();
        if start <= end {
            start <= now && now < end
        } else {
            now >= start || now < end
        }
    })
}

#[derive(Clone)]
pub struct Environment {
    pub config: SimulationConfig,
    pub mechatronics: HashMap<MechatronicsId, Arc<dyn Mechatronics>>,
    pub chargers: HashMap<ChargerId, Charger>,
    pub schedules: HashMap<ScheduleId, ScheduleFn>,
    /// Fleets matched separately by the dispatcher. Empty means one public fleet.
    pub fleet_ids: BTreeSet<MembershipId>,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("mechatronics", &self.mechatronics.keys().collect::<Vec<_>>())
            .field("chargers", &self.chargers.keys().collect::<Vec<_>>())
            .field("schedules", &self.schedules.keys().collect::<Vec<_>>())
            .field("fleet_ids", &self.fleet_ids)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            mechatronics: HashMap::new(),
            chargers: HashMap::new(),
            schedules: HashMap::new(),
            fleet_ids: BTreeSet::new(),
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_mechatronics(mut self, mechatronics: Arc<dyn Mechatronics>) -> Self {
        self.mechatronics
            .insert(mechatronics.id().clone(), mechatronics);
        self
    }

    pub fn with_charger(mut self, charger: Charger) -> Self {
        self.chargers.insert(charger.id.clone(), charger);
        self
    }

    pub fn with_schedule(mut self, schedule_id: ScheduleId, schedule: ScheduleFn) -> Self {
        self.schedules.insert(schedule_id, schedule);
        self
    }

    pub fn with_fleet_id(mut self, fleet_id: MembershipId) -> Self {
        self.fleet_ids.insert(fleet_id);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn timestep_seconds(&self) -> u64 {
        self.config.sim.timestep_duration_seconds
    }

    pub fn mechatronics_for(&self, vehicle: &Vehicle) -> SimResult<&dyn Mechatronics> {
        self.mechatronics
            .get(&vehicle.mechatronics_id)
            .map(|m| m.as_ref())
            .ok_or_else(|| {
                SimulationError::not_found(EntityKind::Mechatronics, &vehicle.mechatronics_id)
                    .context(format!("vehicle {}", vehicle.id))
            })
    }

    pub fn report(&self, world: &World, event: ReportEvent) {
        self.reporter.file_report(Report::new(world.sim_time(), event));
    }
}
