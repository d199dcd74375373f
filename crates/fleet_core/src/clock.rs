/// Simulation time in seconds since the scenario epoch.
pub type SimTime = u64;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Fixed-step clock. `tick` is the only way simulated time advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    now: SimTime,
    timestep_seconds: u64,
}

impl SimulationClock {
    pub fn new(start: SimTime, timestep_seconds: u64) -> Self {
        Self {
            now: start,
            timestep_seconds,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn timestep_seconds(&self) -> u64 {
        self.timestep_seconds
    }

    pub fn tick(&self) -> Self {
        Self {
            now: self.now + self.timestep_seconds,
            ..*self
        }
    }

    /// Seconds elapsed since the most recent midnight.
    pub fn seconds_of_day(&self) -> u64 {
        self.now % SECONDS_PER_DAY
    }
}
