//! Fire-and-forget reporting sink.
//!
//! The kernel files a [`Report`] at well-defined points (request added, pickup,
//! dropoff, cancellation, charge session, movement, refuel search, shift
//! change, instruction applied) and never reads reports back. The sink is
//! carried by the [`Environment`](crate::environment::Environment).

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::clock::SimTime;
use crate::dispatcher::Instruction;
use crate::model::{ChargerId, RequestId, StationId, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleEventType {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report_type", rename_all = "snake_case")]
pub enum ReportEvent {
    AddRequest {
        request_id: RequestId,
        departure_time: SimTime,
        cancel_time: SimTime,
        fleet_id: String,
    },
    PickupRequest {
        vehicle_id: VehicleId,
        request_id: RequestId,
        cell: u64,
        price: f64,
        passengers: u32,
    },
    DropoffRequest {
        vehicle_id: VehicleId,
        request_id: RequestId,
        cell: u64,
        passengers: u32,
        departure_time: SimTime,
    },
    CancelRequest {
        request_id: RequestId,
        departure_time: SimTime,
        cancel_time: SimTime,
        fleet_id: String,
    },
    Instruction {
        instruction: Instruction,
    },
    VehicleCharge {
        vehicle_id: VehicleId,
        station_id: StationId,
        charger_id: ChargerId,
        energy_delta: f64,
        price: f64,
        soc: f64,
    },
    VehicleMove {
        vehicle_id: VehicleId,
        vehicle_state: String,
        start_cell: u64,
        end_cell: u64,
        distance_km: f64,
        energy_delta: f64,
    },
    RefuelSearch {
        vehicle_id: VehicleId,
        vehicle_state: String,
        soc: f64,
        range_km: f64,
    },
    DriverSchedule {
        vehicle_id: VehicleId,
        schedule_event: ScheduleEventType,
    },
}

impl ReportEvent {
    /// The serialized `report_type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportEvent::AddRequest { .. } => "add_request",
            ReportEvent::PickupRequest { .. } => "pickup_request",
            ReportEvent::DropoffRequest { .. } => "dropoff_request",
            ReportEvent::CancelRequest { .. } => "cancel_request",
            ReportEvent::Instruction { .. } => "instruction",
            ReportEvent::VehicleCharge { .. } => "vehicle_charge",
            ReportEvent::VehicleMove { .. } => "vehicle_move",
            ReportEvent::RefuelSearch { .. } => "refuel_search",
            ReportEvent::DriverSchedule { .. } => "driver_schedule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub sim_time: SimTime,
    #[serde(flatten)]
    pub event: ReportEvent,
}

impl Report {
    pub fn new(sim_time: SimTime, event: ReportEvent) -> Self {
        Self { sim_time, event }
    }
}

pub trait Reporter: Send + Sync {
    fn file_report(&self, report: Report);
}

/// Discards every report.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn file_report(&self, _report: Report) {}
}

/// Emits reports as `tracing` events under the `fleet_core::report` target.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn file_report(&self, report: Report) {
        info!(
            target: "fleet_core::report",
            sim_time = report.sim_time,
            report_type = report.event.kind(),
            event = ?report.event,
        );
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        match self.reports.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reports_of_kind(&self, kind: &str) -> Vec<Report> {
        self.reports()
            .into_iter()
            .filter(|r| r.event.kind() == kind)
            .collect()
    }

    pub fn clear(&self) {
        match self.reports.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Reporter for MemoryReporter {
    fn file_report(&self, report: Report) {
        match self.reports.lock() {
            Ok(mut guard) => guard.push(report),
            Err(poisoned) => poisoned.into_inner().push(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reporter_filters_by_kind() {
        let reporter = MemoryReporter::new();
        reporter.file_report(Report::new(
            10,
            ReportEvent::DriverSchedule {
                vehicle_id: VehicleId::from("v1"),
                schedule_event: ScheduleEventType::Off,
            },
        ));
        reporter.file_report(Report::new(
            20,
            ReportEvent::CancelRequest {
                request_id: RequestId::from("r1"),
                departure_time: 0,
                cancel_time: 20,
                fleet_id: "public".to_string(),
            },
        ));
        assert_eq!(reporter.reports().len(), 2);
        let cancels = reporter.reports_of_kind("cancel_request");
        assert_eq!(cancels.len(), 1);
        assert_eq!(cancels[0].sim_time, 20);
        reporter.clear();
        assert!(reporter.reports().is_empty());
    }
}
