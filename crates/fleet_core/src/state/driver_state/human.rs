use tracing::{debug, warn};

use crate::dispatcher::ops::{instruct_vehicles_to_dispatch_to_station, nearest_valid_station_distance};
use crate::dispatcher::Instruction;
use crate::environment::Environment;
use crate::error::{Outcome, SimResult, Transition};
use crate::model::{Base, BaseId, EnergyType, Vehicle};
use crate::reporting::{ReportEvent, ScheduleEventType};
use crate::state::VehicleState;
use crate::world::World;

use super::ops::{apply_new_driver_state, charge_at_base, idle_if_at_soc_limit, look_for_requests};
use super::{DriverState, HumanDriverAttributes};

/// How much range an off-shift driver needs before heading home.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HumanUnavailableChargeParameters {
    /// Set only when the vehicle cannot cover the trip home, the trip to a
    /// charger tomorrow (when home has no plug) and the reserve buffer.
    pub remaining_range_target: Option<f64>,
}

impl HumanUnavailableChargeParameters {
    pub fn build(vehicle: &Vehicle, home_base_id: &BaseId, world: &World, env: &Environment) -> SimResult<Self> {
        let Some(home) = world.base(home_base_id) else {
            warn!(vehicle_id = %vehicle.id, %home_base_id, "home base missing");
            return Ok(Self::default());
        };
        let remaining_range = env.mechatronics_for(vehicle)?.range_remaining_km(vehicle);
        let range_home = world.road_network().distance_by_cell_km(vehicle.cell(), home.cell());
        let range_to_charger_tomorrow = match home.station_id {
            Some(_) => 0.0,
            None => nearest_valid_station_distance(world, env, vehicle, home.cell())?.unwrap_or(0.0),
        };
        let required = range_home + range_to_charger_tomorrow + env.config.dispatcher.charging_range_km_threshold;
        Ok(Self {
            remaining_range_target: (required > remaining_range).then_some(required),
        })
    }
}

fn is_servicing(state: &VehicleState) -> bool {
    matches!(
        state,
        VehicleState::OutOfService(_) | VehicleState::ServicingTrip(_) | VehicleState::ServicingPoolingTrip(_)
    )
}

/// On shift: leave home to look for work, chase demand after idling too
/// long and unplug from fast chargers at the ideal limit.
pub(super) fn available_instruction(
    attributes: &HumanDriverAttributes,
    world: &World,
    env: &Environment,
) -> SimResult<Option<Instruction>> {
    let vehicle = world.get_vehicle(&attributes.vehicle_id)?;
    match &vehicle.vehicle_state {
        VehicleState::ReserveBase(_) | VehicleState::ChargingBase(_) => Ok(look_for_requests(vehicle, world)),
        VehicleState::Idle(state) if state.idle_duration > env.config.dispatcher.idle_time_out_seconds => {
            Ok(look_for_requests(vehicle, world))
        }
        VehicleState::ChargingStation(_) => idle_if_at_soc_limit(vehicle, env),
        _ => Ok(None),
    }
}

/// Off shift: get home, charging on the way when the range will not do,
/// then plug in or park.
pub(super) fn unavailable_instruction(
    attributes: &HumanDriverAttributes,
    params: &HumanUnavailableChargeParameters,
    world: &World,
    env: &Environment,
) -> SimResult<Option<Instruction>> {
    let vehicle = world.get_vehicle(&attributes.vehicle_id)?;
    let Some(home) = world.base(&attributes.home_base_id) else {
        warn!(vehicle_id = %vehicle.id, home_base_id = %attributes.home_base_id, "home base missing");
        return Ok(None);
    };
    let state = &vehicle.vehicle_state;
    if is_servicing(state) {
        return Ok(None);
    }
    let mechatronics = env.mechatronics_for(vehicle)?;
    let go_home = || Instruction::DispatchBase {
        vehicle_id: vehicle.id.clone(),
        base_id: home.id.clone(),
    };

    if !world.vehicle_at_base(&vehicle.id, &home.id) {
        return match state {
            VehicleState::DispatchBase(_) => Ok(None),
            VehicleState::DispatchStation(_) | VehicleState::ChargingStation(_) | VehicleState::ChargeQueueing(_) => {
                let still_charging = params
                    .remaining_range_target
                    .is_some_and(|target| mechatronics.range_remaining_km(vehicle) < target);
                Ok((!still_charging).then(go_home))
            }
            _ => go_home_or_charge(vehicle, home, world, env).map(|i| i.or_else(|| Some(go_home()))),
        };
    }

    let below_limit = mechatronics.state_of_charge(vehicle) < env.config.dispatcher.ideal_fastcharge_soc_limit;
    if below_limit && home.station_id.is_some() && !matches!(state, VehicleState::ChargingBase(_)) {
        return charge_at_base(vehicle, home, world, env);
    }
    if matches!(state, VehicleState::Idle(_)) {
        return Ok(Some(Instruction::ReserveBase {
            vehicle_id: vehicle.id.clone(),
            base_id: home.id.clone(),
        }));
    }
    Ok(None)
}

/// A station stop when the vehicle cannot reach home or has no plug there.
fn go_home_or_charge(vehicle: &Vehicle, home: &Base, world: &World, env: &Environment) -> SimResult<Option<Instruction>> {
    let remaining_range = env.mechatronics_for(vehicle)?.range_remaining_km(vehicle);
    if remaining_range <= 0.0 {
        return Ok(None);
    }
    let required_range = world.road_network().distance_by_cell_km(vehicle.cell(), home.cell());
    let cannot_make_it_home = required_range >= remaining_range;
    let no_home_charging = home.station_id.is_none() && vehicle.energy.contains_key(&EnergyType::Electric);
    if !(cannot_make_it_home || no_home_charging) {
        return Ok(None);
    }
    let target_soc = env.config.dispatcher.human_driver_off_shift_charge_target;
    let instructions = instruct_vehicles_to_dispatch_to_station(world, env, &[vehicle], 1, target_soc)?;
    Ok(instructions.into_iter().next())
}

fn on_shift(attributes: &HumanDriverAttributes, world: &World, env: &Environment) -> Option<bool> {
    env.schedules
        .get(&attributes.schedule_id)
        .map(|schedule| schedule(world, &attributes.vehicle_id))
}

pub(super) fn update_available(attributes: &HumanDriverAttributes, world: &World, env: &Environment) -> Transition {
    if on_shift(attributes, world, env).unwrap_or(true) {
        return Ok(Outcome::Updated(world.clone()));
    }
    let vehicle = world.get_vehicle(&attributes.vehicle_id)?;
    let params = HumanUnavailableChargeParameters::build(vehicle, &attributes.home_base_id, world, env)?;
    debug!(vehicle_id = %vehicle.id, range_target = ?params.remaining_range_target, "driver going off shift");
    env.report(
        world,
        ReportEvent::DriverSchedule {
            vehicle_id: vehicle.id.clone(),
            schedule_event: ScheduleEventType::Off,
        },
    );
    apply_new_driver_state(
        world,
        &vehicle.id,
        DriverState::HumanUnavailable(attributes.clone(), params),
    )
}

pub(super) fn update_unavailable(attributes: &HumanDriverAttributes, world: &World, env: &Environment) -> Transition {
    if !on_shift(attributes, world, env).unwrap_or(false) {
        return Ok(Outcome::Updated(world.clone()));
    }
    let vehicle_id = &attributes.vehicle_id;
    debug!(%vehicle_id, "driver going on shift");
    env.report(
        world,
        ReportEvent::DriverSchedule {
            vehicle_id: vehicle_id.clone(),
            schedule_event: ScheduleEventType::On,
        },
    );
    apply_new_driver_state(world, vehicle_id, DriverState::HumanAvailable(attributes.clone()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::environment::time_range_schedule;
    use crate::mechatronics::Mechatronics;
    use crate::model::{ScheduleId, StationId, VehicleId};
    use crate::reporting::MemoryReporter;
    use crate::state::vehicle_state::{Idle, ReserveBase};
    use crate::test_helpers::{
        cell_at_distance_km, mock_base, mock_bev, mock_env, mock_station, mock_vehicle, mock_world, mock_world_at,
        test_cell,
    };

    fn attributes() -> HumanDriverAttributes {
        HumanDriverAttributes {
            vehicle_id: VehicleId::from("v1"),
            schedule_id: ScheduleId::from("day"),
            home_base_id: BaseId::from("home"),
            allows_pooling: false,
        }
    }

    fn off_shift(params: HumanUnavailableChargeParameters) -> DriverState {
        DriverState::HumanUnavailable(attributes(), params)
    }

    #[test]
    fn goes_off_shift_when_the_schedule_ends() {
        let reporter = Arc::new(MemoryReporter::new());
        let env = mock_env()
            .with_schedule(ScheduleId::from("day"), time_range_schedule(8 * 3600, 17 * 3600))
            .with_reporter(reporter.clone());
        let vehicle = mock_vehicle("v1", test_cell()).with_driver_state(DriverState::human(attributes()));
        let evening = mock_world_at(18 * 3600)
            .add_base(mock_base("home", test_cell(), 1))
            .and_then(|w| w.add_vehicle(vehicle))
            .expect("setup");

        let updated = update_available(&attributes(), &evening, &env)
            .expect("update")
            .updated()
            .expect("updated");
        let driver = &updated.get_vehicle(&VehicleId::from("v1")).expect("vehicle").driver_state;
        assert!(!driver.available());
        assert_eq!(reporter.reports_of_kind("driver_schedule").len(), 1);

        let still_evening = update_unavailable(&attributes(), &updated, &env)
            .expect("update")
            .updated()
            .expect("updated");
        let driver = &still_evening.get_vehicle(&VehicleId::from("v1")).expect("vehicle").driver_state;
        assert!(!driver.available());

        let off_duty = updated.get_vehicle(&VehicleId::from("v1")).expect("vehicle").clone();
        let morning = mock_world_at(9 * 3600)
            .add_base(mock_base("home", test_cell(), 1))
            .and_then(|w| w.add_vehicle(off_duty))
            .expect("setup");
        let back = update_unavailable(&attributes(), &morning, &env)
            .expect("update")
            .updated()
            .expect("updated");
        assert!(back.get_vehicle(&VehicleId::from("v1")).expect("vehicle").driver_state.available());
        assert_eq!(reporter.reports_of_kind("driver_schedule").len(), 2);
    }

    #[test]
    fn range_target_only_when_short() {
        let env = mock_env();
        let bev = mock_bev();
        let home_cell = cell_at_distance_km(test_cell(), 5.0);
        let world = mock_world()
            .add_station(mock_station("s1", home_cell))
            .and_then(|w| w.add_base(mock_base("home", home_cell, 1).with_station(StationId::from("s1"))))
            .expect("setup");

        let charged = mock_vehicle("v1", test_cell());
        let params =
            HumanUnavailableChargeParameters::build(&charged, &BaseId::from("home"), &world, &env).expect("params");
        assert_eq!(params.remaining_range_target, None);

        let low = charged.with_energy(bev.initial_energy(0.05));
        assert!(bev.range_remaining_km(&low) < 25.0);
        let params = HumanUnavailableChargeParameters::build(&low, &BaseId::from("home"), &world, &env).expect("params");
        let target = params.remaining_range_target.expect("a range target");
        assert!(target > env.config.dispatcher.charging_range_km_threshold);
    }

    #[test]
    fn off_shift_drivers_head_home() {
        let env = mock_env();
        let home_cell = cell_at_distance_km(test_cell(), 3.0);
        let vehicle = mock_vehicle("v1", test_cell()).with_driver_state(off_shift(Default::default()));
        let world = mock_world()
            .add_station(mock_station("s1", home_cell))
            .and_then(|w| w.add_base(mock_base("home", home_cell, 1).with_station(StationId::from("s1"))))
            .and_then(|w| w.add_vehicle(vehicle))
            .expect("setup");
        let instruction = unavailable_instruction(&attributes(), &Default::default(), &world, &env).expect("instruction");
        assert_eq!(
            instruction,
            Some(Instruction::DispatchBase {
                vehicle_id: VehicleId::from("v1"),
                base_id: BaseId::from("home"),
            })
        );
    }

    #[test]
    fn no_home_plug_means_charging_first() {
        let env = mock_env();
        let home_cell = cell_at_distance_km(test_cell(), 3.0);
        let vehicle = mock_vehicle("v1", test_cell()).with_driver_state(off_shift(Default::default()));
        let world = mock_world()
            .add_station(mock_station("s1", cell_at_distance_km(test_cell(), 1.0)))
            .and_then(|w| w.add_base(mock_base("home", home_cell, 1)))
            .and_then(|w| w.add_vehicle(vehicle))
            .expect("setup");
        let instruction = unavailable_instruction(&attributes(), &Default::default(), &world, &env).expect("instruction");
        assert!(matches!(instruction, Some(Instruction::DispatchStation { .. })));
    }

    #[test]
    fn at_home_drivers_plug_in_then_park() {
        let env = mock_env();
        let bev = mock_bev();
        let idle = VehicleState::Idle(Idle::new(VehicleId::from("v1")));
        let low = mock_vehicle("v1", test_cell())
            .with_energy(bev.initial_energy(0.5))
            .with_vehicle_state(idle.clone())
            .with_driver_state(off_shift(Default::default()));
        let world = mock_world()
            .add_station(mock_station("s1", test_cell()))
            .and_then(|w| w.add_base(mock_base("home", test_cell(), 1).with_station(StationId::from("s1"))))
            .and_then(|w| w.add_vehicle(low.clone()))
            .expect("setup");
        let instruction = unavailable_instruction(&attributes(), &Default::default(), &world, &env).expect("instruction");
        assert!(matches!(instruction, Some(Instruction::ChargeBase { .. })));

        let charged = world
            .modify_vehicle(low.with_energy(bev.initial_energy(0.9)))
            .expect("vehicle");
        let instruction = unavailable_instruction(&attributes(), &Default::default(), &charged, &env).expect("instruction");
        assert!(matches!(instruction, Some(Instruction::ReserveBase { .. })));

        let parked = VehicleState::ReserveBase(ReserveBase::new(VehicleId::from("v1"), BaseId::from("home")));
        let reserved = world
            .modify_vehicle(low.with_energy(bev.initial_energy(0.9)).with_vehicle_state(parked))
            .expect("vehicle");
        let instruction = unavailable_instruction(&attributes(), &Default::default(), &reserved, &env).expect("instruction");
        assert_eq!(instruction, None);
    }

    #[test]
    fn on_shift_drivers_leave_home_for_demand() {
        let env = mock_env();
        let parked = VehicleState::ReserveBase(ReserveBase::new(VehicleId::from("v1"), BaseId::from("home")));
        let vehicle = mock_vehicle("v1", test_cell())
            .with_vehicle_state(parked)
            .with_driver_state(DriverState::human(attributes()));
        let far = cell_at_distance_km(test_cell(), 10.0);
        let world = mock_world()
            .add_base(mock_base("home", test_cell(), 1))
            .and_then(|w| w.add_vehicle(vehicle))
            .and_then(|w| w.add_request(crate::test_helpers::mock_request("r1", far, test_cell(), 0)))
            .expect("setup");
        let instruction = available_instruction(&attributes(), &world, &env).expect("instruction");
        assert!(matches!(instruction, Some(Instruction::Reposition { .. })));
    }
}
