//! Entities held by the world: vehicles, requests, stations and bases.

pub mod base;
pub mod energy;
pub mod ids;
pub mod membership;
pub mod position;
pub mod request;
pub mod station;
pub mod vehicle;

pub use base::Base;
pub use energy::{Charger, EnergyType};
pub use ids::{
    BaseId, ChargerId, LinkId, MechatronicsId, MembershipId, RequestId, ScheduleId, StationId,
    VehicleId,
};
pub use membership::Membership;
pub use position::EntityPosition;
pub use request::{Passenger, Request, RequestRateStructure};
pub use station::{ChargerState, Station};
pub use vehicle::Vehicle;
