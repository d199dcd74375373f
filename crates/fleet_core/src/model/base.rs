use h3o::CellIndex;

use crate::error::{SimResult, SimulationError};

use super::ids::{BaseId, StationId};
use super::membership::Membership;
use super::position::EntityPosition;

/// A depot with parking stalls and an optional co-located station.
#[derive(Debug, Clone, PartialEq)]
pub struct Base {
    pub id: BaseId,
    pub position: EntityPosition,
    pub membership: Membership,
    pub total_stalls: u32,
    pub available_stalls: u32,
    pub station_id: Option<StationId>,
}

impl Base {
    pub fn new(id: BaseId, position: EntityPosition, total_stalls: u32) -> Self {
        Self {
            id,
            position,
            membership: Membership::public(),
            total_stalls,
            available_stalls: total_stalls,
            station_id: None,
        }
    }

    pub fn with_station(&self, station_id: StationId) -> Self {
        Self {
            station_id: Some(station_id),
            ..self.clone()
        }
    }

    pub fn with_membership(&self, membership: Membership) -> Self {
        Self {
            membership,
            ..self.clone()
        }
    }

    pub fn cell(&self) -> CellIndex {
        self.position.cell
    }

    pub fn stalls_in_use(&self) -> u32 {
        self.total_stalls - self.available_stalls
    }

    pub fn has_available_stall(&self, membership: &Membership) -> bool {
        self.available_stalls > 0 && self.membership.grants_access_to(membership)
    }

    /// `None` when every stall is taken.
    pub fn checkout_stall(&self) -> Option<Self> {
        (self.available_stalls > 0).then(|| Self {
            available_stalls: self.available_stalls - 1,
            ..self.clone()
        })
    }

    pub fn return_stall(&self) -> SimResult<Self> {
        if self.available_stalls >= self.total_stalls {
            return Err(SimulationError::ResourceOverflow {
                owner: format!("base {}", self.id),
                message: format!(
                    "returning a stall would exceed total of {}",
                    self.total_stalls
                ),
            });
        }
        Ok(Self {
            available_stalls: self.available_stalls + 1,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MembershipId;
    use crate::test_helpers::{mock_base, test_cell};

    #[test]
    fn stalls_checkout_and_return() {
        let base = mock_base("b1", test_cell(), 1);
        let taken = base.checkout_stall().expect("stall free");
        assert_eq!(taken.available_stalls, 0);
        assert!(taken.checkout_stall().is_none());
        let returned = taken.return_stall().expect("return");
        assert_eq!(returned.available_stalls, 1);
        assert!(returned.return_stall().is_err());
    }

    #[test]
    fn stall_availability_respects_membership() {
        let fleet = Membership::single(MembershipId::from("fleet_a")).expect("membership");
        let other = Membership::single(MembershipId::from("fleet_b")).expect("membership");
        let base = mock_base("b1", test_cell(), 2).with_membership(fleet.clone());
        assert!(base.has_available_stall(&fleet));
        assert!(!base.has_available_stall(&other));
        assert!(!base.has_available_stall(&Membership::public()));
        let public_base = mock_base("b2", test_cell(), 1);
        assert!(public_base.has_available_stall(&other));
    }
}
