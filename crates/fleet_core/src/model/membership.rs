use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::{SimResult, SimulationError};

use super::ids::MembershipId;

/// Reserved tag meaning "no restriction". Never stored; an empty set is public.
pub const PUBLIC_MEMBERSHIP_ID: &str = "public";

/// Set of fleet tags controlling which vehicles may use which requests, stations and bases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Membership {
    memberships: BTreeSet<MembershipId>,
}

impl Membership {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn single(id: MembershipId) -> SimResult<Self> {
        Self::from_ids([id])
    }

    pub fn from_ids<I>(ids: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = MembershipId>,
    {
        ids.into_iter()
            .try_fold(Self::public(), |membership, id| membership.add(id))
    }

    pub fn add(&self, id: MembershipId) -> SimResult<Self> {
        if id.as_str() == PUBLIC_MEMBERSHIP_ID {
            return Err(SimulationError::ReservedMembership(id.to_string()));
        }
        let mut memberships = self.memberships.clone();
        memberships.insert(id);
        Ok(Self { memberships })
    }

    pub fn is_public(&self) -> bool {
        self.memberships.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MembershipId> {
        self.memberships.iter()
    }

    pub fn in_common(&self, other: &Membership) -> BTreeSet<MembershipId> {
        self.memberships
            .intersection(&other.memberships)
            .cloned()
            .collect()
    }

    /// A public owner admits anyone; otherwise `other` must share at least one tag.
    pub fn grants_access_to(&self, other: &Membership) -> bool {
        self.is_public()
            || self
                .memberships
                .iter()
                .any(|id| other.memberships.contains(id))
    }

    pub fn grants_access_to_id(&self, id: &MembershipId) -> bool {
        self.is_public() || self.memberships.contains(id)
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_public() {
            return f.write_str(PUBLIC_MEMBERSHIP_ID);
        }
        let joined: Vec<&str> = self.memberships.iter().map(|id| id.as_str()).collect();
        f.write_str(&joined.join(","))
    }
}
