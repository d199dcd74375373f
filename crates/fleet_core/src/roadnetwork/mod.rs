//! Road network abstraction: routes, link traversal and the routing trait.
//!
//! The kernel never computes paths itself; it asks a [`RoadNetwork`] for a
//! [`Route`] and advances vehicles along it with [`traverse`].

mod haversine;
mod link;
mod route;

use std::fmt;

use h3o::{CellIndex, Resolution};

use crate::model::{EntityPosition, LinkId};

pub use haversine::{Geofence, HaversineRoadNetwork, DEFAULT_HAVERSINE_SPEED_KMPH};
pub use link::{traverse_up_to, LinkTraversal, LinkTraversalResult};
pub use route::{traverse, Route, RouteTraversal};

/// Routing backend. Implementations must be `Send + Sync` so a world snapshot
/// can be shared between readers.
pub trait RoadNetwork: Send + Sync + fmt::Debug {
    /// Route between two positions; empty when they share a cell.
    fn route(&self, origin: &EntityPosition, destination: &EntityPosition) -> Route;

    /// Travel distance between two cells.
    fn distance_by_cell_km(&self, origin: CellIndex, destination: CellIndex) -> f64;

    fn link_from_link_id(&self, link_id: &LinkId) -> Option<LinkTraversal>;

    /// Snaps a cell onto the network.
    fn position_from_cell(&self, cell: CellIndex) -> EntityPosition;

    fn cell_within_geofence(&self, _cell: CellIndex) -> bool {
        true
    }

    fn location_resolution(&self) -> Resolution;
}
