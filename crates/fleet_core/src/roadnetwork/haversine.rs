use std::collections::HashSet;

use h3o::{CellIndex, Resolution};

use crate::model::{EntityPosition, LinkId};
use crate::spatial::distance_km_between_cells;

use super::{LinkTraversal, RoadNetwork, Route};

pub const DEFAULT_HAVERSINE_SPEED_KMPH: f64 = 40.0;

/// Serviceable area as a set of (usually coarse) cells.
#[derive(Debug, Clone)]
pub struct Geofence {
    resolution: Resolution,
    cells: HashSet<CellIndex>,
}

impl Geofence {
    /// All cells must share one resolution; it is taken from the first cell.
    pub fn new<I>(cells: I) -> Option<Self>
    where
        I: IntoIterator<Item = CellIndex>,
    {
        let cells: HashSet<CellIndex> = cells.into_iter().collect();
        let resolution = cells.iter().next()?.resolution();
        cells
            .iter()
            .all(|c| c.resolution() == resolution)
            .then_some(Self { resolution, cells })
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        cell.parent(self.resolution)
            .is_some_and(|parent| self.cells.contains(&parent))
    }
}

/// Straight-line road network at constant speed.
///
/// Every route is a single link whose id encodes both ends as `"{start}-{end}"`.
#[derive(Debug, Clone)]
pub struct HaversineRoadNetwork {
    location_resolution: Resolution,
    speed_kmph: f64,
    geofence: Option<Geofence>,
}

impl HaversineRoadNetwork {
    pub fn new(location_resolution: Resolution) -> Self {
        Self {
            location_resolution,
            speed_kmph: DEFAULT_HAVERSINE_SPEED_KMPH,
            geofence: None,
        }
    }

    pub fn with_speed_kmph(mut self, speed_kmph: f64) -> Self {
        self.speed_kmph = speed_kmph;
        self
    }

    pub fn with_geofence(mut self, geofence: Geofence) -> Self {
        self.geofence = Some(geofence);
        self
    }

    fn link_id(start: CellIndex, end: CellIndex) -> LinkId {
        LinkId::new(format!("{start}-{end}"))
    }
}

impl RoadNetwork for HaversineRoadNetwork {
    fn route(&self, origin: &EntityPosition, destination: &EntityPosition) -> Route {
        if origin.cell == destination.cell {
            return Route::empty();
        }
        let link = LinkTraversal::new(
            Self::link_id(origin.cell, destination.cell),
            origin.cell,
            destination.cell,
            self.speed_kmph,
            None,
        );
        Route::new(vec![link])
    }

    fn distance_by_cell_km(&self, origin: CellIndex, destination: CellIndex) -> f64 {
        distance_km_between_cells(origin, destination)
    }

    fn link_from_link_id(&self, link_id: &LinkId) -> Option<LinkTraversal> {
        let (start, end) = link_id.as_str().split_once('-')?;
        let start: CellIndex = start.parse().ok()?;
        let end: CellIndex = end.parse().ok()?;
        Some(LinkTraversal::new(
            link_id.clone(),
            start,
            end,
            self.speed_kmph,
            None,
        ))
    }

    fn position_from_cell(&self, cell: CellIndex) -> EntityPosition {
        EntityPosition::new(Self::link_id(cell, cell), cell)
    }

    fn cell_within_geofence(&self, cell: CellIndex) -> bool {
        self.geofence.as_ref().map_or(true, |g| g.contains(cell))
    }

    fn location_resolution(&self) -> Resolution {
        self.location_resolution
    }
}
