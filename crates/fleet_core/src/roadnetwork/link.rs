use h3o::{CellIndex, LatLng};

use crate::error::{SimResult, SimulationError};
use crate::model::{EntityPosition, LinkId};
use crate::spatial::distance_km_between_cells;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// A single link of a route, possibly only part of a road network link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTraversal {
    pub link_id: LinkId,
    pub start: CellIndex,
    pub end: CellIndex,
    pub distance_km: f64,
    pub speed_kmph: f64,
}

impl LinkTraversal {
    /// Builds a link; without an explicit distance the cell-center distance is used.
    pub fn new(
        link_id: LinkId,
        start: CellIndex,
        end: CellIndex,
        speed_kmph: f64,
        distance_km: Option<f64>,
    ) -> Self {
        Self {
            distance_km: distance_km.unwrap_or_else(|| distance_km_between_cells(start, end)),
            link_id,
            start,
            end,
            speed_kmph,
        }
    }

    pub fn travel_time_seconds(&self) -> f64 {
        if self.distance_km <= 0.0 {
            return 0.0;
        }
        self.distance_km / self.speed_kmph * SECONDS_PER_HOUR
    }

    pub fn end_position(&self) -> EntityPosition {
        EntityPosition::new(self.link_id.clone(), self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkTraversalResult {
    pub traversed: Option<LinkTraversal>,
    pub remaining: Option<LinkTraversal>,
    pub remaining_time_seconds: f64,
}

/// Interpolated cell `ratio` of the way along a link, at the link's resolution.
fn point_along_link(link: &LinkTraversal, ratio: f64) -> SimResult<CellIndex> {
    let a = LatLng::from(link.start);
    let b = LatLng::from(link.end);
    let lat = a.lat() + (b.lat() - a.lat()) * ratio;
    let lng = a.lng() + (b.lng() - a.lng()) * ratio;
    let point = LatLng::new(lat, lng)
        .map_err(|e| SimulationError::Routing(format!("interpolating {}: {e}", link.link_id)))?;
    Ok(point.to_cell(link.start.resolution()))
}

/// Moves along `link` for at most `available_time_seconds`.
///
/// A degenerate link (start == end) is skipped entirely. A link that does not
/// fit in the available time is split at the interpolated point.
pub fn traverse_up_to(
    link: &LinkTraversal,
    available_time_seconds: f64,
) -> SimResult<LinkTraversalResult> {
    if link.start == link.end {
        return Ok(LinkTraversalResult {
            traversed: None,
            remaining: None,
            remaining_time_seconds: available_time_seconds,
        });
    }
    if link.speed_kmph <= 0.0 {
        return Err(SimulationError::Routing(format!(
            "link {} has non-positive speed {}",
            link.link_id, link.speed_kmph
        )));
    }

    let travel_time = link.travel_time_seconds();
    if travel_time <= available_time_seconds {
        return Ok(LinkTraversalResult {
            traversed: Some(link.clone()),
            remaining: None,
            remaining_time_seconds: available_time_seconds - travel_time,
        });
    }

    let experienced_km = link.speed_kmph * available_time_seconds / SECONDS_PER_HOUR;
    let ratio = experienced_km / link.distance_km;
    let mid = point_along_link(link, ratio)?;
    Ok(LinkTraversalResult {
        traversed: Some(LinkTraversal {
            end: mid,
            distance_km: experienced_km,
            ..link.clone()
        }),
        remaining: Some(LinkTraversal {
            start: mid,
            distance_km: link.distance_km - experienced_km,
            ..link.clone()
        }),
        remaining_time_seconds: 0.0,
    })
}
