use h3o::CellIndex;

use crate::error::SimResult;
use crate::model::EntityPosition;

use super::link::{traverse_up_to, LinkTraversal};

/// Leftover time below this is treated as exhausted.
const TIME_EPSILON_SECONDS: f64 = 1e-6;

/// An ordered sequence of link traversals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    links: Vec<LinkTraversal>,
}

impl Route {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(links: Vec<LinkTraversal>) -> Self {
        Self { links }
    }

    pub fn links(&self) -> &[LinkTraversal] {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn first(&self) -> Option<&LinkTraversal> {
        self.links.first()
    }

    pub fn last(&self) -> Option<&LinkTraversal> {
        self.links.last()
    }

    pub fn distance_km(&self) -> f64 {
        self.links.iter().map(|l| l.distance_km).sum()
    }

    pub fn travel_time_seconds(&self) -> u64 {
        self.links
            .iter()
            .map(|l| l.travel_time_seconds())
            .sum::<f64>() as u64
    }

    /// True when the route starts at `source` and, if given, ends at `destination`.
    ///
    /// An empty route corresponds only when there is nowhere to go.
    pub fn corresponds_with(&self, source: CellIndex, destination: Option<CellIndex>) -> bool {
        match (self.links.first(), self.links.last()) {
            (Some(first), Some(last)) => {
                first.start == source && destination.map_or(true, |dst| last.end == dst)
            }
            _ => destination.map_or(true, |dst| dst == source),
        }
    }

    /// Position at the end of the route, if any.
    pub fn end_position(&self) -> Option<EntityPosition> {
        self.links.last().map(LinkTraversal::end_position)
    }
}

impl FromIterator<LinkTraversal> for Route {
    fn from_iter<T: IntoIterator<Item = LinkTraversal>>(iter: T) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTraversal {
    pub remaining_time_seconds: f64,
    pub traversal_distance_km: f64,
    pub experienced_route: Route,
    pub remaining_route: Route,
}

impl RouteTraversal {
    pub fn no_traversal(remaining_time_seconds: f64) -> Self {
        Self {
            remaining_time_seconds,
            ..Self::default()
        }
    }
}

/// Advances along `route` for `duration_seconds`.
pub fn traverse(route: &Route, duration_seconds: u64) -> SimResult<RouteTraversal> {
    let available = duration_seconds as f64;
    let (Some(first), Some(last)) = (route.first(), route.last()) else {
        return Ok(RouteTraversal::no_traversal(available));
    };
    if first.start == last.end {
        return Ok(RouteTraversal::no_traversal(available));
    }

    let mut result = RouteTraversal::no_traversal(available);
    let mut experienced = Vec::new();
    let mut remaining = Vec::new();
    for link in route.links() {
        if result.remaining_time_seconds <= TIME_EPSILON_SECONDS {
            remaining.push(link.clone());
            continue;
        }
        let step = traverse_up_to(link, result.remaining_time_seconds)?;
        if let Some(traversed) = step.traversed {
            result.traversal_distance_km += traversed.distance_km;
            experienced.push(traversed);
        }
        if let Some(rest) = step.remaining {
            remaining.push(rest);
        }
        result.remaining_time_seconds = step.remaining_time_seconds;
    }
    result.experienced_route = Route::new(experienced);
    result.remaining_route = Route::new(remaining);
    Ok(result)
}
