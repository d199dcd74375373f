use std::collections::VecDeque;

use tracing::{error, warn};

use crate::clock::SimTime;
use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::{Request, RequestRateStructure};
use crate::reporting::ReportEvent;
use crate::world::World;

use super::SimulationUpdate;

/// In-memory queue of future requests, released once the clock reaches
/// their departure time.
///
/// A released request is priced with the feed's rate structure before it is
/// added. Requests that are already past their cancel time, or whose
/// membership does not fit the configured fleets, are dropped with a warning.
#[derive(Debug, Clone, Default)]
pub struct RequestFeed {
    pending: VecDeque<Request>,
    rates: RequestRateStructure,
}

impl RequestFeed {
    pub fn new(requests: Vec<Request>, rates: RequestRateStructure) -> Self {
        let mut requests = requests;
        requests.sort_by(|a, b| {
            a.departure_time
                .cmp(&b.departure_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Self {
            pending: requests.into(),
            rates,
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    fn take_due(&mut self, now: SimTime) -> Vec<Request> {
        let mut due = Vec::new();
        while self.pending.front().map_or(false, |r| r.departure_time <= now) {
            if let Some(request) = self.pending.pop_front() {
                due.push(request);
            }
        }
        due
    }

    fn admissible(request: &Request, now: SimTime, env: &Environment) -> bool {
        if request.cancel_time <= now {
            warn!(
                request_id = %request.id,
                cancel_time = request.cancel_time,
                now,
                "request would already be cancelled; not added"
            );
            return false;
        }
        let has_fleets = !env.fleet_ids.is_empty();
        if has_fleets && request.membership.is_public() {
            warn!(request_id = %request.id, "request has no membership but fleets are configured; not added");
            return false;
        }
        if !has_fleets && !request.membership.is_public() {
            warn!(request_id = %request.id, membership = %request.membership, "request has a membership but no fleets are configured; not added");
            return false;
        }
        true
    }
}

impl SimulationUpdate for RequestFeed {
    fn name(&self) -> &str {
        "request_feed"
    }

    fn update(&mut self, world: &World, env: &Environment) -> SimResult<World> {
        let now = world.sim_time();
        let mut next = world.clone();
        for request in self.take_due(now) {
            if !Self::admissible(&request, now, env) {
                continue;
            }
            let priced = request.assign_value(&self.rates, next.road_network());
            let event = ReportEvent::AddRequest {
                request_id: priced.id.clone(),
                departure_time: priced.departure_time,
                cancel_time: priced.cancel_time,
                fleet_id: priced.membership.to_string(),
            };
            match next.add_request(priced) {
                Ok(updated) => {
                    env.report(&updated, event);
                    next = updated;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => error!(error = %err, "failed to add request"),
            }
        }
        Ok(next)
    }
}
