use tracing::error;

use crate::environment::Environment;
use crate::error::SimResult;
use crate::model::RequestId;
use crate::reporting::ReportEvent;
use crate::world::World;

use super::SimulationUpdate;

/// Removes every request whose cancel time has been reached, dispatched or not.
#[derive(Debug, Clone, Default)]
pub struct CancelRequests;

impl CancelRequests {
    pub fn new() -> Self {
        Self
    }
}

impl SimulationUpdate for CancelRequests {
    fn name(&self) -> &str {
        "cancel_requests"
    }

    fn update(&mut self, world: &World, env: &Environment) -> SimResult<World> {
        let now = world.sim_time();
        let expired: Vec<RequestId> = world
            .requests()
            .values()
            .filter(|r| now >= r.cancel_time)
            .map(|r| r.id.clone())
            .collect();

        let mut next = world.clone();
        for request_id in expired {
            let Some(request) = next.request(&request_id).cloned() else {
                continue;
            };
            match next.remove_request(&request_id) {
                Ok(updated) => {
                    env.report(
                        &updated,
                        ReportEvent::CancelRequest {
                            request_id,
                            departure_time: request.departure_time,
                            cancel_time: now,
                            fleet_id: request.membership.to_string(),
                        },
                    );
                    next = updated;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => error!(error = %err, %request_id, "failed to cancel request"),
            }
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reporting::MemoryReporter;
    use crate::test_helpers::{cell_at_distance_km, mock_env, mock_request, mock_world_at, test_cell};

    #[test]
    fn requests_are_removed_at_cancel_time() {
        let reporter = Arc::new(MemoryReporter::new());
        let env = mock_env().with_reporter(reporter.clone());
        let destination = cell_at_distance_km(test_cell(), 2.0);
        let world = mock_world_at(340)
            .add_request(mock_request("due", test_cell(), destination, 100).with_cancel_time(400))
            .and_then(|w| w.add_request(mock_request("waiting", test_cell(), destination, 100).with_cancel_time(401)))
            .expect("setup");

        let early = CancelRequests::new().update(&world, &env).expect("update at 340");
        assert_eq!(early.requests().len(), 2);
        assert!(reporter.reports_of_kind("cancel_request").is_empty());

        let world = early.tick();
        assert_eq!(world.sim_time(), 400);
        let next = CancelRequests::new().update(&world, &env).expect("update at 400");
        assert!(next.request(&RequestId::from("due")).is_none());
        assert!(next.request(&RequestId::from("waiting")).is_some());

        let cancelled = reporter.reports_of_kind("cancel_request");
        assert_eq!(cancelled.len(), 1);
        assert_eq!(
            cancelled[0].event,
            ReportEvent::CancelRequest {
                request_id: RequestId::from("due"),
                departure_time: 100,
                cancel_time: 400,
                fleet_id: "public".to_string(),
            }
        );
    }
}
