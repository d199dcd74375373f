//! Bipartite assignment and station ranking.
//!
//! [`find_assignment`] solves a minimum-cost matching with Kuhn-Munkres
//! (pathfinding, maximum-weight on scaled and negated costs). The station
//! rankings estimate which charger at a station a vehicle should use and at
//! what cost; unusable stations get [`MAX_DIST`] instead of being dropped.

use std::collections::VecDeque;

use h3o::CellIndex;
use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};

use crate::environment::Environment;
use crate::error::SimResult;
use crate::mechatronics::time_to_full;
use crate::model::{Base, ChargerId, Request, Station, Vehicle};
use crate::spatial::distance_km_between_cells;
use crate::state::VehicleState;
use crate::world::World;

/// Cost of a station the vehicle cannot use.
pub const MAX_DIST: f64 = 999_999_999.0;

/// Scale factor turning f64 costs into i64 weights.
const SCALE: f64 = 1_000.0;

/// Anything placed on the grid with an id that can be matched.
pub trait Assignable {
    type Id: Clone;

    fn assignment_id(&self) -> &Self::Id;

    fn assignment_cell(&self) -> CellIndex;
}

macro_rules! assignable {
    ($entity:ty, $id:ty) => {
        impl Assignable for $entity {
            type Id = $id;

            fn assignment_id(&self) -> &Self::Id {
                &self.id
            }

            fn assignment_cell(&self) -> CellIndex {
                self.cell()
            }
        }
    };
}

assignable!(Vehicle, crate::model::VehicleId);
assignable!(Request, crate::model::RequestId);
assignable!(Station, crate::model::StationId);
assignable!(Base, crate::model::BaseId);

/// Matched pairs with the sum of their costs.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentSolution<A, T> {
    pub pairs: Vec<(A, T)>,
    pub cost: f64,
}

impl<A, T> Default for AssignmentSolution<A, T> {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            cost: 0.0,
        }
    }
}

struct I64Weights(Vec<Vec<i64>>);

impl Weights<i64> for I64Weights {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |r| r.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        I64Weights(
            self.0
                .iter()
                .map(|r| r.iter().map(|&x| x.saturating_neg()).collect())
                .collect(),
        )
    }
}

fn cost_to_weight(cost: f64) -> i64 {
    let w = -(cost * SCALE).round();
    if w <= i64::MIN as f64 / 4.0 {
        i64::MIN / 4
    } else {
        w as i64
    }
}

/// Minimum-cost matching between `assignees` and `targets`.
///
/// Infinite (or NaN) costs mark infeasible pairs. They are replaced by the
/// largest finite cost plus one so the solver stays well defined, and any
/// infeasible pair the solver still picks is left out of the solution. When no
/// pair is finite the solution is empty.
pub fn find_assignment<A, T, F>(assignees: &[&A], targets: &[&T], cost_fn: F) -> AssignmentSolution<A::Id, T::Id>
where
    A: Assignable,
    T: Assignable,
    F: Fn(&A, &T) -> f64,
{
    if assignees.is_empty() || targets.is_empty() {
        return AssignmentSolution::default();
    }
    let costs: Vec<Vec<f64>> = assignees
        .iter()
        .map(|a| targets.iter().map(|t| cost_fn(*a, *t)).collect())
        .collect();
    let Some(upper_bound) = costs
        .iter()
        .flatten()
        .copied()
        .filter(|c| c.is_finite())
        .max_by(f64::total_cmp)
    else {
        return AssignmentSolution::default();
    };
    let substitute = upper_bound + 1.0;
    let weight_at = |i: usize, j: usize| {
        let cost = costs[i][j];
        cost_to_weight(if cost.is_finite() { cost } else { substitute })
    };

    // kuhn_munkres needs rows <= columns
    let transposed = assignees.len() > targets.len();
    let matrix: Vec<Vec<i64>> = if transposed {
        (0..targets.len())
            .map(|j| (0..assignees.len()).map(|i| weight_at(i, j)).collect())
            .collect()
    } else {
        (0..assignees.len())
            .map(|i| (0..targets.len()).map(|j| weight_at(i, j)).collect())
            .collect()
    };
    let (_, assignment) = kuhn_munkres(&I64Weights(matrix));

    let mut matched: Vec<(usize, usize)> = assignment
        .into_iter()
        .enumerate()
        .map(|(row, col)| if transposed { (col, row) } else { (row, col) })
        .filter(|&(i, j)| costs[i][j].is_finite())
        .collect();
    matched.sort_unstable();

    matched
        .into_iter()
        .fold(AssignmentSolution::default(), |mut solution, (i, j)| {
            solution.pairs.push((
                assignees[i].assignment_id().clone(),
                targets[j].assignment_id().clone(),
            ));
            solution.cost += costs[i][j];
            solution
        })
}

/// Number of grid steps between two entities; infinite when h3 cannot tell.
pub fn h3_distance_cost<A: Assignable, B: Assignable>(a: &A, b: &B) -> f64 {
    a.assignment_cell()
        .grid_distance(b.assignment_cell())
        .map_or(f64::INFINITY, f64::from)
}

pub fn great_circle_distance_cost<A: Assignable, B: Assignable>(a: &A, b: &B) -> f64 {
    distance_km_between_cells(a.assignment_cell(), b.assignment_cell())
}

/// Best charger at a station for one vehicle and the rank it earned. Lower is better.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRanking {
    pub charger_id: Option<ChargerId>,
    pub cost: f64,
}

impl StationRanking {
    pub fn unusable() -> Self {
        Self {
            charger_id: None,
            cost: MAX_DIST,
        }
    }
}

/// Grid distance stretched by the queue length of each on-shift charger.
pub fn nearest_shortest_queue_ranking(
    vehicle: &Vehicle,
    station: &Station,
    env: &Environment,
) -> SimResult<StationRanking> {
    let mechatronics = env.mechatronics_for(vehicle)?;
    let distance = h3_distance_cost(vehicle, station);
    if !distance.is_finite() {
        return Ok(StationRanking::unusable());
    }
    let ranking = station
        .on_shift_access_chargers()
        .filter_map(|charger_id| station.charger_state(charger_id))
        .filter(|state| state.total_chargers > 0 && mechatronics.valid_charger(&state.charger))
        .map(|state| {
            let queue_factor = f64::from(state.enqueued_vehicles) / f64::from(state.total_chargers);
            StationRanking {
                charger_id: Some(state.charger.id.clone()),
                cost: distance + distance * queue_factor,
            }
        })
        .fold(StationRanking::unusable(), |best, candidate| {
            if candidate.cost < best.cost {
                candidate
            } else {
                best
            }
        });
    Ok(ranking)
}

/// Time until a slot on a charger frees up for a newcomer.
///
/// `charging` holds the remaining charge times of vehicles plugged in,
/// `enqueued` those of vehicles waiting, in queue order. Queued vehicles take
/// freed slots first.
fn greedy_wait_seconds(mut charging: Vec<u64>, mut enqueued: VecDeque<u64>, total_chargers: usize) -> u64 {
    let mut waited = 0;
    loop {
        let free = total_chargers.saturating_sub(charging.len());
        if enqueued.len() < free {
            return waited;
        }
        charging.extend(enqueued.drain(..free));
        charging.sort_unstable();
        let Some(&next_release) = charging.first() else {
            return waited;
        };
        waited += next_release;
        charging = charging
            .into_iter()
            .map(|t| t - next_release)
            .filter(|t| *t > 0)
            .collect();
    }
}

/// Drive time, plus the wait for a free charger, plus the vehicle's own
/// charge time to `target_soc`, minimised over the station's compatible
/// chargers. Stations out of range rank as [`MAX_DIST`].
pub fn shortest_time_to_charge_ranking(
    world: &World,
    env: &Environment,
    vehicle: &Vehicle,
    station: &Station,
    target_soc: f64,
) -> SimResult<StationRanking> {
    let mechatronics = env.mechatronics_for(vehicle)?;
    let route = world.road_network().route(&vehicle.position, &station.position);
    if mechatronics.range_remaining_km(vehicle) < route.distance_km() {
        return Ok(StationRanking::unusable());
    }
    let step = world.timestep_seconds();
    let drive_seconds = route.travel_time_seconds();

    let mut best = StationRanking::unusable();
    for state in station.charger_states() {
        let charger = &state.charger;
        if state.total_chargers == 0 || !mechatronics.valid_charger(charger) {
            continue;
        }
        let remaining = |other: &Vehicle| -> SimResult<u64> {
            let other_mechatronics = env.mechatronics_for(other)?;
            Ok(time_to_full(other, other_mechatronics, charger, target_soc, step))
        };

        let mut charging = Vec::new();
        let mut queued = Vec::new();
        for other in world.vehicles().values() {
            match &other.vehicle_state {
                VehicleState::ChargingStation(s) if s.station_id == station.id && s.charger_id == charger.id => {
                    charging.push(remaining(other)?);
                }
                VehicleState::ChargeQueueing(s) if s.station_id == station.id && s.charger_id == charger.id => {
                    queued.push((s.enqueue_time, other.id.clone(), remaining(other)?));
                }
                _ => {}
            }
        }
        queued.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        let wait = greedy_wait_seconds(
            charging,
            queued.into_iter().map(|(_, _, t)| t).collect(),
            state.total_chargers as usize,
        );
        let own = time_to_full(vehicle, mechatronics, charger, target_soc, step);
        let cost = (drive_seconds + wait + own) as f64;
        if cost < best.cost {
            best = StationRanking {
                charger_id: Some(charger.id.clone()),
                cost,
            };
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestId, StationId, VehicleId};
    use crate::state::vehicle_state::{ChargeQueueing, ChargingStation};
    use crate::test_helpers::{
        cell_at_distance_km, mock_bev, mock_env, mock_request, mock_station, mock_vehicle, mock_world,
        test_cell,
    };
    use crate::mechatronics::Mechatronics;

    struct Point(&'static str, CellIndex);

    impl Assignable for Point {
        type Id = &'static str;

        fn assignment_id(&self) -> &Self::Id {
            &self.0
        }

        fn assignment_cell(&self) -> CellIndex {
            self.1
        }
    }

    fn points(prefix: &[&'static str]) -> Vec<Point> {
        prefix.iter().map(|id| Point(id, test_cell())).collect()
    }

    fn matrix_cost(costs: Vec<Vec<f64>>) -> impl Fn(&Point, &Point) -> f64 {
        move |a, b| {
            let i = a.0[1..].parse::<usize>().expect("row");
            let j = b.0[1..].parse::<usize>().expect("col");
            costs[i][j]
        }
    }

    #[test]
    fn toy_matrix_picks_the_optimal_pairing() {
        let vehicles = points(&["v0", "v1"]);
        let requests = points(&["r0", "r1"]);
        let solution = find_assignment(
            &vehicles.iter().collect::<Vec<_>>(),
            &requests.iter().collect::<Vec<_>>(),
            matrix_cost(vec![vec![1.0, 3.0], vec![4.0, 2.0]]),
        );
        assert_eq!(solution.pairs, vec![("v0", "r0"), ("v1", "r1")]);
        assert_eq!(solution.cost, 3.0);
    }

    #[test]
    fn more_assignees_than_targets() {
        let vehicles = points(&["v0", "v1", "v2"]);
        let requests = points(&["r0"]);
        let solution = find_assignment(
            &vehicles.iter().collect::<Vec<_>>(),
            &requests.iter().collect::<Vec<_>>(),
            matrix_cost(vec![vec![5.0], vec![1.0], vec![3.0]]),
        );
        assert_eq!(solution.pairs, vec![("v1", "r0")]);
        assert_eq!(solution.cost, 1.0);
    }

    #[test]
    fn infeasible_pairs_are_never_reported() {
        let vehicles = points(&["v0", "v1"]);
        let requests = points(&["r0", "r1"]);
        let inf = f64::INFINITY;
        let solution = find_assignment(
            &vehicles.iter().collect::<Vec<_>>(),
            &requests.iter().collect::<Vec<_>>(),
            matrix_cost(vec![vec![2.0, inf], vec![1.0, inf]]),
        );
        assert_eq!(solution.pairs, vec![("v1", "r0")]);

        let none = find_assignment(
            &vehicles.iter().collect::<Vec<_>>(),
            &requests.iter().collect::<Vec<_>>(),
            matrix_cost(vec![vec![inf, inf], vec![inf, inf]]),
        );
        assert!(none.pairs.is_empty());
        assert_eq!(none.cost, 0.0);
    }

    #[test]
    fn empty_inputs_short_circuit() {
        let vehicles: Vec<&Point> = Vec::new();
        let requests = points(&["r0"]);
        let solution = find_assignment(&vehicles, &requests.iter().collect::<Vec<_>>(), |_, _| 1.0);
        assert!(solution.pairs.is_empty());
    }

    #[test]
    fn h3_cost_matches_vehicles_to_requests() {
        let near = cell_at_distance_km(test_cell(), 0.5);
        let far = cell_at_distance_km(test_cell(), 5.0);
        let v0 = mock_vehicle("v0", test_cell());
        let v1 = mock_vehicle("v1", far);
        let r0 = mock_request("r0", far, test_cell(), 0);
        let r1 = mock_request("r1", near, test_cell(), 0);
        let solution = find_assignment(&[&v0, &v1], &[&r0, &r1], h3_distance_cost);
        assert_eq!(
            solution.pairs,
            vec![
                (VehicleId::from("v0"), RequestId::from("r1")),
                (VehicleId::from("v1"), RequestId::from("r0")),
            ]
        );
    }

    #[test]
    fn greedy_wait_drains_the_queue() {
        assert_eq!(greedy_wait_seconds(vec![], VecDeque::new(), 1), 0);
        assert_eq!(greedy_wait_seconds(vec![100], VecDeque::new(), 2), 0);
        assert_eq!(greedy_wait_seconds(vec![100], VecDeque::new(), 1), 100);
        assert_eq!(greedy_wait_seconds(vec![100], VecDeque::from([50]), 1), 150);
        assert_eq!(greedy_wait_seconds(vec![100, 30], VecDeque::from([50]), 2), 80);
    }

    #[test]
    fn shortest_queue_prefers_empty_chargers() {
        let env = mock_env();
        let vehicle = mock_vehicle("v1", test_cell());
        let cell = cell_at_distance_km(test_cell(), 2.0);
        let busy = mock_station("busy", cell)
            .enqueue_for_charger(&"DCFC".into())
            .and_then(|s| s.enqueue_for_charger(&"LEVEL_2".into()))
            .expect("enqueue");
        let quiet = mock_station("quiet", cell);
        let busy_rank = nearest_shortest_queue_ranking(&vehicle, &busy, &env).expect("rank");
        let quiet_rank = nearest_shortest_queue_ranking(&vehicle, &quiet, &env).expect("rank");
        assert!(quiet_rank.cost < busy_rank.cost);
        assert!(quiet_rank.charger_id.is_some());
    }

    #[test]
    fn time_to_charge_accounts_for_the_queue() {
        let env = mock_env();
        let bev = mock_bev();
        let cell = cell_at_distance_km(test_cell(), 2.0);
        let station = mock_station("s1", cell);
        let low = |id: &str, c| mock_vehicle(id, c).with_energy(bev.initial_energy(0.2));
        let vehicle = low("v1", test_cell());
        let world = mock_world().add_station(station.clone()).expect("station");
        let free = shortest_time_to_charge_ranking(&world, &env, &vehicle, &station, 0.8).expect("rank");

        let mut crowded = world.clone();
        for i in 0..4 {
            let id = format!("c{i}");
            let state = if i < 2 {
                VehicleState::ChargingStation(ChargingStation::new(VehicleId::from(id.as_str()), StationId::from("s1"), "DCFC".into()))
            } else {
                VehicleState::ChargeQueueing(ChargeQueueing::new(VehicleId::from(id.as_str()), StationId::from("s1"), "DCFC".into(), i))
            };
            crowded = crowded
                .add_vehicle(low(&id, cell).with_vehicle_state(state))
                .expect("vehicle");
        }
        let busy = shortest_time_to_charge_ranking(&crowded, &env, &vehicle, &station, 0.8).expect("rank");
        assert!(free.charger_id.is_some());
        assert!(busy.cost >= free.cost);

        let stranded = vehicle.with_energy(bev.initial_energy(0.0));
        let unreachable = shortest_time_to_charge_ranking(&world, &env, &stranded, &station, 0.8).expect("rank");
        assert_eq!(unreachable, StationRanking::unusable());
    }
}
