//! Probabilistic roadmap planners: eager, lazy and rigid variants sharing
//! roadmap construction and an A* query over the roadmap edges.

mod basic;
mod lazy;
mod rigid;

pub use basic::BasicPrm;
pub use lazy::LazyPrm;
pub use rigid::RigidPrm;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use skyplan_core::obstacle::segment_desirability;
use skyplan_core::{
    AircraftCapabilities, CostPolicy, DesirabilityZone, Edge, Environment, Position, RiskPolicy,
    Roadmap, Trajectory, WaypointId,
};

use crate::planner::Deadline;
use crate::queue::{OpenQueue, SearchKey};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrmConfig {
    /// Sampling attempts during construction.
    pub max_iter: u32,
    /// Maximum connections added per waypoint.
    pub max_neighbors: usize,
    /// Maximum length of a roadmap edge, meters.
    pub max_distance_m: f64,
    /// Desirability influence on edge costs, `[0,1]`.
    pub lambda: f64,
    /// RNG seed for reproducible construction; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for PrmConfig {
    fn default() -> Self {
        Self {
            max_iter: 500,
            max_neighbors: 10,
            max_distance_m: 200.0,
            lambda: 0.5,
            seed: None,
        }
    }
}

/// Create an edge between two roadmap waypoints, embedding its interval
/// tree and desirability.
pub(crate) fn make_edge(
    roadmap: &Roadmap,
    env: &Environment,
    zones: &[DesirabilityZone],
    lambda: f64,
    a: WaypointId,
    b: WaypointId,
) -> Edge {
    let pa = roadmap.pool.get(a).position;
    let pb = roadmap.pool.get(b).position;
    let mut edge = Edge::new(a, b);
    edge.intervals = env.embed_interval_tree(&pa, &pb);
    let frame = env.frame();
    let segment = skyplan_core::geom::LineSegment::new(frame.to_local(&pa), frame.to_local(&pb));
    edge.desirability = segment_desirability(zones, frame, &segment);
    edge.lambda = lambda;
    edge
}

/// Connect a waypoint to its nearest roadmap neighbors within the
/// connection radius, up to the neighbor cap. Collision checking against
/// the current obstacles is skipped in lazy construction.
pub(crate) fn connect_waypoint(
    roadmap: &mut Roadmap,
    env: &Environment,
    aircraft: &AircraftCapabilities,
    zones: &[DesirabilityZone],
    config: &PrmConfig,
    id: WaypointId,
    check_collision: bool,
) -> usize {
    let position = roadmap.pool.get(id).position;
    let candidates = roadmap.sort_nearest(env, &position);
    let globe = env.frame().globe;
    let mut connected = 0usize;

    for candidate in candidates {
        if candidate == id {
            continue;
        }
        if connected >= config.max_neighbors {
            break;
        }
        let candidate_pos = roadmap.pool.get(candidate).position;
        let distance = env.distance(&position, &candidate_pos);
        if distance >= config.max_distance_m {
            break; // sorted by distance, nothing closer follows
        }
        if roadmap.has_edge(id, candidate) {
            connected += 1;
            continue;
        }
        if !aircraft.is_feasible(&globe, &position, &candidate_pos)
            && !aircraft.is_feasible(&globe, &candidate_pos, &position)
        {
            continue;
        }
        if check_collision
            && env.check_conflict_segment(&position, &candidate_pos, aircraft.separation_radius_m)
        {
            continue;
        }
        let edge = make_edge(roadmap, env, zones, config.lambda, id, candidate);
        roadmap.link(edge);
        connected += 1;
    }
    connected
}

/// Sample collision-free waypoints and connect each into the roadmap.
pub(crate) fn construct_roadmap(
    roadmap: &mut Roadmap,
    env: &Environment,
    aircraft: &AircraftCapabilities,
    zones: &[DesirabilityZone],
    config: &PrmConfig,
    rng: &mut StdRng,
    check_collision: bool,
) {
    for _ in 0..config.max_iter {
        let position = env.sample_random_position(rng);
        if env.check_conflict(&position, aircraft.separation_radius_m) {
            continue;
        }
        let id = roadmap.pool.insert(position);
        connect_waypoint(roadmap, env, aircraft, zones, config, id, check_collision);
    }
    tracing::debug!(
        waypoints = roadmap.pool.len(),
        edges = roadmap.edge_count(),
        "roadmap constructed"
    );
}

/// A* over the roadmap edges from `origin` to `destination`.
///
/// With `lazy` validation, edges are collision-checked as they are relaxed;
/// conflicted edges are removed from the roadmap on the spot, so a blocked
/// path can never be returned.
#[allow(clippy::too_many_arguments)]
pub(crate) fn roadmap_query(
    roadmap: &mut Roadmap,
    env: &Environment,
    aircraft: &AircraftCapabilities,
    zones: &[DesirabilityZone],
    config: &PrmConfig,
    cost_policy: CostPolicy,
    risk_policy: RiskPolicy,
    origin: &Position,
    destination: &Position,
    etd: DateTime<Utc>,
    lazy: bool,
    deadline: Deadline,
) -> Trajectory {
    // extend the roadmap with start and goal under the same connection rule
    let start = roadmap.pool.insert(*origin);
    connect_waypoint(roadmap, env, aircraft, zones, config, start, !lazy);
    let goal = roadmap.pool.insert(*destination);
    connect_waypoint(roadmap, env, aircraft, zones, config, goal, !lazy);

    let ids: Vec<WaypointId> = roadmap.pool.ids().collect();
    for id in ids {
        let position = roadmap.pool.get(id).position;
        let h = env.normalized_distance(&position, destination);
        let w = roadmap.pool.get_mut(id);
        w.reset_search_state();
        w.h = h;
    }
    {
        let w = roadmap.pool.get_mut(start);
        w.g = 0.0;
        w.cost = 0.0;
        w.eto = Some(etd);
    }

    let globe = env.frame().globe;
    let mut open = OpenQueue::new();
    let mut closed: HashSet<WaypointId> = HashSet::new();
    open.insert(start, SearchKey::new(roadmap.pool.get(start).h, 0.0));

    while let Some(source) = open.pop() {
        if deadline.expired() {
            break;
        }
        if source == goal {
            return Trajectory::from_chain(&roadmap.pool, goal, |a, b| env.distance(a, b));
        }
        closed.insert(source);

        let neighbors = roadmap.pool.get(source).neighbors.clone();
        for target in neighbors {
            if closed.contains(&target) {
                continue;
            }
            let source_pos = roadmap.pool.get(source).position;
            let target_pos = roadmap.pool.get(target).position;
            let Some(source_eto) = roadmap.pool.get(source).eto else {
                continue;
            };

            if lazy
                && env.check_conflict_segment(
                    &source_pos,
                    &target_pos,
                    aircraft.separation_radius_m,
                )
            {
                // deferred validation failed: drop the edge and move on
                roadmap.unlink(source, target);
                continue;
            }
            if !aircraft.is_feasible(&globe, &source_pos, &target_pos) {
                continue;
            }

            let end = source_eto + aircraft.estimated_duration(&globe, &source_pos, &target_pos);
            let step = env.step_cost(
                &source_pos,
                &target_pos,
                source_eto,
                end,
                cost_policy,
                risk_policy,
            );
            let step = match roadmap.edge_between(source, target) {
                Some(edge) => edge.blended_cost(step),
                None => step,
            };
            if !step.is_finite() {
                continue;
            }

            let candidate = roadmap.pool.get(source).g + step;
            if candidate < roadmap.pool.get(target).g {
                let w = roadmap.pool.get_mut(target);
                w.parent = Some(source);
                w.g = candidate;
                w.cost = candidate;
                w.eto = Some(end);
                let key = SearchKey::new(candidate + roadmap.pool.get(target).h, 0.0);
                open.insert(target, key);
            }
        }
    }

    Trajectory::empty()
}
