//! Roadmap: a waypoint pool plus explicit edges, shared by the
//! probabilistic-roadmap planners.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::environment::Environment;
use crate::geo::Position;
use crate::intervals::IntervalTree;
use crate::waypoint::{WaypointId, WaypointPool};

/// Undirected roadmap edge with its edge-local cost intervals and a
/// desirability blend.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: WaypointId,
    pub to: WaypointId,
    pub intervals: IntervalTree,
    /// Desirability of traversal in `[0,1]`; 0.5 is neutral.
    pub desirability: f64,
    /// Weight of the desirability influence on the edge cost, in `[0,1]`.
    pub lambda: f64,
}

impl Edge {
    pub fn new(from: WaypointId, to: WaypointId) -> Self {
        Self {
            from,
            to,
            intervals: IntervalTree::new(),
            desirability: 0.5,
            lambda: 0.5,
        }
    }

    pub fn connects(&self, a: WaypointId, b: WaypointId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// Blend a step cost with the edge desirability.
    ///
    /// Neutral desirability leaves the cost unchanged; a fully desirable
    /// edge discounts it by `lambda`, a fully undesirable one surcharges
    /// it by `lambda`.
    pub fn blended_cost(&self, step_cost: f64) -> f64 {
        step_cost * ((1.0 - self.lambda) + self.lambda * 2.0 * (1.0 - self.desirability))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct EdgeKey(WaypointId, WaypointId);

impl EdgeKey {
    fn of(a: WaypointId, b: WaypointId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Waypoint pool plus explicit edges; the graph the PRM family searches.
#[derive(Debug, Clone, Default)]
pub struct Roadmap {
    pub pool: WaypointPool,
    edges: Vec<Edge>,
    index: HashMap<EdgeKey, usize>,
}

impl Roadmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edge_between(&self, a: WaypointId, b: WaypointId) -> Option<&Edge> {
        self.index
            .get(&EdgeKey::of(a, b))
            .map(|&i| &self.edges[i])
    }

    pub fn has_edge(&self, a: WaypointId, b: WaypointId) -> bool {
        self.index.contains_key(&EdgeKey::of(a, b))
    }

    /// Add an edge and cross-link the endpoint neighbor sets.
    /// Returns false for self-loops and edges that already exist.
    pub fn link(&mut self, edge: Edge) -> bool {
        if edge.from == edge.to {
            return false;
        }
        let key = EdgeKey::of(edge.from, edge.to);
        if self.index.contains_key(&key) {
            return false;
        }
        let (a, b) = (edge.from, edge.to);
        self.index.insert(key, self.edges.len());
        self.edges.push(edge);
        if !self.pool.get(a).neighbors.contains(&b) {
            self.pool.get_mut(a).neighbors.push(b);
        }
        if !self.pool.get(b).neighbors.contains(&a) {
            self.pool.get_mut(b).neighbors.push(a);
        }
        true
    }

    /// Remove an edge and the corresponding neighbor references.
    pub fn unlink(&mut self, a: WaypointId, b: WaypointId) -> bool {
        let key = EdgeKey::of(a, b);
        let Some(removed) = self.index.remove(&key) else {
            return false;
        };
        self.edges.swap_remove(removed);
        if removed < self.edges.len() {
            let moved = &self.edges[removed];
            self.index
                .insert(EdgeKey::of(moved.from, moved.to), removed);
        }
        self.pool.get_mut(a).neighbors.retain(|&n| n != b);
        self.pool.get_mut(b).neighbors.retain(|&n| n != a);
        true
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.edges.clear();
        self.index.clear();
    }

    /// Waypoint ids sorted by normalized distance to a position (stable).
    pub fn sort_nearest(&self, env: &Environment, position: &Position) -> Vec<WaypointId> {
        let mut ids: Vec<WaypointId> = self.pool.ids().collect();
        ids.sort_by(|&a, &b| {
            let da = env.normalized_distance(&self.pool.get(a).position, position);
            let db = env.normalized_distance(&self.pool.get(b).position, position);
            da.total_cmp(&db)
        });
        ids
    }

    /// The `k` nearest waypoints to a position.
    pub fn find_nearest(&self, env: &Environment, position: &Position, k: usize) -> Vec<WaypointId> {
        let mut ids = self.sort_nearest(env, position);
        ids.truncate(k);
        ids
    }

    /// Number of waypoints within `max_distance` of a position, excluding
    /// the waypoint at that exact position.
    pub fn count_within(&self, env: &Environment, position: &Position, max_distance: f64) -> u32 {
        let key = position.precision();
        self.pool
            .iter()
            .filter(|(_, w)| w.position.precision() != key)
            .filter(|(_, w)| env.distance(&w.position, position) < max_distance)
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_and_unlink_maintain_neighbors() {
        let mut roadmap = Roadmap::new();
        let a = roadmap.pool.insert(Position::new(0.0, 0.0, 0.0));
        let b = roadmap.pool.insert(Position::new(0.0, 0.0, 10.0));
        let c = roadmap.pool.insert(Position::new(0.0, 0.0, 20.0));

        assert!(roadmap.link(Edge::new(a, b)));
        assert!(!roadmap.link(Edge::new(b, a)));
        assert!(roadmap.link(Edge::new(b, c)));
        assert_eq!(roadmap.edge_count(), 2);
        assert_eq!(roadmap.pool.get(b).neighbors.len(), 2);
        assert!(roadmap.edge_between(a, b).is_some());

        assert!(roadmap.unlink(b, a));
        assert_eq!(roadmap.edge_count(), 1);
        assert!(roadmap.edge_between(a, b).is_none());
        assert!(roadmap.edge_between(b, c).is_some());
        assert_eq!(roadmap.pool.get(b).neighbors, vec![c]);
    }

    #[test]
    fn blended_cost_is_neutral_at_half() {
        let mut edge = Edge::new(WaypointId(0), WaypointId(1));
        assert!((edge.blended_cost(10.0) - 10.0).abs() < 1e-12);
        edge.desirability = 1.0;
        assert!(edge.blended_cost(10.0) < 10.0);
        edge.desirability = 0.0;
        assert!(edge.blended_cost(10.0) > 10.0);
        edge.lambda = 0.0;
        assert!((edge.blended_cost(10.0) - 10.0).abs() < 1e-12);
    }
}
