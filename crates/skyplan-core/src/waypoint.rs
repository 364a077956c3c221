//! Waypoint arena and trajectories.
//!
//! Waypoints live in an arena and refer to each other by handle, so parent
//! links never form ownership cycles and anytime snapshots are plain copies
//! of the arena.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geo::{Position, PrecisionPosition};

/// Stable handle of a waypoint within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WaypointId(pub u32);

impl WaypointId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A time-stamped 3D node of a plan or roadmap.
///
/// Not every planner uses every field; unreached nodes carry infinite cost.
#[derive(Debug, Clone)]
pub struct Waypoint {
    pub position: Position,
    pub eto: Option<DateTime<Utc>>,
    pub parent: Option<WaypointId>,
    /// Accumulated cost from the start; infinite when unreached.
    pub g: f64,
    /// Heuristic to the goal.
    pub h: f64,
    /// Planner-specific objective; may differ from `g`.
    pub cost: f64,
    pub distance_to_goal: f64,
    pub dtg: f64,
    pub ttg: Option<Duration>,
    /// Neighbor count within the connection radius (roadmap planners).
    pub density: u32,
    /// Current inflation weight (anytime roadmap planners).
    pub beta: f64,
    /// Identifier of the last search that touched this waypoint.
    pub search: u32,
    pub neighbors: Vec<WaypointId>,
}

impl Waypoint {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            eto: None,
            parent: None,
            g: f64::INFINITY,
            h: 0.0,
            cost: f64::INFINITY,
            distance_to_goal: f64::INFINITY,
            dtg: 0.0,
            ttg: None,
            density: 0,
            beta: 0.0,
            search: 0,
            neighbors: Vec::new(),
        }
    }

    pub fn is_reached(&self) -> bool {
        self.g.is_finite()
    }

    /// Reset the search-scoped fields, keeping position and connectivity.
    pub fn reset_search_state(&mut self) {
        self.parent = None;
        self.g = f64::INFINITY;
        self.cost = f64::INFINITY;
        self.eto = None;
    }
}

/// Arena of waypoints, deduplicated by quantized position.
#[derive(Debug, Clone, Default)]
pub struct WaypointPool {
    slots: Vec<Waypoint>,
    index: HashMap<PrecisionPosition, WaypointId>,
}

impl WaypointPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert a waypoint at a position, or return the existing node there.
    pub fn insert(&mut self, position: Position) -> WaypointId {
        let key = position.precision();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = WaypointId(self.slots.len() as u32);
        self.slots.push(Waypoint::new(position));
        self.index.insert(key, id);
        id
    }

    pub fn lookup(&self, position: &Position) -> Option<WaypointId> {
        self.index.get(&position.precision()).copied()
    }

    pub fn get(&self, id: WaypointId) -> &Waypoint {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: WaypointId) -> &mut Waypoint {
        &mut self.slots[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = WaypointId> + '_ {
        (0..self.slots.len() as u32).map(WaypointId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaypointId, &Waypoint)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, w)| (WaypointId(i as u32), w))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Snapshot of the arena; handles remain valid in the copy, so parent
    /// and neighbor links carry over without rewiring.
    pub fn snapshot(&self) -> WaypointPool {
        self.clone()
    }

    /// Walk parent links from `goal` back to the root.
    /// Returns ids in start-to-goal order; `None` on a broken or cyclic chain.
    pub fn chain_to_root(&self, goal: WaypointId) -> Option<Vec<WaypointId>> {
        let mut chain = Vec::new();
        let mut current = Some(goal);
        while let Some(id) = current {
            if chain.len() > self.slots.len() {
                return None; // cycle
            }
            chain.push(id);
            current = self.get(id).parent;
        }
        chain.reverse();
        Some(chain)
    }
}

/// One node of an emitted trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryWaypoint {
    pub position: Position,
    pub eto: Option<DateTime<Utc>>,
    pub cost: f64,
    /// Distance to go until the end of the trajectory, meters.
    pub dtg: f64,
    /// Time to go until the end of the trajectory, seconds.
    pub ttg_s: f64,
}

/// Ordered sequence of waypoints from start to goal.
///
/// An empty trajectory communicates "no plan" to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub waypoints: Vec<TrajectoryWaypoint>,
}

impl Trajectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(waypoints: Vec<TrajectoryWaypoint>) -> Self {
        Self { waypoints }
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn first(&self) -> Option<&TrajectoryWaypoint> {
        self.waypoints.first()
    }

    pub fn last(&self) -> Option<&TrajectoryWaypoint> {
        self.waypoints.last()
    }

    /// Cost accumulated at the final waypoint; infinite when empty.
    pub fn total_cost(&self) -> f64 {
        self.last().map(|w| w.cost).unwrap_or(f64::INFINITY)
    }

    /// Build a trajectory by walking parent links from `goal`, annotating
    /// each node with distance-to-go and time-to-go.
    pub fn from_chain<F>(pool: &WaypointPool, goal: WaypointId, distance: F) -> Self
    where
        F: Fn(&Position, &Position) -> f64,
    {
        let Some(chain) = pool.chain_to_root(goal) else {
            return Self::empty();
        };

        let mut waypoints: Vec<TrajectoryWaypoint> = chain
            .iter()
            .map(|&id| {
                let w = pool.get(id);
                TrajectoryWaypoint {
                    position: w.position,
                    eto: w.eto,
                    cost: if w.cost.is_finite() { w.cost } else { w.g },
                    dtg: 0.0,
                    ttg_s: 0.0,
                }
            })
            .collect();

        // accumulate distance-to-go backwards from the goal
        let final_eto = waypoints.last().and_then(|w| w.eto);
        let mut dtg = 0.0;
        for i in (0..waypoints.len()).rev() {
            if i + 1 < waypoints.len() {
                dtg += distance(&waypoints[i].position, &waypoints[i + 1].position);
            }
            waypoints[i].dtg = dtg;
            waypoints[i].ttg_s = match (waypoints[i].eto, final_eto) {
                (Some(eto), Some(last)) => (last - eto).num_milliseconds() as f64 / 1000.0,
                _ => 0.0,
            };
        }

        Self { waypoints }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pool_dedupes_by_position() {
        let mut pool = WaypointPool::new();
        let a = pool.insert(Position::new(1.0, 2.0, 3.0));
        let b = pool.insert(Position::new(1.0, 2.0, 3.0));
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn chain_walks_parents_in_order() {
        let mut pool = WaypointPool::new();
        let a = pool.insert(Position::new(0.0, 0.0, 0.0));
        let b = pool.insert(Position::new(0.0, 0.0, 10.0));
        let c = pool.insert(Position::new(0.0, 0.0, 20.0));
        pool.get_mut(b).parent = Some(a);
        pool.get_mut(c).parent = Some(b);
        assert_eq!(pool.chain_to_root(c).unwrap(), vec![a, b, c]);
    }

    #[test]
    fn chain_detects_cycles() {
        let mut pool = WaypointPool::new();
        let a = pool.insert(Position::new(0.0, 0.0, 0.0));
        let b = pool.insert(Position::new(0.0, 0.0, 10.0));
        pool.get_mut(a).parent = Some(b);
        pool.get_mut(b).parent = Some(a);
        assert!(pool.chain_to_root(b).is_none());
    }

    #[test]
    fn snapshot_preserves_links() {
        let mut pool = WaypointPool::new();
        let a = pool.insert(Position::new(0.0, 0.0, 0.0));
        let b = pool.insert(Position::new(0.0, 0.0, 10.0));
        pool.get_mut(b).parent = Some(a);
        let copy = pool.snapshot();
        pool.get_mut(b).parent = None;
        assert_eq!(copy.get(b).parent, Some(a));
    }

    #[test]
    fn trajectory_annotates_dtg_and_ttg() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut pool = WaypointPool::new();
        let a = pool.insert(Position::new(0.0, 0.0, 0.0));
        let b = pool.insert(Position::new(0.0, 0.0, 30.0));
        pool.get_mut(a).g = 0.0;
        pool.get_mut(a).eto = Some(t0);
        pool.get_mut(b).g = 1.0;
        pool.get_mut(b).eto = Some(t0 + Duration::seconds(15));
        pool.get_mut(b).parent = Some(a);

        let trajectory = Trajectory::from_chain(&pool, b, |p, q| {
            (q.altitude_m - p.altitude_m).abs()
        });
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.waypoints[0].dtg, 30.0);
        assert_eq!(trajectory.waypoints[0].ttg_s, 15.0);
        assert_eq!(trajectory.waypoints[1].dtg, 0.0);
        assert!(trajectory.total_cost() >= 0.0);
    }
}
