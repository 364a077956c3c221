//! RRT*: asymptotically optimal RRT with local rewiring.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use skyplan_core::{
    AircraftCapabilities, CostPolicy, Environment, Position, RiskPolicy, Trajectory, WaypointId,
};

use crate::planner::{waypoints_supported, Deadline, Planner, RevisionHooks, RevisionListener};
use crate::rrt::{RrtConfig, RrtCore};

/// RRT with rewiring: each inserted waypoint adopts the cheapest parent in
/// its neighborhood, and neighbors re-route through it when that lowers
/// their cost.
#[derive(Debug)]
pub struct RrtStar {
    core: RrtCore,
    deadline: Deadline,
    revisions: RevisionHooks,
    /// Neighborhood radius for parent choice and rewiring, meters.
    rewire_radius_m: f64,
}

impl RrtStar {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        let rewire_radius_m = config.epsilon_m * 2.0;
        Self {
            core: RrtCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            rewire_radius_m,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }

    pub fn with_rewire_radius(mut self, radius_m: f64) -> Self {
        self.rewire_radius_m = radius_m;
        self
    }

    fn neighborhood(&self, env: &Environment, of: WaypointId) -> Vec<WaypointId> {
        let position = self.core.pool.get(of).position;
        self.core
            .pool
            .iter()
            .filter(|(id, w)| *id != of && w.is_reached())
            .filter(|(_, w)| env.distance(&w.position, &position) <= self.rewire_radius_m)
            .map(|(id, _)| id)
            .collect()
    }

    /// Cost of routing `to` through `from`; infinite when blocked.
    fn through_cost(&self, env: &Environment, from: WaypointId, to: WaypointId) -> f64 {
        let from_w = self.core.pool.get(from);
        let to_pos = self.core.pool.get(to).position;
        let Some(from_eto) = from_w.eto else {
            return f64::INFINITY;
        };
        let from_pos = from_w.position;
        let clearance = self.core.aircraft.separation_radius_m;
        if env.check_conflict_segment(&from_pos, &to_pos, clearance) {
            return f64::INFINITY;
        }
        if !self
            .core
            .aircraft
            .is_feasible(&env.frame().globe, &from_pos, &to_pos)
        {
            return f64::INFINITY;
        }
        let end = from_eto
            + self
                .core
                .aircraft
                .estimated_duration(&env.frame().globe, &from_pos, &to_pos);
        let step = env.leg_cost(
            &from_pos,
            &to_pos,
            from_eto,
            end,
            self.core.cost_policy,
            self.core.risk_policy,
        );
        from_w.g + step
    }

    fn reroute(&mut self, env: &Environment, child: WaypointId, parent: WaypointId) {
        let parent_pos = self.core.pool.get(parent).position;
        let parent_eto = self.core.pool.get(parent).eto;
        let child_pos = self.core.pool.get(child).position;
        let g = self.through_cost(env, parent, child);
        let end = parent_eto.map(|eto| {
            eto + self
                .core
                .aircraft
                .estimated_duration(&env.frame().globe, &parent_pos, &child_pos)
        });
        let w = self.core.pool.get_mut(child);
        w.parent = Some(parent);
        w.g = g;
        w.cost = g;
        w.eto = end;
    }

    /// Refresh costs and ETOs of a subtree after its root got cheaper.
    fn propagate(&mut self, env: &Environment, root: WaypointId) {
        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            let children: Vec<WaypointId> = self
                .core
                .pool
                .iter()
                .filter(|(_, w)| w.parent == Some(node))
                .map(|(id, _)| id)
                .collect();
            for child in children {
                self.reroute(env, child, node);
                queue.push_back(child);
            }
        }
    }

    fn rewire(&mut self, env: &Environment, new: WaypointId) {
        // adopt the cheapest parent in the neighborhood
        let neighborhood = self.neighborhood(env, new);
        let mut best_parent = self.core.pool.get(new).parent;
        let mut best_g = self.core.pool.get(new).g;
        for &candidate in &neighborhood {
            let g = self.through_cost(env, candidate, new);
            if g < best_g {
                best_g = g;
                best_parent = Some(candidate);
            }
        }
        if best_parent != self.core.pool.get(new).parent {
            if let Some(parent) = best_parent {
                self.reroute(env, new, parent);
            }
        }

        // re-route neighbors through the new waypoint when cheaper
        for neighbor in neighborhood {
            if Some(neighbor) == self.core.pool.get(new).parent {
                continue;
            }
            let g = self.through_cost(env, new, neighbor);
            if g < self.core.pool.get(neighbor).g {
                self.reroute(env, neighbor, new);
                self.propagate(env, neighbor);
            }
        }
    }
}

impl Planner for RrtStar {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.core.reset(env, origin, destination, etd);
        let mut reached_goal: Option<WaypointId> = None;

        for _ in 0..self.core.config.max_iter {
            if self.deadline.expired() {
                break;
            }
            let sample = self.core.sample(env);
            let Some(nearest) = self.core.nearest(env, &sample) else {
                continue;
            };
            let Some(new) = self.core.extend(env, nearest, &sample) else {
                continue;
            };
            self.rewire(env, new);
            if reached_goal.is_none() {
                reached_goal = self.core.try_finish(env, new);
            }
        }

        let trajectory = match reached_goal {
            Some(goal) => self.core.trajectory(env, goal),
            None => Trajectory::empty(),
        };
        self.revisions.notify(&trajectory);
        trajectory
    }

    fn plan_via(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        via: &[Position],
        etd: DateTime<Utc>,
    ) -> Trajectory {
        crate::planner::plan_via_segments(self, env, origin, destination, via, etd)
    }

    fn supports_environment(&self, env: &Environment) -> bool {
        env.is_sampling()
    }

    fn supports_waypoints(&self, env: &Environment, waypoints: &[Position]) -> bool {
        waypoints_supported(env, &self.core.aircraft, waypoints)
    }

    fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = deadline;
    }

    fn add_revision_listener(&mut self, listener: RevisionListener) {
        self.revisions.subscribe(listener);
    }
}
