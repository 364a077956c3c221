//! Dynamic RRT variants: subtree invalidation and regrowth after world
//! changes, with an anytime layer on top for ADRRT.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

use skyplan_core::{
    AircraftCapabilities, CostPolicy, Environment, Position, RiskPolicy, Trajectory, WaypointId,
    WaypointPool,
};

use crate::error::{PlannerError, Result};
use crate::planner::{
    waypoints_supported, AnytimePlanner, Deadline, DynamicPlanner, Planner, RevisionHooks,
    RevisionListener,
};
use crate::rrt::{RrtConfig, RrtCore};

/// The last planning request, kept for regrowth after world changes.
#[derive(Debug, Clone, Copy)]
struct Request {
    origin: Position,
    destination: Position,
    etd: DateTime<Utc>,
}

/// Dynamic RRT: when an obstacle change invalidates tree edges, every
/// subtree hanging off a conflicted edge is discarded and the tree regrows
/// from the surviving part.
#[derive(Debug)]
pub struct Drrt {
    core: RrtCore,
    deadline: Deadline,
    revisions: RevisionHooks,
    request: Option<Request>,
}

impl Drrt {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        Self {
            core: RrtCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            request: None,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }

    /// Drop every subtree whose incoming edge now conflicts with the
    /// world, keeping the still-valid part rooted at the start.
    fn trim(&mut self, env: &Environment) {
        let Some(root) = self.core.root else {
            return;
        };
        let clearance = self.core.aircraft.separation_radius_m;

        let mut children: HashMap<WaypointId, Vec<WaypointId>> = HashMap::new();
        for (id, w) in self.core.pool.iter() {
            if let Some(parent) = w.parent {
                children.entry(parent).or_default().push(id);
            }
        }

        let mut valid: Vec<WaypointId> = Vec::new();
        let mut queue = VecDeque::from([root]);
        let mut seen: HashSet<WaypointId> = HashSet::from([root]);
        while let Some(node) = queue.pop_front() {
            valid.push(node);
            let node_pos = self.core.pool.get(node).position;
            for &child in children.get(&node).into_iter().flatten() {
                if !seen.insert(child) {
                    continue;
                }
                let child_pos = self.core.pool.get(child).position;
                if env.check_conflict(&child_pos, clearance)
                    || env.check_conflict_segment(&node_pos, &child_pos, clearance)
                {
                    continue; // child and its whole subtree are discarded
                }
                queue.push_back(child);
            }
        }

        // rebuild the arena from the surviving subtree
        let mut pool = WaypointPool::new();
        let mut remap: HashMap<WaypointId, WaypointId> = HashMap::new();
        for &old in &valid {
            let w = self.core.pool.get(old).clone();
            let new = pool.insert(w.position);
            {
                let slot = pool.get_mut(new);
                slot.g = w.g;
                slot.cost = w.cost;
                slot.h = w.h;
                slot.eto = w.eto;
                slot.parent = w.parent.and_then(|p| remap.get(&p).copied());
            }
            remap.insert(old, new);
        }
        tracing::debug!(
            kept = pool.len(),
            dropped = self.core.pool.len() - pool.len(),
            "trimmed conflicted subtrees"
        );
        self.core.root = remap.get(&root).copied();
        self.core.pool = pool;
    }

    /// Regrow the trimmed tree towards the goal.
    fn regrow(&mut self, env: &Environment) -> Trajectory {
        for _ in 0..self.core.config.max_iter {
            if self.deadline.expired() {
                break;
            }
            if let Some(goal) = self.core.grow_round(env) {
                return self.core.trajectory(env, goal);
            }
        }
        Trajectory::empty()
    }
}

impl Planner for Drrt {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.request = Some(Request {
            origin: *origin,
            destination: *destination,
            etd,
        });
        self.core.reset(env, origin, destination, etd);
        let trajectory = self.regrow(env);
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

impl DynamicPlanner for Drrt {
    fn world_changed(&mut self, env: &mut Environment) -> Trajectory {
        if self.request.is_none() {
            return Trajectory::empty();
        }
        self.trim(env);
        let trajectory = self.regrow(env);
        self.revisions.notify(&trajectory);
        trajectory
    }
}

/// Anytime dynamic RRT: DRRT's repair plus an anytime improvement cycle
/// under a shrinking cost bound.
#[derive(Debug)]
pub struct ADrrt {
    inner: Drrt,
    minimum_quality: f64,
    maximum_quality: f64,
    quality_improvement: f64,
}

impl ADrrt {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        Self {
            inner: Drrt::new(aircraft, config),
            minimum_quality: 0.0,
            maximum_quality: 1.0,
            quality_improvement: 0.1,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.inner = self.inner.with_policies(cost, risk);
        self
    }

    /// Improvement cycle: regrow from scratch under a shrinking bound,
    /// keeping the best solution found.
    fn improve(
        &mut self,
        env: &mut Environment,
        request: Request,
        mut best: Trajectory,
    ) -> Trajectory {
        let mut quality = self.minimum_quality;
        while quality < self.maximum_quality && !self.inner.deadline.expired() {
            quality = (quality + self.quality_improvement).min(self.maximum_quality);
            let bound = best.total_cost() * (1.0 - self.quality_improvement).max(0.0);

            self.inner
                .core
                .reset(env, &request.origin, &request.destination, request.etd);
            let mut found = Trajectory::empty();
            for _ in 0..self.inner.core.config.max_iter {
                if self.inner.deadline.expired() {
                    break;
                }
                let sample = self.inner.core.sample(env);
                let estimate = env.normalized_distance(&request.origin, &sample)
                    + env.normalized_distance(&sample, &request.destination);
                if estimate >= bound {
                    continue;
                }
                let Some(nearest) = self.inner.core.nearest(env, &sample) else {
                    continue;
                };
                let Some(new) = self.inner.core.extend(env, nearest, &sample) else {
                    continue;
                };
                if let Some(goal) = self.inner.core.try_finish(env, new) {
                    found = self.inner.core.trajectory(env, goal);
                    break;
                }
            }
            if !found.is_empty() && found.total_cost() < best.total_cost() {
                best = found;
                self.inner.revisions.notify(&best);
            }
        }
        best
    }
}

impl Planner for ADrrt {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        let initial = self.inner.plan(env, origin, destination, etd);
        if initial.is_empty() {
            return initial;
        }
        let request = self.inner.request.expect("request recorded by plan");
        self.improve(env, request, initial)
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
        self.inner.supports_environment(env)
    }

    fn supports_waypoints(&self, env: &Environment, waypoints: &[Position]) -> bool {
        self.inner.supports_waypoints(env, waypoints)
    }

    fn set_deadline(&mut self, deadline: Deadline) {
        self.inner.set_deadline(deadline);
    }

    fn add_revision_listener(&mut self, listener: RevisionListener) {
        self.inner.add_revision_listener(listener);
    }
}

impl DynamicPlanner for ADrrt {
    fn world_changed(&mut self, env: &mut Environment) -> Trajectory {
        let repaired = self.inner.world_changed(env);
        if repaired.is_empty() {
            return repaired;
        }
        let request = self.inner.request.expect("request recorded by plan");
        self.improve(env, request, repaired)
    }
}

impl AnytimePlanner for ADrrt {
    fn minimum_quality(&self) -> f64 {
        self.minimum_quality
    }

    fn set_minimum_quality(&mut self, quality: f64) -> Result<()> {
        if (0.0..=self.maximum_quality).contains(&quality) {
            self.minimum_quality = quality;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "initial inflation is invalid".into(),
            ))
        }
    }

    fn maximum_quality(&self) -> f64 {
        self.maximum_quality
    }

    fn set_maximum_quality(&mut self, quality: f64) -> Result<()> {
        if (self.minimum_quality..=1.0).contains(&quality) {
            self.maximum_quality = quality;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "final inflation is invalid".into(),
            ))
        }
    }

    fn quality_improvement(&self) -> f64 {
        self.quality_improvement
    }

    fn set_quality_improvement(&mut self, step: f64) -> Result<()> {
        if step > 0.0 {
            self.quality_improvement = step;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "inflation amount is invalid".into(),
            ))
        }
    }
}
