//! Anytime RRT: repeated tree searches under a shrinking cost bound.

use chrono::{DateTime, Utc};

use skyplan_core::{AircraftCapabilities, CostPolicy, Environment, Position, RiskPolicy, Trajectory};

use crate::error::{PlannerError, Result};
use crate::planner::{
    waypoints_supported, AnytimePlanner, Deadline, Planner, RevisionHooks, RevisionListener,
};
use crate::rrt::{RrtConfig, RrtCore};

/// Anytime RRT.
///
/// After a first solution, the tree is regrown from scratch with samples
/// rejected whenever they cannot possibly beat the current cost bound;
/// the bound shrinks by the quality improvement between passes. Every
/// improving pass publishes its trajectory.
#[derive(Debug)]
pub struct ARrt {
    core: RrtCore,
    deadline: Deadline,
    revisions: RevisionHooks,
    minimum_quality: f64,
    maximum_quality: f64,
    quality_improvement: f64,
}

impl ARrt {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        Self {
            core: RrtCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            minimum_quality: 0.0,
            maximum_quality: 1.0,
            quality_improvement: 0.1,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }

    /// Optimistic cost estimate of routing through a sample; used for the
    /// bounded-sample rejection.
    fn estimate(&self, env: &Environment, origin: &Position, sample: &Position, goal: &Position) -> f64 {
        env.normalized_distance(origin, sample) + env.normalized_distance(sample, goal)
    }

    /// One bounded growth pass; samples whose optimistic estimate exceeds
    /// `cmax` are rejected outright.
    fn bounded_pass(
        &mut self,
        env: &Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
        cmax: f64,
    ) -> Trajectory {
        self.core.reset(env, origin, destination, etd);
        for _ in 0..self.core.config.max_iter {
            if self.deadline.expired() {
                break;
            }
            let sample = self.core.sample(env);
            if self.estimate(env, origin, &sample, destination) >= cmax {
                continue;
            }
            let Some(nearest) = self.core.nearest(env, &sample) else {
                continue;
            };
            let Some(new) = self.core.extend(env, nearest, &sample) else {
                continue;
            };
            if let Some(goal) = self.core.try_finish(env, new) {
                return self.core.trajectory(env, goal);
            }
        }
        Trajectory::empty()
    }
}

impl Planner for ARrt {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        let mut best = Trajectory::empty();
        let mut cmax = f64::INFINITY;
        let mut quality = self.minimum_quality;

        loop {
            let trajectory = self.bounded_pass(env, origin, destination, etd, cmax);
            if !trajectory.is_empty() && trajectory.total_cost() < best.total_cost() {
                tracing::debug!(
                    cost = trajectory.total_cost(),
                    bound = cmax,
                    "anytime pass improved the plan"
                );
                best = trajectory;
                self.revisions.notify(&best);
            } else if best.is_empty() {
                // no initial solution at all: report and stop
                self.revisions.notify(&best);
                return best;
            }

            if quality >= self.maximum_quality || self.deadline.expired() {
                break;
            }
            quality = (quality + self.quality_improvement).min(self.maximum_quality);
            cmax = best.total_cost() * (1.0 - self.quality_improvement).max(0.0);
        }
        best
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

impl AnytimePlanner for ARrt {
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
