//! ARA*: anytime weighted A* with decreasing heuristic inflation.

use chrono::{DateTime, Utc};

use skyplan_core::{AircraftCapabilities, CostPolicy, Environment, Position, RiskPolicy, Trajectory};

use crate::astar::AStarCore;
use crate::error::{PlannerError, Result};
use crate::planner::{
    waypoints_supported, AnytimePlanner, Deadline, Planner, RevisionHooks, RevisionListener,
};

/// Anytime repairing A*.
///
/// Each pass runs weighted A* with `f = g + eps * h`, reusing the previous
/// pass's graph; waypoints improved after expansion are re-expanded on the
/// next pass. Every pass publishes its trajectory; the loop ends when the
/// inflation reaches its bound or the deadline fires.
#[derive(Debug)]
pub struct AraStar {
    core: AStarCore,
    deadline: Deadline,
    revisions: RevisionHooks,
    minimum_quality: f64,
    maximum_quality: f64,
    quality_improvement: f64,
    /// Additional inflation at quality 0; quality 1 is uninflated.
    inflation_span: f64,
}

impl AraStar {
    pub fn new(aircraft: AircraftCapabilities) -> Self {
        Self {
            core: AStarCore::new(aircraft),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            minimum_quality: 0.0,
            maximum_quality: 1.0,
            quality_improvement: 0.25,
            inflation_span: 2.0,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }

    fn inflation_for(&self, quality: f64) -> f64 {
        1.0 + (1.0 - quality) * self.inflation_span
    }
}

impl Planner for AraStar {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        let mut quality = self.minimum_quality;
        self.core.epsilon = self.inflation_for(quality);
        self.core.initialize(env, origin, destination, etd);

        let mut best = Trajectory::empty();
        loop {
            let reached = self.core.run_pass(env, self.deadline);
            let trajectory = self.core.trajectory(env, reached);
            if !trajectory.is_empty()
                && (best.is_empty() || trajectory.total_cost() <= best.total_cost())
            {
                best = trajectory;
            }
            tracing::debug!(
                quality,
                epsilon = self.core.epsilon,
                cost = best.total_cost(),
                "anytime pass complete"
            );
            self.revisions.notify(&best);

            if quality >= self.maximum_quality || self.deadline.expired() {
                break;
            }
            quality = (quality + self.quality_improvement).min(self.maximum_quality);
            self.core.epsilon = self.inflation_for(quality);
            self.core.prepare_next_pass();
            if self.core.open.is_empty() {
                break;
            }
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
        env.is_grid()
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

impl AnytimePlanner for AraStar {
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
