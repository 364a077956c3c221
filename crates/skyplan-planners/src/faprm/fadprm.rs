//! FADPRM: flexible anytime dynamic PRM — FAPRM plus incremental repair
//! across world changes.

use chrono::{DateTime, Utc};

use skyplan_core::{
    AircraftCapabilities, CostPolicy, DesirabilityZone, Environment, Position, RiskPolicy, Roadmap,
    Trajectory,
};

use crate::error::Result;
use crate::faprm::{Faprm, FaprmConfig};
use crate::planner::{
    AnytimePlanner, Deadline, DynamicPlanner, Planner, RevisionListener,
};

/// FAPRM with dynamic repair: obstacle changes remove conflicted edges,
/// invalidate dependent plan fragments and resume the search under a new
/// search identifier instead of replanning from scratch.
#[derive(Debug)]
pub struct Fadprm {
    inner: Faprm,
}

impl Fadprm {
    pub fn new(aircraft: AircraftCapabilities, config: FaprmConfig) -> Self {
        Self {
            inner: Faprm::new(aircraft, config),
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.inner = self.inner.with_policies(cost, risk);
        self
    }

    pub fn with_zones(mut self, zones: Vec<DesirabilityZone>) -> Self {
        self.inner = self.inner.with_zones(zones);
        self
    }

    pub fn roadmap(&self) -> &Roadmap {
        self.inner.roadmap()
    }

    /// Identifier of the current search; bumps on every world change.
    pub fn search_id(&self) -> u32 {
        self.inner.core.search
    }
}

impl Planner for Fadprm {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.inner.plan(env, origin, destination, etd)
    }

    fn plan_via(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        via: &[Position],
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.inner.plan_via(env, origin, destination, via, etd)
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

impl DynamicPlanner for Fadprm {
    fn world_changed(&mut self, env: &mut Environment) -> Trajectory {
        if self.inner.core.start.is_none() {
            return Trajectory::empty();
        }
        if !self.inner.core.handle_world_change(env) {
            // nothing the plan relied on changed
            return self.inner.best.clone();
        }
        // the repaired graph may no longer support the previous best
        self.inner.best = Trajectory::empty();
        let deadline = self.inner.deadline;
        let reached = self.inner.core.resume(env, deadline);
        self.inner.emit(env, reached);
        self.inner.best.clone()
    }
}

impl AnytimePlanner for Fadprm {
    fn minimum_quality(&self) -> f64 {
        self.inner.minimum_quality()
    }

    fn set_minimum_quality(&mut self, quality: f64) -> Result<()> {
        self.inner.set_minimum_quality(quality)
    }

    fn maximum_quality(&self) -> f64 {
        self.inner.maximum_quality()
    }

    fn set_maximum_quality(&mut self, quality: f64) -> Result<()> {
        self.inner.set_maximum_quality(quality)
    }

    fn quality_improvement(&self) -> f64 {
        self.inner.quality_improvement()
    }

    fn set_quality_improvement(&mut self, step: f64) -> Result<()> {
        self.inner.set_quality_improvement(step)
    }
}
