//! RADPRM: repair-only dynamic PRM — roadmap growth at full exploitation
//! with incremental repair on obstacle changes, no anytime cycle.

use chrono::{DateTime, Utc};

use skyplan_core::{
    AircraftCapabilities, CostPolicy, DesirabilityZone, Environment, Position, RiskPolicy, Roadmap,
    Trajectory,
};

use crate::faprm::{FaprmConfig, FaprmCore};
use crate::planner::{
    waypoints_supported, Deadline, DynamicPlanner, Planner, RevisionHooks, RevisionListener,
};

/// Repairing dynamic PRM.
///
/// Plans once at the final beta (pure best-utility-first growth) and keeps
/// the roadmap alive; obstacle changes trigger edge removal, correction
/// propagation and an incremental recompute instead of a fresh query.
#[derive(Debug)]
pub struct Radprm {
    core: FaprmCore,
    deadline: Deadline,
    revisions: RevisionHooks,
}

impl Radprm {
    pub fn new(aircraft: AircraftCapabilities, config: FaprmConfig) -> Self {
        let mut core = FaprmCore::new(aircraft, config);
        core.beta = core.config.final_beta;
        core.config.initial_beta = core.config.final_beta;
        Self {
            core,
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }

    pub fn with_zones(mut self, zones: Vec<DesirabilityZone>) -> Self {
        self.core.zones = zones;
        self
    }

    pub fn roadmap(&self) -> &Roadmap {
        &self.core.roadmap
    }
}

impl Planner for Radprm {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.core.clear_roadmap();
        self.core.init_backups(1);
        self.core.initialize(env, origin, destination, etd);
        let reached = self.core.compute(env, self.deadline);
        let trajectory = if reached {
            self.core.trajectory(env)
        } else {
            Trajectory::empty()
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

impl DynamicPlanner for Radprm {
    fn world_changed(&mut self, env: &mut Environment) -> Trajectory {
        if self.core.start.is_none() {
            return Trajectory::empty();
        }
        if !self.core.handle_world_change(env) {
            return self.core.trajectory(env);
        }
        let reached = self.core.resume(env, self.deadline);
        let trajectory = if reached {
            self.core.trajectory(env)
        } else {
            Trajectory::empty()
        };
        self.revisions.notify(&trajectory);
        trajectory
    }
}
