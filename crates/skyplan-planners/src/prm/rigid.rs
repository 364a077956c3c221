//! Rigid PRM: the sampled roadmap is built once and reused verbatim
//! across queries; only start and goal attachments change.

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};

use skyplan_core::{
    AircraftCapabilities, CostPolicy, DesirabilityZone, Environment, Position, RiskPolicy, Roadmap,
    Trajectory,
};

use crate::planner::{waypoints_supported, Deadline, Planner, RevisionHooks, RevisionListener};
use crate::prm::{construct_roadmap, roadmap_query, PrmConfig};

#[derive(Debug)]
pub struct RigidPrm {
    aircraft: AircraftCapabilities,
    cost_policy: CostPolicy,
    risk_policy: RiskPolicy,
    config: PrmConfig,
    zones: Vec<DesirabilityZone>,
    roadmap: Roadmap,
    rng: StdRng,
    deadline: Deadline,
    revisions: RevisionHooks,
    constructed: bool,
}

impl RigidPrm {
    pub fn new(aircraft: AircraftCapabilities, config: PrmConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            aircraft,
            cost_policy: CostPolicy::default(),
            risk_policy: RiskPolicy::default(),
            config,
            zones: Vec::new(),
            roadmap: Roadmap::new(),
            rng,
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            constructed: false,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.cost_policy = cost;
        self.risk_policy = risk;
        self
    }

    pub fn with_zones(mut self, zones: Vec<DesirabilityZone>) -> Self {
        self.zones = zones;
        self
    }

    pub fn roadmap(&self) -> &Roadmap {
        &self.roadmap
    }
}

impl Planner for RigidPrm {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        if !self.constructed {
            construct_roadmap(
                &mut self.roadmap,
                env,
                &self.aircraft,
                &self.zones,
                &self.config,
                &mut self.rng,
                true,
            );
            self.constructed = true;
        }
        let trajectory = roadmap_query(
            &mut self.roadmap,
            env,
            &self.aircraft,
            &self.zones,
            &self.config,
            self.cost_policy,
            self.risk_policy,
            origin,
            destination,
            etd,
            false,
            self.deadline,
        );
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
        waypoints_supported(env, &self.aircraft, waypoints)
    }

    fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = deadline;
    }

    fn add_revision_listener(&mut self, listener: RevisionListener) {
        self.revisions.subscribe(listener);
    }
}
