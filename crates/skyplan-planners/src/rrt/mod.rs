//! Rapidly-exploring random trees and their heuristic, anytime and
//! dynamic variants.

mod arrt;
mod dynamic;
mod hrrt;
mod star;

pub use arrt::ARrt;
pub use dynamic::{ADrrt, Drrt};
pub use hrrt::{HRrt, HeuristicVariant};
pub use star::RrtStar;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use skyplan_core::{
    AircraftCapabilities, CostPolicy, Environment, Position, RiskPolicy, Trajectory, WaypointId,
    WaypointPool,
};

use crate::planner::{waypoints_supported, Deadline, Planner, RevisionHooks, RevisionListener};

/// How an extension reacts when the sample is further than one step away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Take a single step towards the sample.
    #[default]
    Extend,
    /// Keep stepping until the sample is reached or the step is blocked.
    Connect,
}

/// How candidate steps are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extension {
    /// Geometric steps only.
    #[default]
    Linear,
    /// Steps must also be aircraft-feasible.
    Feasible,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrtConfig {
    pub max_iter: u32,
    /// Probability (percent) of sampling the goal directly.
    pub bias_pct: u32,
    /// Extension step length, meters.
    pub epsilon_m: f64,
    /// Radius around the goal that counts as reaching it, meters.
    pub goal_threshold_m: f64,
    pub strategy: Strategy,
    pub extension: Extension,
    /// RNG seed for reproducible runs; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for RrtConfig {
    fn default() -> Self {
        Self {
            max_iter: 3000,
            bias_pct: 5,
            epsilon_m: 50.0,
            goal_threshold_m: 50.0,
            strategy: Strategy::Extend,
            extension: Extension::Linear,
            seed: None,
        }
    }
}

/// Tree state and growth operations shared by the RRT variants.
#[derive(Debug)]
pub(crate) struct RrtCore {
    pub aircraft: AircraftCapabilities,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,
    pub config: RrtConfig,
    pub pool: WaypointPool,
    pub root: Option<WaypointId>,
    pub goal_position: Option<Position>,
    pub rng: StdRng,
}

impl RrtCore {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            aircraft,
            cost_policy: CostPolicy::default(),
            risk_policy: RiskPolicy::default(),
            config,
            pool: WaypointPool::new(),
            root: None,
            goal_position: None,
            rng,
        }
    }

    pub fn reset(&mut self, env: &Environment, origin: &Position, destination: &Position, etd: DateTime<Utc>) {
        self.pool.clear();
        self.goal_position = Some(*destination);
        let root = self.pool.insert(*origin);
        {
            let w = self.pool.get_mut(root);
            w.g = 0.0;
            w.cost = 0.0;
            w.eto = Some(etd);
        }
        self.pool.get_mut(root).h = env.normalized_distance(origin, destination);
        self.root = Some(root);
    }

    /// Goal-biased sample.
    pub fn sample(&mut self, env: &Environment) -> Position {
        let goal = self.goal_position.expect("initialized");
        if self.rng.gen_range(0..100) < self.config.bias_pct {
            goal
        } else {
            env.sample_random_position(&mut self.rng)
        }
    }

    /// Waypoint of the tree nearest to a position by normalized distance.
    pub fn nearest(&self, env: &Environment, position: &Position) -> Option<WaypointId> {
        self.pool
            .iter()
            .filter(|(_, w)| w.is_reached())
            .min_by(|(_, a), (_, b)| {
                env.normalized_distance(&a.position, position)
                    .total_cmp(&env.normalized_distance(&b.position, position))
            })
            .map(|(id, _)| id)
    }

    /// Position one step from `from` towards `toward`, clamped to the step
    /// length.
    pub fn steer(&self, env: &Environment, from: &Position, toward: &Position) -> Position {
        let frame = env.frame();
        let a = frame.to_local(from);
        let b = frame.to_local(toward);
        let delta = b - a;
        let dist = delta.norm();
        if dist <= self.config.epsilon_m || dist <= f64::EPSILON {
            *toward
        } else {
            frame.from_local(&(a + delta * (self.config.epsilon_m / dist)))
        }
    }

    /// Validate and attach one step from `from` towards `sample`.
    pub fn extend_once(
        &mut self,
        env: &Environment,
        from: WaypointId,
        sample: &Position,
    ) -> Option<WaypointId> {
        let from_pos = self.pool.get(from).position;
        let new_pos = self.steer(env, &from_pos, sample);
        let clearance = self.aircraft.separation_radius_m;

        if !env.contains(&new_pos)
            || env.frame().globe.is_below_surface(&new_pos)
            || env.check_conflict(&new_pos, clearance)
            || env.check_conflict_segment(&from_pos, &new_pos, clearance)
        {
            return None;
        }
        if self.config.extension == Extension::Feasible
            && !self
                .aircraft
                .is_feasible(&env.frame().globe, &from_pos, &new_pos)
        {
            return None;
        }

        let from_eto = self.pool.get(from).eto?;
        let from_g = self.pool.get(from).g;
        let end = from_eto
            + self
                .aircraft
                .estimated_duration(&env.frame().globe, &from_pos, &new_pos);
        let step = env.leg_cost(
            &from_pos,
            &new_pos,
            from_eto,
            end,
            self.cost_policy,
            self.risk_policy,
        );
        if !step.is_finite() {
            return None;
        }

        let goal = self.goal_position.expect("initialized");
        let new = self.pool.insert(new_pos);
        let h = env.normalized_distance(&new_pos, &goal);
        let w = self.pool.get_mut(new);
        if from_g + step < w.g {
            w.parent = Some(from);
            w.g = from_g + step;
            w.cost = from_g + step;
            w.eto = Some(end);
        }
        w.h = h;
        Some(new)
    }

    /// Extend per the configured strategy, returning the furthest new
    /// waypoint, if any.
    pub fn extend(
        &mut self,
        env: &Environment,
        nearest: WaypointId,
        sample: &Position,
    ) -> Option<WaypointId> {
        match self.config.strategy {
            Strategy::Extend => self.extend_once(env, nearest, sample),
            Strategy::Connect => {
                let mut current = nearest;
                let mut added = None;
                loop {
                    match self.extend_once(env, current, sample) {
                        Some(new) => {
                            let reached =
                                self.pool.get(new).position.precision() == sample.precision();
                            added = Some(new);
                            current = new;
                            if reached {
                                return added;
                            }
                        }
                        None => return added,
                    }
                }
            }
        }
    }

    /// Close the plan when `from` is within the goal threshold: attach the
    /// goal waypoint through a validated final leg.
    pub fn try_finish(&mut self, env: &Environment, from: WaypointId) -> Option<WaypointId> {
        let goal = self.goal_position.expect("initialized");
        let from_pos = self.pool.get(from).position;
        if env.distance(&from_pos, &goal) >= self.config.goal_threshold_m {
            return None;
        }
        let clearance = self.aircraft.separation_radius_m;
        if env.check_conflict_segment(&from_pos, &goal, clearance) {
            return None;
        }
        if self.config.extension == Extension::Feasible
            && !self.aircraft.is_feasible(&env.frame().globe, &from_pos, &goal)
        {
            return None;
        }

        let from_eto = self.pool.get(from).eto?;
        let from_g = self.pool.get(from).g;
        let end = from_eto
            + self
                .aircraft
                .estimated_duration(&env.frame().globe, &from_pos, &goal);
        let step = env.leg_cost(
            &from_pos,
            &goal,
            from_eto,
            end,
            self.cost_policy,
            self.risk_policy,
        );
        if !step.is_finite() {
            return None;
        }

        let goal_id = self.pool.insert(goal);
        let w = self.pool.get_mut(goal_id);
        if from_g + step < w.g {
            w.parent = Some(from);
            w.g = from_g + step;
            w.cost = from_g + step;
            w.eto = Some(end);
            w.h = 0.0;
        }
        Some(goal_id)
    }

    pub fn trajectory(&self, env: &Environment, goal: WaypointId) -> Trajectory {
        Trajectory::from_chain(&self.pool, goal, |a, b| env.distance(a, b))
    }

    /// One basic growth round; returns the goal id when the plan closed.
    pub fn grow_round(&mut self, env: &Environment) -> Option<WaypointId> {
        let sample = self.sample(env);
        let nearest = self.nearest(env, &sample)?;
        let new = self.extend(env, nearest, &sample)?;
        self.try_finish(env, new)
    }
}

/// Basic rapidly-exploring random tree planner over a sampling environment.
#[derive(Debug)]
pub struct Rrt {
    pub(crate) core: RrtCore,
    pub(crate) deadline: Deadline,
    pub(crate) revisions: RevisionHooks,
}

impl Rrt {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        Self {
            core: RrtCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }
}

impl Planner for Rrt {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.core.reset(env, origin, destination, etd);

        for _ in 0..self.core.config.max_iter {
            if self.deadline.expired() {
                break;
            }
            if let Some(goal) = self.core.grow_round(env) {
                let trajectory = self.core.trajectory(env, goal);
                self.revisions.notify(&trajectory);
                return trajectory;
            }
        }

        tracing::debug!(
            iterations = self.core.config.max_iter,
            tree = self.core.pool.len(),
            "tree never reached the goal region"
        );
        let empty = Trajectory::empty();
        self.revisions.notify(&empty);
        empty
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
