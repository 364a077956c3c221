//! Heuristic graph search over planning grids: Forward A* and the
//! any-angle Theta* relaxation.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use skyplan_core::{
    AircraftCapabilities, CostPolicy, Environment, Position, PrecisionPosition, RiskPolicy,
    Trajectory, WaypointId, WaypointPool,
};

use crate::planner::{
    waypoints_supported, Deadline, Planner, RevisionHooks, RevisionListener,
};
use crate::queue::{OpenQueue, SearchKey};

/// Best-first search state shared by the A* family.
///
/// The open queue re-inserts on key changes; improvements discovered on
/// already-expanded waypoints are tracked as inconsistent for the anytime
/// passes.
#[derive(Debug)]
pub(crate) struct AStarCore {
    pub aircraft: AircraftCapabilities,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,
    pub pool: WaypointPool,
    pub open: OpenQueue,
    pub closed: HashSet<WaypointId>,
    pub incons: HashSet<WaypointId>,
    pub start: Option<WaypointId>,
    pub goal: Option<WaypointId>,
    /// Heuristic inflation; 1 is plain A*.
    pub epsilon: f64,
    /// Consider the parent shortcut during relaxation (Theta*).
    pub any_angle: bool,
    goal_region: HashSet<PrecisionPosition>,
    destination: Option<Position>,
}

impl AStarCore {
    pub fn new(aircraft: AircraftCapabilities) -> Self {
        Self {
            aircraft,
            cost_policy: CostPolicy::default(),
            risk_policy: RiskPolicy::default(),
            pool: WaypointPool::new(),
            open: OpenQueue::new(),
            closed: HashSet::new(),
            incons: HashSet::new(),
            start: None,
            goal: None,
            epsilon: 1.0,
            any_angle: false,
            goal_region: HashSet::new(),
            destination: None,
        }
    }

    fn key(&self, id: WaypointId) -> SearchKey {
        let w = self.pool.get(id);
        SearchKey::new(w.g + self.epsilon * w.h, 0.0)
    }

    pub fn initialize(
        &mut self,
        env: &Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) {
        self.pool.clear();
        self.open.clear();
        self.closed.clear();
        self.incons.clear();
        self.destination = Some(*destination);

        let start = self.pool.insert(*origin);
        {
            let w = self.pool.get_mut(start);
            w.g = 0.0;
            w.cost = 0.0;
            w.eto = Some(etd);
        }
        self.pool.get_mut(start).h = env.normalized_distance(origin, destination);

        let goal = self.pool.insert(*destination);
        self.pool.get_mut(goal).h = 0.0;

        // off-graph goals are reached through their adjacent vertices
        self.goal_region = env
            .adjacent_waypoints(destination)
            .iter()
            .map(Position::precision)
            .collect();

        self.start = Some(start);
        self.goal = Some(goal);
        tracing::trace!(start = ?self.start, goal = ?self.goal, "search initialized");
        let key = self.key(start);
        self.open.insert(start, key);
    }

    /// Relax `target` through `source`; with `any_angle` the shortcut from
    /// `source`'s parent is also considered and wins only when strictly
    /// cheaper and aircraft-feasible.
    fn relax(&mut self, env: &Environment, source: WaypointId, target: WaypointId) {
        let globe = env.frame().globe;
        let source_pos = self.pool.get(source).position;
        let target_pos = self.pool.get(target).position;
        let Some(source_eto) = self.pool.get(source).eto else {
            return;
        };
        let source_g = self.pool.get(source).g;

        let mut step_g = f64::INFINITY;
        let mut step_end = None;
        if self.aircraft.is_feasible(&globe, &source_pos, &target_pos) {
            let end =
                source_eto + self.aircraft.estimated_duration(&globe, &source_pos, &target_pos);
            let step = if env.are_neighbors(&source_pos, &target_pos) {
                env.step_cost(
                    &source_pos,
                    &target_pos,
                    source_eto,
                    end,
                    self.cost_policy,
                    self.risk_policy,
                )
            } else {
                env.leg_cost(
                    &source_pos,
                    &target_pos,
                    source_eto,
                    end,
                    self.cost_policy,
                    self.risk_policy,
                )
            };
            step_g = source_g + step;
            step_end = Some(end);
        }

        let mut straight_g = f64::INFINITY;
        let mut straight_end = None;
        let mut parent = None;
        if self.any_angle {
            if let Some(p) = self.pool.get(source).parent {
                if p != target {
                    let parent_pos = self.pool.get(p).position;
                    if let Some(parent_eto) = self.pool.get(p).eto {
                        if self.aircraft.is_feasible(&globe, &parent_pos, &target_pos) {
                            let end = parent_eto
                                + self
                                    .aircraft
                                    .estimated_duration(&globe, &parent_pos, &target_pos);
                            let leg = env.leg_cost(
                                &parent_pos,
                                &target_pos,
                                parent_eto,
                                end,
                                self.cost_policy,
                                self.risk_policy,
                            );
                            straight_g = self.pool.get(p).g + leg;
                            straight_end = Some(end);
                            parent = Some(p);
                        }
                    }
                }
            }
        }

        let target_g = self.pool.get(target).g;
        if straight_g < step_g && straight_g < target_g {
            let w = self.pool.get_mut(target);
            w.parent = parent;
            w.g = straight_g;
            w.cost = straight_g;
            w.eto = straight_end;
        } else if step_g < target_g {
            let w = self.pool.get_mut(target);
            w.parent = Some(source);
            w.g = step_g;
            w.cost = step_g;
            w.eto = step_end;
        }
    }

    fn update(&mut self, env: &Environment, source: WaypointId, target: WaypointId) {
        let g_old = self.pool.get(target).g;
        self.relax(env, source, target);
        if self.pool.get(target).g < g_old {
            if let Some(destination) = self.destination {
                let h = env.normalized_distance(&self.pool.get(target).position, &destination);
                self.pool.get_mut(target).h = h;
            }
            if self.closed.contains(&target) {
                self.incons.insert(target);
            } else {
                let key = self.key(target);
                self.open.insert(target, key);
            }
        }
    }

    /// Expand until the goal pops or the queue drains.
    pub fn run_pass(&mut self, env: &Environment, deadline: Deadline) -> Option<WaypointId> {
        let goal = self.goal?;
        while let Some(source) = self.open.pop() {
            if deadline.expired() {
                return None;
            }
            if source == goal {
                return Some(goal);
            }
            self.closed.insert(source);

            let source_pos = self.pool.get(source).position;
            let mut neighbor_positions = env.neighbors(&source_pos);
            // off-graph starts attach through the surrounding vertices
            if neighbor_positions.is_empty() {
                neighbor_positions = env.adjacent_waypoints(&source_pos);
            }
            if self.goal_region.contains(&source_pos.precision()) {
                if let Some(destination) = self.destination {
                    neighbor_positions.push(destination);
                }
            }

            for neighbor in neighbor_positions {
                let target = self.pool.insert(neighbor);
                if target == source {
                    continue;
                }
                self.update(env, source, target);
            }
        }
        None
    }

    /// Carry inconsistent and queued waypoints into the next inflation
    /// pass under fresh keys.
    pub fn prepare_next_pass(&mut self) {
        self.closed.clear();
        for id in self.open.ids() {
            let key = self.key(id);
            self.open.insert(id, key);
        }
        for id in std::mem::take(&mut self.incons) {
            let key = self.key(id);
            self.open.insert(id, key);
        }
    }

    pub fn trajectory(&self, env: &Environment, reached: Option<WaypointId>) -> Trajectory {
        match reached {
            Some(goal) => Trajectory::from_chain(&self.pool, goal, |a, b| env.distance(a, b)),
            None => Trajectory::empty(),
        }
    }
}

macro_rules! grid_search_planner {
    ($name:ident, $any_angle:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name {
            core: AStarCore,
            deadline: Deadline,
            revisions: RevisionHooks,
        }

        impl $name {
            pub fn new(aircraft: AircraftCapabilities) -> Self {
                let mut core = AStarCore::new(aircraft);
                core.any_angle = $any_angle;
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

            pub fn cost_policy(&self) -> CostPolicy {
                self.core.cost_policy
            }

            pub fn risk_policy(&self) -> RiskPolicy {
                self.core.risk_policy
            }
        }

        impl Planner for $name {
            fn plan(
                &mut self,
                env: &mut Environment,
                origin: &Position,
                destination: &Position,
                etd: DateTime<Utc>,
            ) -> Trajectory {
                self.core.initialize(env, origin, destination, etd);
                let reached = self.core.run_pass(env, self.deadline);
                let trajectory = self.core.trajectory(env, reached);
                if trajectory.is_empty() {
                    tracing::debug!(planner = stringify!($name), "open queue exhausted, no plan");
                }
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
                let trajectory =
                    crate::planner::plan_via_segments(self, env, origin, destination, via, etd);
                self.revisions.notify(&trajectory);
                trajectory
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
    };
}

grid_search_planner!(
    ForwardAStar,
    false,
    "Forward A* over a planning grid: admissible straight-line heuristic, \
     optimal under uniform costs, ties broken by queue insertion order."
);

grid_search_planner!(
    ThetaStar,
    true,
    "Theta*: A* with any-angle parent shortcuts, producing paths \
     unconstrained by grid edges."
);
