//! OFADPRM: online FADPRM — the anytime/dynamic roadmap planner coupled
//! to the aircraft datalink, shifting its start ahead of the vehicle.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use skyplan_core::{
    AircraftCapabilities, AircraftLink, CostPolicy, DesirabilityZone, Environment, Position,
    RiskPolicy, Roadmap, TrackPoint, Trajectory,
};

use crate::error::{PlannerError, Result};
use crate::faprm::{FaprmConfig, FaprmCore};
use crate::planner::{
    waypoints_supported, AnytimePlanner, Deadline, DynamicPlanner, OnlinePlanner, Planner,
    RevisionHooks, RevisionListener,
};

/// Radius of the sphere around the goal that ends the online loop, meters.
const GOAL_THRESHOLD_M: f64 = 1.0;

/// Online flexible anytime dynamic PRM.
///
/// While online, each iteration polls the datalink for the vehicle's
/// progress; once the aircraft has passed a plan waypoint, the search
/// start shifts a configurable look-ahead further along the plan and the
/// remaining trajectory is recomputed. Anytime inflation runs in the same
/// loop, and improved trajectories upload through the datalink.
pub struct Ofadprm {
    core: FaprmCore,
    deadline: Deadline,
    revisions: RevisionHooks,
    best: Trajectory,
    link: Option<Arc<dyn AircraftLink>>,
    online: bool,
    position_threshold_m: f64,
    /// How many plan waypoints ahead of the vehicle the new start lands.
    lookahead_offset: usize,
    /// Bound on online iterations per plan call.
    max_online_rounds: u32,
    aircraft_position: Option<TrackPoint>,
}

impl std::fmt::Debug for Ofadprm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ofadprm")
            .field("online", &self.online)
            .field("lookahead_offset", &self.lookahead_offset)
            .field("position_threshold_m", &self.position_threshold_m)
            .field("linked", &self.link.is_some())
            .finish()
    }
}

impl Ofadprm {
    pub fn new(aircraft: AircraftCapabilities, config: FaprmConfig) -> Self {
        Self {
            core: FaprmCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            best: Trajectory::empty(),
            link: None,
            online: false,
            position_threshold_m: 2.0,
            lookahead_offset: 3,
            max_online_rounds: 100,
            aircraft_position: None,
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

    pub fn with_link(mut self, link: Arc<dyn AircraftLink>) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_lookahead_offset(mut self, offset: usize) -> Self {
        self.lookahead_offset = offset;
        self
    }

    pub fn with_max_online_rounds(mut self, rounds: u32) -> Self {
        self.max_online_rounds = rounds;
        self
    }

    pub fn roadmap(&self) -> &Roadmap {
        &self.core.roadmap
    }

    pub fn start_position(&self) -> Option<Position> {
        self.core
            .start
            .map(|id| self.core.roadmap.pool.get(id).position)
    }

    fn emit(&mut self, env: &Environment, reached: bool) {
        if reached {
            let trajectory = self.core.trajectory(env);
            if !trajectory.is_empty() && trajectory.total_cost() < self.best.total_cost() {
                self.best = trajectory;
            }
        }
        self.revisions.notify(&self.best);
    }

    /// Re-read the vehicle position from the datalink.
    fn poll_aircraft(&mut self) {
        if let Some(link) = &self.link {
            if let Some(track) = link.aircraft_timed_position() {
                self.aircraft_position = Some(track);
            }
        }
    }

    fn inside_goal_region(&self, env: &Environment) -> bool {
        let Some(track) = &self.aircraft_position else {
            return false;
        };
        let Some(goal) = self.core.goal else {
            return false;
        };
        let goal_pos = self.core.roadmap.pool.get(goal).position;
        env.distance(&track.position, &goal_pos) < GOAL_THRESHOLD_M
    }

    /// One online revision: when the vehicle passed waypoint `i` and the
    /// plan extends past the look-ahead, shift the start to
    /// `plan[i + lookahead]` and recompute the remainder.
    fn online_revision(&mut self, env: &Environment) -> bool {
        self.poll_aircraft();
        let Some(link) = &self.link else {
            return false;
        };
        let index = link.next_waypoint_index();
        if index < 0 {
            return false;
        }
        let index = index as usize;
        let plan = self.core.plan_ids.clone();
        if index + self.lookahead_offset >= plan.len() {
            return false;
        }
        let new_start = plan[index + self.lookahead_offset];
        let position = self.core.roadmap.pool.get(new_start).position;
        self.core.update_start(env, &position);
        // the remaining plan is measured from the shifted start
        self.best = Trajectory::empty();
        true
    }
}

impl Planner for Ofadprm {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        self.core.clear_roadmap();
        self.core.init_backups(1);
        self.best = Trajectory::empty();

        self.core.initialize(env, origin, destination, etd);
        let reached = self.core.compute(env, self.deadline);
        self.emit(env, reached);

        let mut rounds = 0u32;
        loop {
            if self.deadline.expired() || rounds >= self.max_online_rounds {
                break;
            }
            rounds += 1;

            if self.online {
                let shifted = self.online_revision(env);
                if shifted {
                    let reached = self.core.compute(env, self.deadline);
                    self.emit(env, reached);
                }
            }

            if !self.core.is_inflated() {
                let reached = self.core.improve(env, self.deadline);
                self.emit(env, reached);
                if let Some(link) = &self.link {
                    if link.is_connected() && !self.best.is_empty() {
                        link.upload_flight_path(&self.best);
                    }
                }
            }

            let anytime_done = self.core.is_inflated();
            if self.online {
                if self.inside_goal_region(env) {
                    break;
                }
                // without a live vehicle there is nothing left to track
                if anytime_done && self.link.is_none() {
                    break;
                }
            } else if anytime_done {
                break;
            }
        }
        self.best.clone()
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

impl OnlinePlanner for Ofadprm {
    fn is_online(&self) -> bool {
        self.online
    }

    fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    fn position_threshold(&self) -> f64 {
        self.position_threshold_m
    }

    fn set_position_threshold(&mut self, threshold: f64) -> Result<()> {
        if threshold >= 0.0 {
            self.position_threshold_m = threshold;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "position threshold is invalid".into(),
            ))
        }
    }

    fn aircraft_timed_position(&self) -> Option<TrackPoint> {
        self.aircraft_position
    }

    fn update_start(&mut self, env: &mut Environment, position: &Position) {
        self.core.update_start(env, position);
        self.best = Trajectory::empty();
    }
}

impl DynamicPlanner for Ofadprm {
    fn world_changed(&mut self, env: &mut Environment) -> Trajectory {
        if self.core.start.is_none() {
            return Trajectory::empty();
        }
        if !self.core.handle_world_change(env) {
            return self.best.clone();
        }
        self.best = Trajectory::empty();
        let reached = self.core.resume(env, self.deadline);
        self.emit(env, reached);
        self.best.clone()
    }
}

impl AnytimePlanner for Ofadprm {
    fn minimum_quality(&self) -> f64 {
        self.core.config.initial_beta
    }

    fn set_minimum_quality(&mut self, quality: f64) -> Result<()> {
        if (0.0..=self.core.config.final_beta).contains(&quality) {
            self.core.config.initial_beta = quality;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "initial inflation is invalid".into(),
            ))
        }
    }

    fn maximum_quality(&self) -> f64 {
        self.core.config.final_beta
    }

    fn set_maximum_quality(&mut self, quality: f64) -> Result<()> {
        if (self.core.config.initial_beta..=1.0).contains(&quality) {
            self.core.config.final_beta = quality;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "final inflation is invalid".into(),
            ))
        }
    }

    fn quality_improvement(&self) -> f64 {
        self.core.config.step_beta
    }

    fn set_quality_improvement(&mut self, step: f64) -> Result<()> {
        if step > 0.0 {
            self.core.config.step_beta = step;
            Ok(())
        } else {
            Err(PlannerError::InvalidParameter(
                "inflation amount is invalid".into(),
            ))
        }
    }
}
