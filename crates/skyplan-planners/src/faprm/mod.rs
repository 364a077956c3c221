//! Flexible anytime PRM planners: roadmap growth with density-weighted
//! priority, anytime quality inflation and online start relocation.

mod fadprm;
mod ofadprm;
mod radprm;

pub use fadprm::Fadprm;
pub use ofadprm::Ofadprm;
pub use radprm::Radprm;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use skyplan_core::{
    AircraftCapabilities, CostPolicy, DesirabilityZone, Environment, Position, RiskPolicy,
    Roadmap, Trajectory, WaypointId,
};

use crate::error::{PlannerError, Result};
use crate::planner::{
    waypoints_supported, AnytimePlanner, Deadline, Planner, RevisionHooks, RevisionListener,
};
use crate::prm::make_edge;
use crate::queue::{OpenQueue, SearchKey};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaprmConfig {
    /// Cap on waypoint expansions per computation pass.
    pub max_iter: u32,
    pub max_neighbors: usize,
    /// Connection and density radius, meters.
    pub max_distance_m: f64,
    /// Probability (percent) of goal-directed expansion sampling.
    pub bias_pct: u32,
    pub initial_beta: f64,
    pub final_beta: f64,
    pub step_beta: f64,
    /// Desirability influence on edge costs.
    pub lambda: f64,
    /// RNG seed for reproducible growth; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for FaprmConfig {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            max_neighbors: 15,
            max_distance_m: 400.0,
            bias_pct: 5,
            initial_beta: 0.0,
            final_beta: 1.0,
            step_beta: 0.1,
            lambda: 0.5,
            seed: None,
        }
    }
}

/// Shared state and operations of the FAPRM planner family.
///
/// The open queue orders waypoints by
/// `(1 - beta) / max(density, 1) + beta * f`, where `f` blends the
/// cost and goal-distance utilities; the best (largest) key expands
/// first, so low beta favors sparse regions and high beta favors
/// best-utility-first exploitation. Ties favor deeper progress.
#[derive(Debug)]
pub(crate) struct FaprmCore {
    pub aircraft: AircraftCapabilities,
    pub cost_policy: CostPolicy,
    pub risk_policy: RiskPolicy,
    pub zones: Vec<DesirabilityZone>,
    pub config: FaprmConfig,
    pub beta: f64,
    pub roadmap: Roadmap,
    pub open: OpenQueue,
    pub closed: HashSet<WaypointId>,
    pub start: Option<WaypointId>,
    pub goal: Option<WaypointId>,
    pub plan_ids: Vec<WaypointId>,
    pub rng: StdRng,
    /// Identifier of the current search, bumped on every world change.
    pub search: u32,
    /// Waypoints already folded into the neighborhood density counts.
    counted: HashSet<WaypointId>,
    backups: Vec<Roadmap>,
    backup_index: isize,
    pub improving: bool,
}

impl FaprmCore {
    pub fn new(aircraft: AircraftCapabilities, config: FaprmConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            aircraft,
            cost_policy: CostPolicy::default(),
            risk_policy: RiskPolicy::default(),
            zones: Vec::new(),
            beta: config.initial_beta,
            config,
            roadmap: Roadmap::new(),
            open: OpenQueue::new(),
            closed: HashSet::new(),
            start: None,
            goal: None,
            plan_ids: Vec::new(),
            rng,
            search: 0,
            counted: HashSet::new(),
            backups: Vec::new(),
            backup_index: -1,
            improving: false,
        }
    }

    /// Reset the roadmap and the density bookkeeping for a fresh query.
    pub fn clear_roadmap(&mut self) {
        self.roadmap.clear();
        self.counted.clear();
    }

    // ---- priority key ---------------------------------------------------

    fn utilities(&self, id: WaypointId) -> (f64, f64) {
        let w = self.roadmap.pool.get(id);
        let g_util = if w.cost.is_finite() {
            1.0 / (1.0 + w.cost)
        } else {
            0.0
        };
        let h_util = 1.0 / (1.0 + w.distance_to_goal.max(0.0));
        (g_util, h_util)
    }

    pub fn key(&self, id: WaypointId) -> SearchKey {
        let w = self.roadmap.pool.get(id);
        let (g_util, h_util) = self.utilities(id);
        let f = (g_util + h_util) / 2.0;
        let beta = w.beta;
        let k = (1.0 - beta) / (w.density.max(1) as f64) + beta * f;
        // the queue pops the smallest key, so both components negate:
        // largest combined key first, ties in favor of higher h
        SearchKey::new(-k, -h_util)
    }

    // ---- waypoint and edge creation ------------------------------------

    pub fn create_waypoint(&mut self, env: &Environment, position: Position) -> WaypointId {
        let id = self.roadmap.pool.insert(position);
        let distance_to_goal = self
            .goal
            .map(|g| env.normalized_distance(&position, &self.roadmap.pool.get(g).position));
        let search = self.search;
        let beta = self.beta;
        let w = self.roadmap.pool.get_mut(id);
        if w.eto.is_none() {
            w.eto = Some(env.time());
        }
        w.beta = beta;
        w.search = search;
        if let Some(d) = distance_to_goal {
            w.distance_to_goal = d;
            w.h = d;
        }
        id
    }

    pub fn connect(&mut self, env: &Environment, a: WaypointId, b: WaypointId) {
        if self.roadmap.has_edge(a, b) {
            return;
        }
        let edge = make_edge(&self.roadmap, env, &self.zones, self.config.lambda, a, b);
        self.roadmap.link(edge);
    }

    pub fn are_connectable(
        &self,
        env: &Environment,
        a: &Position,
        b: &Position,
        connected: usize,
    ) -> bool {
        if connected >= self.config.max_neighbors {
            return false;
        }
        if env.distance(a, b) >= self.config.max_distance_m {
            return false;
        }
        let globe = env.frame().globe;
        if !self.aircraft.is_feasible(&globe, a, b) && !self.aircraft.is_feasible(&globe, b, a) {
            return false;
        }
        !env.check_conflict_segment(a, b, self.aircraft.separation_radius_m)
    }

    // ---- sampling -------------------------------------------------------

    /// Position moved from `from` towards the goal by the connection
    /// radius; the goal itself when already closer.
    fn sample_goal_directed(&self, env: &Environment, from: &Position) -> Position {
        let goal_pos = self.roadmap.pool.get(self.goal.expect("goal set")).position;
        let frame = env.frame();
        let a = frame.to_local(from);
        let b = frame.to_local(&goal_pos);
        let delta = b - a;
        let dist = delta.norm();
        if dist < self.config.max_distance_m {
            goal_pos
        } else {
            frame.from_local(&(a + delta * (self.config.max_distance_m / dist)))
        }
    }

    /// Uniform sample in the cube of side `2 * max_distance / sqrt(3)`
    /// around `from`, so every corner stays within the connection radius.
    fn sample_cube(&mut self, env: &Environment, from: &Position) -> Position {
        let half = self.config.max_distance_m / 3.0_f64.sqrt();
        let frame = env.frame();
        let a = frame.to_local(from);
        let p = nalgebra::Point3::new(
            a.x + self.rng.gen_range(-half..=half),
            a.y + self.rng.gen_range(-half..=half),
            a.z + self.rng.gen_range(-half..=half),
        );
        frame.from_local(&p)
    }

    /// Biased sample around `source`, rejecting positions below the globe
    /// surface, outside the environment, in conflict, or unreachable.
    pub fn sample_biased(&mut self, env: &Environment, source: WaypointId) -> Option<Position> {
        let source_pos = self.roadmap.pool.get(source).position;
        let clearance = self.aircraft.separation_radius_m;
        let globe = env.frame().globe;

        for _ in 0..50 {
            let draw: u32 = self.rng.gen_range(1..100);
            let position = if draw <= self.config.bias_pct {
                self.sample_goal_directed(env, &source_pos)
            } else {
                self.sample_cube(env, &source_pos)
            };

            if globe.is_below_surface(&position)
                || !env.contains(&position)
                || env.check_conflict(&position, clearance)
                || env.check_conflict_segment(&source_pos, &position, clearance)
                || !self.aircraft.is_feasible(&globe, &source_pos, &position)
            {
                continue;
            }
            return Some(position);
        }
        None
    }

    // ---- growth ---------------------------------------------------------

    /// Sample a new waypoint around `source` and wire it into the roadmap.
    pub fn expand(&mut self, env: &Environment, source: WaypointId) -> Option<WaypointId> {
        let position = self.sample_biased(env, source)?;
        let new = self.create_waypoint(env, position);
        self.connect(env, source, new);

        let mut connected = 1usize;
        let new_pos = self.roadmap.pool.get(new).position;
        for candidate in self.roadmap.sort_nearest(env, &new_pos) {
            if candidate == new || candidate == source {
                continue;
            }
            let candidate_pos = self.roadmap.pool.get(candidate).position;
            if env.distance(&new_pos, &candidate_pos) >= self.config.max_distance_m {
                break;
            }
            if self.are_connectable(env, &candidate_pos, &new_pos, connected) {
                self.connect(env, candidate, new);
                connected += 1;
            }
        }
        Some(new)
    }

    /// Recount the neighborhood density around a waypoint and refresh the
    /// open-queue keys that depend on it. A waypoint contributes to its
    /// neighbors' counts exactly once, no matter how often it reappears as
    /// a successor.
    pub fn update_density(&mut self, env: &Environment, new: WaypointId) {
        let first_count = self.counted.insert(new);
        let position = self.roadmap.pool.get(new).position;
        let mut density = 0u32;
        let ids: Vec<WaypointId> = self.roadmap.pool.ids().collect();
        for id in ids {
            if id == new {
                continue;
            }
            let other = self.roadmap.pool.get(id).position;
            if env.distance(&position, &other) < self.config.max_distance_m {
                density += 1;
                if first_count {
                    self.roadmap.pool.get_mut(id).density += 1;
                }
            }
        }
        self.roadmap.pool.get_mut(new).density = density;

        for id in self.open.ids() {
            let key = self.key(id);
            self.open.insert(id, key);
        }
    }

    /// Relax `target` through `source` on the consistent cost dimension.
    pub fn compute_cost(&mut self, env: &Environment, source: WaypointId, target: WaypointId) {
        if source == target {
            return;
        }
        let source_w = self.roadmap.pool.get(source);
        if !source_w.cost.is_finite() {
            return;
        }
        let source_pos = source_w.position;
        let source_cost = source_w.cost;
        let Some(source_eto) = source_w.eto else {
            return;
        };
        let target_pos = self.roadmap.pool.get(target).position;

        let globe = env.frame().globe;
        if !self.aircraft.is_feasible(&globe, &source_pos, &target_pos) {
            return;
        }
        let end = source_eto
            + self
                .aircraft
                .estimated_duration(&globe, &source_pos, &target_pos);
        let base = env.step_cost(
            &source_pos,
            &target_pos,
            source_eto,
            end,
            self.cost_policy,
            self.risk_policy,
        );
        let step = match self.roadmap.edge_between(source, target) {
            Some(edge) => edge.blended_cost(base),
            None => base,
        };
        if !step.is_finite() {
            return;
        }

        if source_cost + step < self.roadmap.pool.get(target).cost {
            let search = self.search;
            let w = self.roadmap.pool.get_mut(target);
            w.cost = source_cost + step;
            w.g = w.cost;
            w.eto = Some(end);
            w.parent = Some(source);
            w.search = search;
        }
    }

    /// Recompute the costs of `source`'s neighbors and re-queue the ones
    /// not yet expanded.
    pub fn update_neighbors(&mut self, env: &Environment, source: WaypointId) {
        if Some(source) == self.goal {
            return;
        }
        let neighbors = self.roadmap.pool.get(source).neighbors.clone();
        for waypoint in neighbors {
            if Some(waypoint) == self.start {
                continue;
            }
            let inner: Vec<WaypointId> = self.roadmap.pool.get(waypoint).neighbors.clone();
            for aux in inner {
                if Some(aux) == self.goal {
                    continue;
                }
                self.compute_cost(env, aux, waypoint);
            }
            if !self.closed.contains(&waypoint) {
                let key = self.key(waypoint);
                self.open.insert(waypoint, key);
            }
        }
    }

    /// Attempt a direct connection from `source` to the goal.
    pub fn connect_to_goal(&mut self, env: &Environment, source: WaypointId) -> bool {
        let goal = self.goal.expect("goal set");
        let source_pos = self.roadmap.pool.get(source).position;
        let goal_pos = self.roadmap.pool.get(goal).position;
        if self.are_connectable(env, &source_pos, &goal_pos, 0) {
            self.connect(env, source, goal);
            true
        } else {
            false
        }
    }

    /// Main loop: expand the best waypoint until the goal pops, the
    /// expansion budget drains, or the deadline fires.
    pub fn compute_or_improve(&mut self, env: &Environment, deadline: Deadline) -> bool {
        let goal = self.goal.expect("goal set");
        let mut expansions = 0u32;

        while let Some(source) = self.open.pop() {
            if deadline.expired() {
                return false;
            }
            if source == goal {
                self.connect_plan(env);
                return true;
            }
            expansions += 1;
            if expansions > self.config.max_iter {
                tracing::debug!(expansions, "expansion budget exhausted");
                return false;
            }

            let successor = if self.connect_to_goal(env, source) {
                goal
            } else {
                match self.expand(env, source) {
                    Some(new) => new,
                    None => {
                        self.closed.insert(source);
                        continue;
                    }
                }
            };

            self.update_density(env, successor);
            self.update_neighbors(env, source);
            self.open.remove(source);
            self.closed.insert(source);
        }
        false
    }

    /// Record the plan chain and annotate its waypoints with distance-to-go
    /// and time-to-go.
    fn connect_plan(&mut self, env: &Environment) {
        let goal = self.goal.expect("goal set");
        self.plan_ids = self.roadmap.pool.chain_to_root(goal).unwrap_or_default();

        let final_eto = self
            .plan_ids
            .last()
            .and_then(|&id| self.roadmap.pool.get(id).eto);
        let mut dtg = 0.0;
        for i in (0..self.plan_ids.len()).rev() {
            if i + 1 < self.plan_ids.len() {
                let a = self.roadmap.pool.get(self.plan_ids[i]).position;
                let b = self.roadmap.pool.get(self.plan_ids[i + 1]).position;
                dtg += env.distance(&a, &b);
            }
            let id = self.plan_ids[i];
            let eto = self.roadmap.pool.get(id).eto;
            let w = self.roadmap.pool.get_mut(id);
            w.dtg = dtg;
            w.ttg = match (eto, final_eto) {
                (Some(eto), Some(last)) => Some(last - eto),
                _ => None,
            };
        }
    }

    pub fn trajectory(&self, env: &Environment) -> Trajectory {
        match (self.goal, self.plan_ids.is_empty()) {
            (Some(goal), false) => {
                Trajectory::from_chain(&self.roadmap.pool, goal, |a, b| env.distance(a, b))
            }
            _ => Trajectory::empty(),
        }
    }

    // ---- query lifecycle ------------------------------------------------

    pub fn initialize(
        &mut self,
        env: &Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) {
        self.backup_index += 1;
        if self.improving {
            self.restore();
        } else {
            self.beta = self.config.initial_beta;
        }
        self.open.clear();
        self.closed.clear();
        self.plan_ids.clear();

        let goal = self.roadmap.pool.insert(*destination);
        self.goal = Some(goal);
        {
            let beta = self.beta;
            let w = self.roadmap.pool.get_mut(goal);
            w.distance_to_goal = 0.0;
            w.h = 0.0;
            w.beta = beta;
        }

        let start = self.create_waypoint(env, *origin);
        self.start = Some(start);
        let start_dtg = env.normalized_distance(origin, destination);
        {
            let w = self.roadmap.pool.get_mut(start);
            w.cost = 0.0;
            w.g = 0.0;
            w.eto = Some(etd);
            w.distance_to_goal = start_dtg;
            w.h = start_dtg;
        }

        self.update_density(env, goal);
        self.update_density(env, start);

        let key = self.key(start);
        self.open.insert(start, key);
    }

    /// One computation pass from the current start.
    pub fn compute(&mut self, env: &Environment, deadline: Deadline) -> bool {
        self.open.clear();
        self.closed.clear();
        if let Some(start) = self.start {
            let key = self.key(start);
            self.open.insert(start, key);
        }
        self.compute_or_improve(env, deadline)
    }

    pub fn inflate(&mut self) {
        self.beta = (self.beta + self.config.step_beta).min(self.config.final_beta);
    }

    pub fn is_inflated(&self) -> bool {
        self.beta >= self.config.final_beta
    }

    /// Raise beta, propagate it to every waypoint and recompute from the
    /// start.
    pub fn improve(&mut self, env: &Environment, deadline: Deadline) -> bool {
        self.inflate();
        let beta = self.beta;
        let ids: Vec<WaypointId> = self.roadmap.pool.ids().collect();
        for id in ids {
            self.roadmap.pool.get_mut(id).beta = beta;
        }
        self.compute(env, deadline)
    }

    // ---- online start relocation ---------------------------------------

    /// Shift the search start: every cost and parent resets, a fresh start
    /// waypoint reconnects to its nearest neighbors, and the search
    /// resumes from it.
    pub fn update_start(&mut self, env: &Environment, position: &Position) {
        self.open.clear();
        self.plan_ids.clear();
        self.closed.clear();

        let ids: Vec<WaypointId> = self.roadmap.pool.ids().collect();
        for id in ids {
            let w = self.roadmap.pool.get_mut(id);
            w.cost = f64::INFINITY;
            w.g = f64::INFINITY;
            w.parent = None;
        }

        let start = self.create_waypoint(env, *position);
        self.start = Some(start);
        let goal_pos = self.roadmap.pool.get(self.goal.expect("goal set")).position;
        let dtg = env.normalized_distance(position, &goal_pos);
        {
            let time = env.time();
            let w = self.roadmap.pool.get_mut(start);
            w.cost = 0.0;
            w.g = 0.0;
            w.eto = Some(time);
            w.distance_to_goal = dtg;
            w.h = dtg;
        }

        let mut connected = 0usize;
        let start_pos = self.roadmap.pool.get(start).position;
        for candidate in self.roadmap.sort_nearest(env, &start_pos) {
            if candidate == start {
                continue;
            }
            let candidate_pos = self.roadmap.pool.get(candidate).position;
            if self.are_connectable(env, &candidate_pos, &start_pos, connected) {
                self.connect(env, candidate, start);
                connected += 1;
            }
        }

        if let Some(goal) = self.goal {
            let w = self.roadmap.pool.get_mut(goal);
            w.cost = f64::INFINITY;
            w.g = f64::INFINITY;
            w.parent = None;
        }

        let key = self.key(start);
        self.open.insert(start, key);
    }

    // ---- repair ---------------------------------------------------------

    /// Cascade invalidation over descendants of the seed waypoints,
    /// recomputing from neighbors and re-queuing repaired entries.
    pub fn propagate_corrections(&mut self, env: &Environment, seeds: Vec<WaypointId>) {
        let mut worklist = seeds;
        while let Some(waypoint) = worklist.pop() {
            let children: Vec<WaypointId> = self
                .roadmap
                .pool
                .iter()
                .filter(|(_, w)| w.parent == Some(waypoint))
                .map(|(id, _)| id)
                .collect();
            for child in children {
                {
                    let w = self.roadmap.pool.get_mut(child);
                    w.parent = None;
                    w.cost = f64::INFINITY;
                    w.g = f64::INFINITY;
                }
                let neighbors = self.roadmap.pool.get(child).neighbors.clone();
                for neighbor in neighbors {
                    if Some(neighbor) == self.goal {
                        continue;
                    }
                    if !self.roadmap.pool.get(neighbor).cost.is_finite() {
                        continue;
                    }
                    self.compute_cost(env, neighbor, child);
                }
                if !self.closed.contains(&child) {
                    let key = self.key(child);
                    self.open.insert(child, key);
                }
                worklist.push(child);
            }
        }
    }

    /// Resume the search after a repair without discarding the queued
    /// repair seeds.
    pub fn resume(&mut self, env: &Environment, deadline: Deadline) -> bool {
        if let Some(start) = self.start {
            if !self.open.contains(start) && !self.closed.contains(&start) {
                let key = self.key(start);
                self.open.insert(start, key);
            }
        }
        self.compute_or_improve(env, deadline)
    }

    /// Remove edges now in conflict and invalidate the plan fragments that
    /// relied on them. Returns true when any part of the graph was
    /// invalidated.
    pub fn handle_world_change(&mut self, env: &Environment) -> bool {
        self.search += 1;
        let clearance = self.aircraft.separation_radius_m;

        let conflicted: Vec<(WaypointId, WaypointId)> = self
            .roadmap
            .edges()
            .filter(|e| {
                let a = self.roadmap.pool.get(e.from).position;
                let b = self.roadmap.pool.get(e.to).position;
                env.check_conflict_segment(&a, &b, clearance)
            })
            .map(|e| (e.from, e.to))
            .collect();

        let mut seeds = Vec::new();
        for (a, b) in conflicted {
            self.roadmap.unlink(a, b);
            if self.roadmap.pool.get(a).parent == Some(b) {
                let w = self.roadmap.pool.get_mut(a);
                w.parent = None;
                w.cost = f64::INFINITY;
                w.g = f64::INFINITY;
                seeds.push(a);
            }
            if self.roadmap.pool.get(b).parent == Some(a) {
                let w = self.roadmap.pool.get_mut(b);
                w.parent = None;
                w.cost = f64::INFINITY;
                w.g = f64::INFINITY;
                seeds.push(b);
            }
        }
        if seeds.is_empty() {
            return false;
        }
        tracing::debug!(invalidated = seeds.len(), search = self.search, "repairing after world change");

        for &seed in &seeds {
            let neighbors = self.roadmap.pool.get(seed).neighbors.clone();
            for neighbor in neighbors {
                if Some(neighbor) == self.goal {
                    continue;
                }
                if !self.roadmap.pool.get(neighbor).cost.is_finite() {
                    continue;
                }
                self.compute_cost(env, neighbor, seed);
            }
            if !self.closed.contains(&seed) {
                let key = self.key(seed);
                self.open.insert(seed, key);
            }
        }
        self.propagate_corrections(env, seeds);
        self.plan_ids.clear();
        true
    }

    // ---- anytime backups for multi-segment plans ------------------------

    pub fn init_backups(&mut self, size: usize) {
        self.backups = vec![Roadmap::new(); size];
        self.backup_index = -1;
    }

    pub fn reset_backup_cursor(&mut self) {
        self.backup_index = -1;
    }

    /// Snapshot the roadmap of the finished segment; ids are stable in the
    /// copy, so parent links need no rewiring.
    pub fn backup(&mut self) {
        let index = self.backup_index;
        if index >= 0 && (index as usize) < self.backups.len() {
            self.backups[index as usize] = self.roadmap.clone();
            self.roadmap.clear();
            self.counted.clear();
        }
    }

    pub fn restore(&mut self) {
        let index = self.backup_index;
        if index >= 0 && (index as usize) < self.backups.len() {
            self.roadmap = self.backups[index as usize].clone();
            // restored waypoints were counted before the backup
            self.counted = self.roadmap.pool.ids().collect();
            let beta = self.beta;
            let ids: Vec<WaypointId> = self.roadmap.pool.ids().collect();
            for id in ids {
                self.roadmap.pool.get_mut(id).beta = beta;
            }
        }
    }
}

/// Flexible anytime PRM planner.
///
/// Grows a roadmap guided by the density/quality priority, emits the first
/// trajectory quickly, then repeatedly raises beta and recomputes,
/// publishing the best-known trajectory after each pass.
#[derive(Debug)]
pub struct Faprm {
    pub(crate) core: FaprmCore,
    pub(crate) deadline: Deadline,
    pub(crate) revisions: RevisionHooks,
    pub(crate) best: Trajectory,
}

impl Faprm {
    pub fn new(aircraft: AircraftCapabilities, config: FaprmConfig) -> Self {
        Self {
            core: FaprmCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            best: Trajectory::empty(),
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

    /// Keep and publish the better of the current and previous passes, so
    /// emitted trajectories never regress.
    pub(crate) fn emit(&mut self, env: &Environment, reached: bool) {
        if reached {
            let trajectory = self.core.trajectory(env);
            if !trajectory.is_empty() && trajectory.total_cost() < self.best.total_cost() {
                self.best = trajectory;
            }
        }
        self.revisions.notify(&self.best);
    }
}

impl Planner for Faprm {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory {
        // a repeated invocation starts from a fresh roadmap
        self.core.clear_roadmap();
        self.core.init_backups(1);
        self.best = Trajectory::empty();

        self.core.initialize(env, origin, destination, etd);
        let reached = self.core.compute(env, self.deadline);
        self.emit(env, reached);

        while !self.core.is_inflated() && !self.deadline.expired() {
            let reached = self.core.improve(env, self.deadline);
            tracing::debug!(beta = self.core.beta, cost = self.best.total_cost(), "inflation pass");
            self.emit(env, reached);
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
        self.core.clear_roadmap();
        self.core.init_backups(via.len() + 1);
        self.best = Trajectory::empty();

        let mut trajectory = one_time_plan(
            &mut self.core,
            env,
            origin,
            destination,
            via,
            etd,
            self.deadline,
        );
        self.revisions.notify(&trajectory);

        self.core.improving = true;
        while !self.core.is_inflated() && !self.deadline.expired() {
            self.core.inflate();
            self.core.reset_backup_cursor();
            let improved = one_time_plan(
                &mut self.core,
                env,
                origin,
                destination,
                via,
                etd,
                self.deadline,
            );
            if !improved.is_empty()
                && (trajectory.is_empty() || improved.total_cost() <= trajectory.total_cost())
            {
                trajectory = improved;
            }
            self.revisions.notify(&trajectory);
        }
        self.core.improving = false;
        trajectory
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

impl AnytimePlanner for Faprm {
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

/// Plan across the via positions once at the current beta, backing up the
/// per-segment roadmaps for later inflation passes.
pub(crate) fn one_time_plan(
    core: &mut FaprmCore,
    env: &Environment,
    origin: &Position,
    destination: &Position,
    via: &[Position],
    etd: DateTime<Utc>,
    deadline: Deadline,
) -> Trajectory {
    let mut parts: Vec<Trajectory> = Vec::new();
    let mut current_origin = *origin;
    let mut current_etd = etd;

    let mut destinations: Vec<Position> = via.to_vec();
    destinations.push(*destination);

    for current_destination in destinations {
        if current_origin.precision() == current_destination.precision() {
            continue;
        }
        core.initialize(env, &current_origin, &current_destination, current_etd);
        let reached = core.compute(env, deadline);
        let part = if reached {
            core.trajectory(env)
        } else {
            Trajectory::empty()
        };
        core.backup();
        if part.is_empty() {
            return Trajectory::empty();
        }
        if let Some(last) = part.last() {
            current_origin = last.position;
            if let Some(eto) = last.eto {
                current_etd = eto;
            }
        }
        parts.push(part);
    }

    crate::planner::concatenate_trajectories(parts, |a, b| env.distance(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OpenQueue;

    fn core_with_two_waypoints(
        beta: f64,
        a: (f64, f64, u32),
        b: (f64, f64, u32),
    ) -> (FaprmCore, WaypointId, WaypointId) {
        let mut core = FaprmCore::new(AircraftCapabilities::default(), FaprmConfig::default());
        let wa = core.roadmap.pool.insert(Position::new(0.0, 0.0, 0.0));
        let wb = core.roadmap.pool.insert(Position::new(0.0, 0.0, 100.0));
        for (id, (cost, dist, density)) in [(wa, a), (wb, b)] {
            let w = core.roadmap.pool.get_mut(id);
            w.cost = cost;
            w.distance_to_goal = dist;
            w.density = density;
            w.beta = beta;
        }
        (core, wa, wb)
    }

    fn pops_first(core: &FaprmCore, a: WaypointId, b: WaypointId) -> WaypointId {
        let mut open = OpenQueue::new();
        open.insert(a, core.key(a));
        open.insert(b, core.key(b));
        open.pop().unwrap()
    }

    #[test]
    fn exploitation_orders_by_utility_at_full_beta() {
        // equal densities; the cheaper, closer waypoint expands first,
        // matching best-first order under the same f
        let (core, good, bad) = core_with_two_waypoints(
            1.0,
            (1.0, 0.1, 4),
            (3.0, 0.8, 4),
        );
        assert_eq!(pops_first(&core, good, bad), good);
    }

    #[test]
    fn exploration_prefers_sparse_regions_at_zero_beta() {
        // the sparse waypoint wins even though it is costlier and further
        let (core, sparse, dense) = core_with_two_waypoints(
            0.0,
            (5.0, 0.9, 1),
            (1.0, 0.1, 9),
        );
        assert_eq!(pops_first(&core, sparse, dense), sparse);
    }

    #[test]
    fn ties_break_towards_deeper_progress() {
        // identical keys apart from the goal distance: the deeper one wins
        let (core, deep, shallow) = core_with_two_waypoints(
            0.0,
            (1.0, 0.1, 3),
            (1.0, 0.9, 3),
        );
        assert_eq!(pops_first(&core, deep, shallow), deep);
    }
}
