//! Heuristically biased RRT: candidate tree nodes are accepted with a
//! probability derived from their heuristic quality, steering growth
//! towards promising regions.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use skyplan_core::{
    AircraftCapabilities, CostPolicy, Environment, Position, RiskPolicy, Trajectory, WaypointId,
};

use crate::planner::{waypoints_supported, Deadline, Planner, RevisionHooks, RevisionListener};
use crate::rrt::{RrtConfig, RrtCore};

/// Variant of the quality-biased nearest selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicVariant {
    /// Accept a candidate with probability `max(quality, floor)`,
    /// re-drawing until one passes.
    #[default]
    Quality,
    /// Sharpened quality (squared) before the probability draw.
    ModifiedQuality,
    /// One probability draw per round; on rejection the best-quality
    /// candidate is taken instead of re-drawing.
    ModifiedProbability,
}

/// RRT with heuristic nearest-selection bias.
#[derive(Debug)]
pub struct HRrt {
    core: RrtCore,
    deadline: Deadline,
    revisions: RevisionHooks,
    variant: HeuristicVariant,
    /// Lower bound of the acceptance probability.
    prob_floor: f64,
    /// Number of nearest candidates considered per round.
    k_nearest: usize,
}

impl HRrt {
    pub fn new(aircraft: AircraftCapabilities, config: RrtConfig) -> Self {
        Self {
            core: RrtCore::new(aircraft, config),
            deadline: Deadline::none(),
            revisions: RevisionHooks::new(),
            variant: HeuristicVariant::default(),
            prob_floor: 0.1,
            k_nearest: 5,
        }
    }

    pub fn with_policies(mut self, cost: CostPolicy, risk: RiskPolicy) -> Self {
        self.core.cost_policy = cost;
        self.core.risk_policy = risk;
        self
    }

    pub fn with_variant(mut self, variant: HeuristicVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_bias(mut self, prob_floor: f64, k_nearest: usize) -> Self {
        self.prob_floor = prob_floor.clamp(0.0, 1.0);
        self.k_nearest = k_nearest.max(1);
        self
    }

    /// Estimated total cost through a waypoint.
    fn f(&self, id: WaypointId) -> f64 {
        let w = self.core.pool.get(id);
        w.g + w.h
    }

    /// The k nearest tree nodes to a sample.
    fn candidates(&self, env: &Environment, sample: &Position) -> Vec<WaypointId> {
        let mut ids: Vec<WaypointId> = self
            .core
            .pool
            .iter()
            .filter(|(_, w)| w.is_reached())
            .map(|(id, _)| id)
            .collect();
        ids.sort_by(|&a, &b| {
            env.normalized_distance(&self.core.pool.get(a).position, sample)
                .total_cmp(&env.normalized_distance(&self.core.pool.get(b).position, sample))
        });
        ids.truncate(self.k_nearest);
        ids
    }

    /// Quality-biased selection among the candidates.
    fn select(&mut self, candidates: &[WaypointId]) -> Option<WaypointId> {
        if candidates.is_empty() {
            return None;
        }
        let f_values: Vec<f64> = candidates.iter().map(|&id| self.f(id)).collect();
        let f_min = f_values.iter().copied().fold(f64::INFINITY, f64::min);
        let f_max = f_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = f_max - f_min;

        let quality_of = |f: f64| -> f64 {
            if span <= f64::EPSILON {
                1.0
            } else {
                1.0 - (f - f_min) / span
            }
        };

        match self.variant {
            HeuristicVariant::Quality | HeuristicVariant::ModifiedQuality => {
                // bounded redraw; the floor guarantees termination in
                // expectation, the cap guarantees it outright
                for _ in 0..32 {
                    let pick = self.core.rng.gen_range(0..candidates.len());
                    let mut q = quality_of(f_values[pick]);
                    if self.variant == HeuristicVariant::ModifiedQuality {
                        q *= q;
                    }
                    let p = q.max(self.prob_floor);
                    if self.core.rng.gen::<f64>() < p {
                        return Some(candidates[pick]);
                    }
                }
                Some(candidates[0])
            }
            HeuristicVariant::ModifiedProbability => {
                let pick = self.core.rng.gen_range(0..candidates.len());
                let p = quality_of(f_values[pick]).max(self.prob_floor);
                if self.core.rng.gen::<f64>() < p {
                    Some(candidates[pick])
                } else {
                    // fall back to the best-quality candidate
                    candidates
                        .iter()
                        .copied()
                        .min_by(|&a, &b| self.f(a).total_cmp(&self.f(b)))
                }
            }
        }
    }
}

impl Planner for HRrt {
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
            let sample = self.core.sample(env);
            let candidates = self.candidates(env, &sample);
            let Some(nearest) = self.select(&candidates) else {
                continue;
            };
            let Some(new) = self.core.extend(env, nearest, &sample) else {
                continue;
            };
            if let Some(goal) = self.core.try_finish(env, new) {
                let trajectory = self.core.trajectory(env, goal);
                self.revisions.notify(&trajectory);
                return trajectory;
            }
        }

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
