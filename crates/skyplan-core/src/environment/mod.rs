//! Environment variants behind one tagged sum.
//!
//! Planners declare which variants they support and match on the sum;
//! there is no runtime downcasting.

mod grid;
mod sampling;

pub use grid::{GridCell, PlanningGrid};
pub use sampling::SamplingEnvironment;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::geo::{LocalFrame, Position};
use crate::intervals::{CostInterval, IntervalTree};
use crate::obstacle::Obstacle;
use crate::policy::{CostPolicy, RiskPolicy};

/// The spatio-temporal environment a planner searches.
#[derive(Debug, Clone)]
pub enum Environment {
    Grid(PlanningGrid),
    Sampling(SamplingEnvironment),
}

impl Environment {
    pub fn is_grid(&self) -> bool {
        matches!(self, Environment::Grid(_))
    }

    pub fn is_sampling(&self) -> bool {
        matches!(self, Environment::Sampling(_))
    }

    pub fn as_grid(&self) -> Option<&PlanningGrid> {
        match self {
            Environment::Grid(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_sampling(&self) -> Option<&SamplingEnvironment> {
        match self {
            Environment::Sampling(s) => Some(s),
            _ => None,
        }
    }

    pub fn frame(&self) -> &LocalFrame {
        match self {
            Environment::Grid(g) => g.frame(),
            Environment::Sampling(s) => s.frame(),
        }
    }

    pub fn globe(&self) -> &crate::geo::Globe {
        match self {
            Environment::Grid(g) => g.globe(),
            Environment::Sampling(s) => s.globe(),
        }
    }

    pub fn set_globe(&mut self, globe: crate::geo::Globe) {
        match self {
            Environment::Grid(g) => g.set_globe(globe),
            Environment::Sampling(s) => s.set_globe(globe),
        }
    }

    /// Geographic center of the environment volume.
    pub fn center_position(&self) -> Position {
        match self {
            Environment::Grid(g) => g.center_position(),
            Environment::Sampling(s) => s.center_position(),
        }
    }

    /// Aggregated environment-wide cost over `[start, end]`.
    pub fn accumulated_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        match self {
            Environment::Grid(g) => g.accumulated_cost(start, end),
            Environment::Sampling(s) => s.accumulated_cost(start, end),
        }
    }

    /// Cost of the leg between this environment's center and another's,
    /// combining the aggregated cost of both volumes under the policies.
    pub fn leg_cost_between(
        &self,
        other: &Environment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        let own = self.accumulated_cost(start, end);
        let theirs = other.accumulated_cost(start, end);
        if !risk_policy.satisfies(own) || !risk_policy.satisfies(theirs) {
            return f64::INFINITY;
        }
        let combined = cost_policy.combine(&[1.0 + own, 1.0 + theirs]);
        self.normalized_distance(&self.center_position(), &other.center_position()) * combined
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Environment::Grid(g) => g.time(),
            Environment::Sampling(s) => s.time(),
        }
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        match self {
            Environment::Grid(g) => g.set_time(time),
            Environment::Sampling(s) => s.set_time(time),
        }
    }

    pub fn normalizer(&self) -> f64 {
        match self {
            Environment::Grid(g) => g.normalizer(),
            Environment::Sampling(s) => s.normalizer(),
        }
    }

    pub fn add_cost_interval(&mut self, interval: CostInterval) {
        match self {
            Environment::Grid(g) => g.add_cost_interval(interval),
            Environment::Sampling(s) => s.add_cost_interval(interval),
        }
    }

    pub fn remove_cost_interval(&mut self, interval: &CostInterval) -> bool {
        match self {
            Environment::Grid(g) => g.remove_cost_interval(interval),
            Environment::Sampling(s) => s.remove_cost_interval(interval),
        }
    }

    pub fn embed(&mut self, obstacle: Obstacle) -> bool {
        match self {
            Environment::Grid(g) => g.embed(obstacle),
            Environment::Sampling(s) => s.embed(obstacle),
        }
    }

    pub fn unembed(&mut self, id: &str) -> bool {
        match self {
            Environment::Grid(g) => g.unembed(id),
            Environment::Sampling(s) => s.unembed(id),
        }
    }

    pub fn unembed_all(&mut self) {
        match self {
            Environment::Grid(g) => g.unembed_all(),
            Environment::Sampling(s) => s.unembed_all(),
        }
    }

    pub fn is_embedded(&self, id: &str) -> bool {
        match self {
            Environment::Grid(g) => g.is_embedded(id),
            Environment::Sampling(s) => s.is_embedded(id),
        }
    }

    pub fn contains(&self, position: &Position) -> bool {
        match self {
            Environment::Grid(g) => g.contains(position),
            Environment::Sampling(s) => s.contains(position),
        }
    }

    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        match self {
            Environment::Grid(g) => g.distance(a, b),
            Environment::Sampling(s) => s.distance(a, b),
        }
    }

    pub fn normalized_distance(&self, a: &Position, b: &Position) -> f64 {
        match self {
            Environment::Grid(g) => g.normalized_distance(a, b),
            Environment::Sampling(s) => s.normalized_distance(a, b),
        }
    }

    /// Graph neighbors of a position; empty for the sampling environment,
    /// whose connectivity lives in the roadmap.
    pub fn neighbors(&self, position: &Position) -> Vec<Position> {
        match self {
            Environment::Grid(g) => g.neighbors(position),
            Environment::Sampling(_) => Vec::new(),
        }
    }

    pub fn are_neighbors(&self, a: &Position, b: &Position) -> bool {
        match self {
            Environment::Grid(g) => g.are_neighbors(a, b),
            Environment::Sampling(_) => false,
        }
    }

    /// Environment vertices adjacent to an off-graph position.
    pub fn adjacent_waypoints(&self, position: &Position) -> Vec<Position> {
        match self {
            Environment::Grid(g) => g.adjacent_waypoints(position),
            Environment::Sampling(_) => Vec::new(),
        }
    }

    pub fn step_cost(
        &self,
        a: &Position,
        b: &Position,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        match self {
            Environment::Grid(g) => g.step_cost(a, b, start, end, cost_policy, risk_policy),
            Environment::Sampling(s) => s.step_cost(a, b, start, end, cost_policy, risk_policy),
        }
    }

    pub fn leg_cost(
        &self,
        a: &Position,
        b: &Position,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        match self {
            Environment::Grid(g) => g.leg_cost(a, b, start, end, cost_policy, risk_policy),
            Environment::Sampling(s) => s.leg_cost(a, b, start, end, cost_policy, risk_policy),
        }
    }

    pub fn check_conflict(&self, position: &Position, clearance: f64) -> bool {
        match self {
            Environment::Grid(g) => g.check_conflict(position, clearance),
            Environment::Sampling(s) => s.check_conflict(position, clearance),
        }
    }

    pub fn check_conflict_segment(&self, a: &Position, b: &Position, clearance: f64) -> bool {
        match self {
            Environment::Grid(g) => g.check_conflict_segment(a, b, clearance),
            Environment::Sampling(s) => s.check_conflict_segment(a, b, clearance),
        }
    }

    pub fn sample_random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        match self {
            Environment::Grid(g) => g.sample_random_position(rng),
            Environment::Sampling(s) => s.sample_random_position(rng),
        }
    }

    /// Edge-local cost intervals along a segment (sampling environments);
    /// empty for grids, whose costs live in the cells.
    pub fn embed_interval_tree(&self, a: &Position, b: &Position) -> IntervalTree {
        match self {
            Environment::Grid(_) => IntervalTree::new(),
            Environment::Sampling(s) => s.embed_interval_tree(a, b),
        }
    }
}
