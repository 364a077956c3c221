//! Continuous sampling environment: an oriented box with obstacle volumes,
//! random position sampling and segment conflict checks.

use chrono::{DateTime, Utc};
use nalgebra::Point3;
use rand::Rng;
use std::collections::{HashMap, HashSet};

use crate::geo::{LocalFrame, Position};
use crate::geom::{AxisBox, LineSegment};
use crate::intervals::{CostInterval, IntervalTree};
use crate::obstacle::Obstacle;
use crate::policy::{CostPolicy, RiskPolicy};

/// Continuous box environment for the sampling-based planners.
#[derive(Debug, Clone)]
pub struct SamplingEnvironment {
    frame: LocalFrame,
    time: DateTime<Utc>,
    bounds: AxisBox,
    normalizer: f64,
    intervals: IntervalTree,
    obstacles: HashMap<String, Obstacle>,
}

impl SamplingEnvironment {
    pub fn new(frame: LocalFrame, bounds: AxisBox, time: DateTime<Utc>) -> Self {
        Self {
            frame,
            time,
            normalizer: bounds.longest_edge(),
            bounds,
            intervals: IntervalTree::new(),
            obstacles: HashMap::new(),
        }
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn globe(&self) -> &crate::geo::Globe {
        &self.frame.globe
    }

    pub fn set_globe(&mut self, globe: crate::geo::Globe) {
        self.frame.globe = globe;
    }

    /// Geographic center of the box.
    pub fn center_position(&self) -> Position {
        self.frame.from_local(&self.bounds.center())
    }

    pub fn bounds(&self) -> &AxisBox {
        &self.bounds
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = time;
    }

    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    pub fn add_cost_interval(&mut self, interval: CostInterval) {
        self.intervals.add(interval);
    }

    pub fn remove_cost_interval(&mut self, interval: &CostInterval) -> bool {
        self.intervals.remove(interval)
    }

    pub fn embed(&mut self, obstacle: Obstacle) -> bool {
        if self.obstacles.contains_key(obstacle.id()) {
            return false;
        }
        self.obstacles.insert(obstacle.id().to_string(), obstacle);
        true
    }

    pub fn unembed(&mut self, id: &str) -> bool {
        self.obstacles.remove(id).is_some()
    }

    pub fn unembed_all(&mut self) {
        self.obstacles.clear();
    }

    pub fn is_embedded(&self, id: &str) -> bool {
        self.obstacles.contains_key(id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.bounds.contains(&self.frame.to_local(position))
    }

    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        self.frame.globe.distance(a, b)
    }

    pub fn normalized_distance(&self, a: &Position, b: &Position) -> f64 {
        self.distance(a, b) / self.normalizer
    }

    /// Uniform random position inside the box.
    pub fn sample_random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let b = &self.bounds;
        let p = Point3::new(
            rng.gen_range(b.min.x..=b.max.x),
            rng.gen_range(b.min.y..=b.max.y),
            rng.gen_range(b.min.z..=b.max.z),
        );
        self.frame.from_local(&p)
    }

    /// Whether a position conflicts with any obstacle active now,
    /// within the given clearance radius.
    pub fn check_conflict(&self, position: &Position, clearance: f64) -> bool {
        let p = self.frame.to_local(position);
        self.obstacles
            .values()
            .filter(|o| o.active_at(self.time))
            .any(|o| o.shape.conflicts_with_point(&self.frame, &p, clearance))
    }

    /// Whether the segment `a -> b` conflicts with any obstacle active now.
    pub fn check_conflict_segment(&self, a: &Position, b: &Position, clearance: f64) -> bool {
        let segment = LineSegment::new(self.frame.to_local(a), self.frame.to_local(b));
        self.obstacles
            .values()
            .filter(|o| o.active_at(self.time))
            .any(|o| o.shape.conflicts_with_segment(&self.frame, &segment, clearance))
    }

    /// Cost-interval tree for a segment: the validity intervals of every
    /// obstacle whose volume the segment crosses, plus the environment-wide
    /// intervals, which apply everywhere.
    pub fn embed_interval_tree(&self, a: &Position, b: &Position) -> IntervalTree {
        let segment = LineSegment::new(self.frame.to_local(a), self.frame.to_local(b));
        let mut tree = IntervalTree::new();
        for obstacle in self.obstacles.values() {
            if obstacle
                .shape
                .conflicts_with_segment(&self.frame, &segment, 0.0)
            {
                tree.add(obstacle.interval.clone());
            }
        }
        for interval in self.intervals.iter() {
            tree.add(interval.clone());
        }
        tree
    }

    /// Cost of the leg `a -> b` over `[start, end]`.
    ///
    /// Each hazard crossed by the leg contributes `1 + cost` (deduplicated
    /// by id); the policy combines the contributions and the result scales
    /// with the normalized leg length.
    pub fn leg_cost(
        &self,
        a: &Position,
        b: &Position,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        let segment = LineSegment::new(self.frame.to_local(a), self.frame.to_local(b));
        let mut seen: HashSet<&str> = HashSet::new();
        let mut costs = Vec::new();

        for obstacle in self.obstacles.values() {
            if !obstacle.active_during(start, end) {
                continue;
            }
            if !obstacle
                .shape
                .conflicts_with_segment(&self.frame, &segment, 0.0)
            {
                continue;
            }
            if seen.insert(obstacle.id()) {
                let hazard = obstacle.interval.effective_cost();
                if !risk_policy.satisfies(hazard) {
                    return f64::INFINITY;
                }
                costs.push(1.0 + hazard);
            }
        }
        for interval in self.intervals.search_range(start, end) {
            if seen.insert(interval.id.as_str()) {
                let hazard = interval.effective_cost();
                if !risk_policy.satisfies(hazard) {
                    return f64::INFINITY;
                }
                costs.push(1.0 + hazard);
            }
        }

        if costs.is_empty() {
            costs.push(1.0);
        }
        self.normalized_distance(a, b) * cost_policy.combine(&costs)
    }

    /// Environment-wide aggregated cost over `[start, end]`.
    pub fn accumulated_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cost = 0.0;
        for interval in self.intervals.search_range(start, end) {
            if seen.insert(interval.id.as_str()) {
                cost += interval.effective_cost();
            }
        }
        for obstacle in self.obstacles.values() {
            if obstacle.active_during(start, end) && seen.insert(obstacle.id()) {
                cost += obstacle.interval.effective_cost();
            }
        }
        cost
    }

    /// Step cost between two sampled waypoints; in the continuous
    /// environment a step is a (short) leg.
    pub fn step_cost(
        &self,
        a: &Position,
        b: &Position,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        self.leg_cost(a, b, start, end, cost_policy, risk_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Globe;
    use crate::obstacle::ObstacleShape;
    use chrono::TimeZone;
    use nalgebra::Vector3;
    use rand::{rngs::StdRng, SeedableRng};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn env() -> SamplingEnvironment {
        let frame = LocalFrame::new(Position::new(0.0, 0.0, 0.0), Globe::default());
        SamplingEnvironment::new(
            frame,
            AxisBox::from_extent(Vector3::new(1000.0, 1000.0, 1000.0)),
            now(),
        )
    }

    #[test]
    fn samples_stay_inside_bounds() {
        let env = env();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = env.sample_random_position(&mut rng);
            assert!(env.contains(&p));
        }
    }

    #[test]
    fn segment_conflict_detects_crossing() {
        let mut env = env();
        let frame = *env.frame();
        env.embed(Obstacle::new(
            ObstacleShape::Sphere {
                center: frame.from_local(&Point3::new(500.0, 500.0, 500.0)),
                radius_m: 50.0,
            },
            CostInterval::new("wx", now() - chrono::Duration::hours(1), now() + chrono::Duration::hours(1), 30.0),
        ));
        let a = frame.from_local(&Point3::new(0.0, 500.0, 500.0));
        let b = frame.from_local(&Point3::new(1000.0, 500.0, 500.0));
        let c = frame.from_local(&Point3::new(0.0, 0.0, 0.0));
        let d = frame.from_local(&Point3::new(100.0, 0.0, 0.0));
        assert!(env.check_conflict_segment(&a, &b, 0.0));
        assert!(!env.check_conflict_segment(&c, &d, 0.0));
    }

    #[test]
    fn leg_cost_scales_with_hazards() {
        let mut env = env();
        let frame = *env.frame();
        let a = frame.from_local(&Point3::new(0.0, 500.0, 500.0));
        let b = frame.from_local(&Point3::new(1000.0, 500.0, 500.0));
        let clean = env.leg_cost(&a, &b, now(), now(), CostPolicy::Average, RiskPolicy::Ignorance);

        env.embed(Obstacle::new(
            ObstacleShape::Sphere {
                center: frame.from_local(&Point3::new(500.0, 500.0, 500.0)),
                radius_m: 50.0,
            },
            CostInterval::new("wx", now() - chrono::Duration::hours(1), now() + chrono::Duration::hours(1), 80.0),
        ));
        let hazardous = env.leg_cost(&a, &b, now(), now(), CostPolicy::Average, RiskPolicy::Ignorance);
        assert!(hazardous > clean);

        // 80 exceeds the avoidance threshold of 50
        let blocked = env.leg_cost(&a, &b, now(), now(), CostPolicy::Average, RiskPolicy::Avoidance);
        assert!(blocked.is_infinite());
    }

    #[test]
    fn edge_interval_tree_collects_crossed_obstacles() {
        let mut env = env();
        let frame = *env.frame();
        env.embed(Obstacle::new(
            ObstacleShape::Sphere {
                center: frame.from_local(&Point3::new(500.0, 500.0, 500.0)),
                radius_m: 50.0,
            },
            CostInterval::new("crossed", now(), now() + chrono::Duration::hours(1), 10.0),
        ));
        env.embed(Obstacle::new(
            ObstacleShape::Sphere {
                center: frame.from_local(&Point3::new(0.0, 0.0, 900.0)),
                radius_m: 10.0,
            },
            CostInterval::new("far", now(), now() + chrono::Duration::hours(1), 10.0),
        ));
        let a = frame.from_local(&Point3::new(0.0, 500.0, 500.0));
        let b = frame.from_local(&Point3::new(1000.0, 500.0, 500.0));
        let tree = env.embed_interval_tree(&a, &b);
        let ids: Vec<&str> = tree.iter().map(|i| i.id.as_str()).collect();
        assert!(ids.contains(&"crossed"));
        assert!(!ids.contains(&"far"));
    }
}
