//! Planner property defaults from a flat key/value file and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Default values for planner properties. Loaded from a flat JSON
/// key/value file, overridable via `SKYPLAN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerDefaults {
    /// Iteration cap of the sampling planners.
    pub max_iter: u32,
    /// Goal bias of the sampling planners, percent.
    pub bias_pct: u32,
    /// Connection and density radius, meters.
    pub max_distance_m: f64,
    /// Neighbor cap per roadmap waypoint.
    pub max_neighbors: usize,
    /// RRT extension step, meters.
    pub epsilon_m: f64,
    /// Goal acceptance radius, meters.
    pub goal_threshold_m: f64,
    /// Anytime quality bounds and step.
    pub minimum_quality: f64,
    pub maximum_quality: f64,
    pub quality_improvement: f64,
    /// Desirability influence on edge costs.
    pub lambda: f64,
    /// Online position-change threshold, meters.
    pub position_threshold_m: f64,
    /// Online start shift: plan waypoints ahead of the vehicle.
    pub lookahead_offset: usize,
    /// RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for PlannerDefaults {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            bias_pct: 5,
            max_distance_m: 400.0,
            max_neighbors: 15,
            epsilon_m: 50.0,
            goal_threshold_m: 50.0,
            minimum_quality: 0.0,
            maximum_quality: 1.0,
            quality_improvement: 0.1,
            lambda: 0.5,
            position_threshold_m: 2.0,
            lookahead_offset: 3,
            seed: None,
        }
    }
}

impl PlannerDefaults {
    /// Load defaults from a flat JSON object.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading {}", path.as_ref().display()))?;
        let defaults = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.as_ref().display()))?;
        Ok(defaults)
    }

    /// Apply `SKYPLAN_*` environment overrides on top of these defaults.
    pub fn apply_env(mut self) -> Self {
        fn read<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|s| s.parse().ok())
        }
        if let Some(v) = read("SKYPLAN_MAX_ITER") {
            self.max_iter = v;
        }
        if let Some(v) = read("SKYPLAN_BIAS_PCT") {
            self.bias_pct = v;
        }
        if let Some(v) = read("SKYPLAN_MAX_DISTANCE_M") {
            self.max_distance_m = v;
        }
        if let Some(v) = read("SKYPLAN_MAX_NEIGHBORS") {
            self.max_neighbors = v;
        }
        if let Some(v) = read("SKYPLAN_EPSILON_M") {
            self.epsilon_m = v;
        }
        if let Some(v) = read("SKYPLAN_GOAL_THRESHOLD_M") {
            self.goal_threshold_m = v;
        }
        if let Some(v) = read("SKYPLAN_MIN_QUALITY") {
            self.minimum_quality = v;
        }
        if let Some(v) = read("SKYPLAN_MAX_QUALITY") {
            self.maximum_quality = v;
        }
        if let Some(v) = read("SKYPLAN_QUALITY_IMPROVEMENT") {
            self.quality_improvement = v;
        }
        if let Some(v) = read("SKYPLAN_LAMBDA") {
            self.lambda = v;
        }
        if let Some(v) = read("SKYPLAN_POSITION_THRESHOLD_M") {
            self.position_threshold_m = v;
        }
        if let Some(v) = read("SKYPLAN_LOOKAHEAD_OFFSET") {
            self.lookahead_offset = v;
        }
        if let Some(v) = read("SKYPLAN_SEED") {
            self.seed = Some(v);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_overrides_merge_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_iter": 42, "lambda": 0.9 }}"#).unwrap();
        let defaults = PlannerDefaults::from_file(file.path()).unwrap();
        assert_eq!(defaults.max_iter, 42);
        assert_eq!(defaults.lambda, 0.9);
        // untouched keys keep their defaults
        assert_eq!(defaults.max_neighbors, PlannerDefaults::default().max_neighbors);
    }
}
