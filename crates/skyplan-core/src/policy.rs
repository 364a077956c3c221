//! Cost and risk policies applied when aggregating environment costs.

use serde::{Deserialize, Serialize};

/// Aggregator over the per-cell costs traversed by a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPolicy {
    Minimum,
    Maximum,
    #[default]
    Average,
}

impl CostPolicy {
    /// Combine a non-empty list of per-cell costs.
    pub fn combine(&self, costs: &[f64]) -> f64 {
        if costs.is_empty() {
            return f64::INFINITY;
        }
        match self {
            CostPolicy::Minimum => costs.iter().copied().fold(f64::INFINITY, f64::min),
            CostPolicy::Maximum => costs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            CostPolicy::Average => costs.iter().sum::<f64>() / costs.len() as f64,
        }
    }
}

/// Threshold mapping a hazard cost magnitude to admissible or infinite.
/// The variants are progressively stricter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskPolicy {
    /// Any hazard magnitude is admissible.
    #[default]
    Ignorance,
    /// Hazards above 100 are inadmissible.
    Safety,
    /// Hazards above 50 are inadmissible.
    Avoidance,
}

impl RiskPolicy {
    pub fn threshold(&self) -> f64 {
        match self {
            RiskPolicy::Ignorance => f64::INFINITY,
            RiskPolicy::Safety => 100.0,
            RiskPolicy::Avoidance => 50.0,
        }
    }

    /// Whether a hazard cost magnitude is admissible under this policy.
    pub fn satisfies(&self, cost: f64) -> bool {
        cost <= self.threshold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_policies() {
        let costs = [1.0, 3.0, 2.0];
        assert_eq!(CostPolicy::Minimum.combine(&costs), 1.0);
        assert_eq!(CostPolicy::Maximum.combine(&costs), 3.0);
        assert_eq!(CostPolicy::Average.combine(&costs), 2.0);
    }

    #[test]
    fn risk_thresholds_are_ordered() {
        assert!(RiskPolicy::Ignorance.satisfies(1e12));
        assert!(RiskPolicy::Safety.satisfies(100.0));
        assert!(!RiskPolicy::Safety.satisfies(101.0));
        assert!(!RiskPolicy::Avoidance.satisfies(51.0));
        assert!(RiskPolicy::Avoidance.satisfies(50.0));
    }
}
