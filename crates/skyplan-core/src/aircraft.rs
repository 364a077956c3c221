//! Aircraft capabilities: leg durations and feasibility.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::geo::{Globe, Position};

/// Performance envelope of the planned aircraft, reduced to what the
/// planners need: travel duration on a leg, climb/descent limits and the
/// separation radius used for conflict checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AircraftCapabilities {
    pub cruise_speed_mps: f64,
    pub climb_speed_mps: f64,
    pub descent_speed_mps: f64,
    /// Maximum climb slope (vertical over horizontal); `None` for rotorcraft
    /// that can climb vertically.
    pub max_climb_gradient: Option<f64>,
    /// Maximum descent slope (vertical over horizontal); `None` unrestricted.
    pub max_descent_gradient: Option<f64>,
    pub separation_radius_m: f64,
}

impl Default for AircraftCapabilities {
    fn default() -> Self {
        // small rotorcraft profile
        Self {
            cruise_speed_mps: 15.0,
            climb_speed_mps: 2.0,
            descent_speed_mps: 3.0,
            max_climb_gradient: None,
            max_descent_gradient: None,
            separation_radius_m: 0.0,
        }
    }
}

impl AircraftCapabilities {
    /// Estimated traversal duration of the leg `from -> to`.
    ///
    /// Horizontal and vertical motion overlap, so the slower of the two
    /// bounds the leg.
    pub fn estimated_duration(&self, globe: &Globe, from: &Position, to: &Position) -> Duration {
        let ground = globe.haversine_distance(from.lat_deg, from.lon_deg, to.lat_deg, to.lon_deg);
        let dalt = to.altitude_m - from.altitude_m;

        let horizontal_s = ground / self.cruise_speed_mps.max(1e-9);
        let vertical_s = if dalt >= 0.0 {
            dalt / self.climb_speed_mps.max(1e-9)
        } else {
            -dalt / self.descent_speed_mps.max(1e-9)
        };

        let seconds = horizontal_s.max(vertical_s);
        Duration::milliseconds((seconds * 1000.0).round() as i64)
    }

    /// Whether the aircraft can fly the leg `from -> to` at all.
    ///
    /// An infeasible leg is a discarded candidate, never a planner abort.
    pub fn is_feasible(&self, globe: &Globe, from: &Position, to: &Position) -> bool {
        let ground = globe.haversine_distance(from.lat_deg, from.lon_deg, to.lat_deg, to.lon_deg);
        let dalt = to.altitude_m - from.altitude_m;

        if dalt > 0.0 {
            if self.climb_speed_mps <= 0.0 {
                return false;
            }
            if let Some(gradient) = self.max_climb_gradient {
                if dalt > gradient * ground {
                    return false;
                }
            }
        } else if dalt < 0.0 {
            if self.descent_speed_mps <= 0.0 {
                return false;
            }
            if let Some(gradient) = self.max_descent_gradient {
                if -dalt > gradient * ground {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_leg_duration_uses_climb_speed() {
        let globe = Globe::default();
        let capabilities = AircraftCapabilities::default();
        let from = Position::new(0.0, 0.0, 0.0);
        let to = Position::new(0.0, 0.0, 20.0);
        let d = capabilities.estimated_duration(&globe, &from, &to);
        assert_eq!(d.num_seconds(), 10);
    }

    #[test]
    fn fixed_wing_rejects_steep_climb() {
        let globe = Globe::default();
        let capabilities = AircraftCapabilities {
            max_climb_gradient: Some(0.2),
            ..AircraftCapabilities::default()
        };
        let from = Position::new(0.0, 0.0, 0.0);
        // ~111m ground track, 100m climb: far beyond a 0.2 gradient
        let steep = Position::new(0.001, 0.0, 100.0);
        let shallow = Position::new(0.001, 0.0, 10.0);
        assert!(!capabilities.is_feasible(&globe, &from, &steep));
        assert!(capabilities.is_feasible(&globe, &from, &shallow));
    }
}
