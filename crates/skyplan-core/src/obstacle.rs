//! Obstacles and desirability zones embedded into environments.

use chrono::{DateTime, Utc};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::geo::{LocalFrame, Position};
use crate::geom::{AxisBox, LineSegment};
use crate::intervals::CostInterval;

/// Geometric shape of a hazard volume, in geographic coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ObstacleShape {
    /// Spherical volume around a center position.
    Sphere { center: Position, radius_m: f64 },
    /// Vertical cylinder between two altitudes (weather cells, terrain masts).
    Cylinder {
        center: Position,
        radius_m: f64,
        base_m: f64,
        top_m: f64,
    },
    /// Axis-aligned box spanning two corner positions.
    Box { min: Position, max: Position },
}

impl ObstacleShape {
    pub fn intersects_box(&self, frame: &LocalFrame, bounds: &AxisBox) -> bool {
        match self {
            ObstacleShape::Sphere { center, radius_m } => {
                bounds.intersects_sphere(&frame.to_local(center), *radius_m)
            }
            ObstacleShape::Cylinder {
                center,
                radius_m,
                base_m,
                top_m,
            } => {
                let c = frame.to_local(center);
                let base = base_m - frame.origin.altitude_m;
                let top = top_m - frame.origin.altitude_m;
                bounds.intersects_cylinder(&c, *radius_m, base, top)
            }
            ObstacleShape::Box { min, max } => {
                let volume = AxisBox::new(frame.to_local(min), frame.to_local(max));
                bounds.intersects_box(&volume)
            }
        }
    }

    /// Whether a point lies within `clearance` of the volume.
    pub fn conflicts_with_point(&self, frame: &LocalFrame, p: &Point3<f64>, clearance: f64) -> bool {
        match self {
            ObstacleShape::Sphere { center, radius_m } => {
                (frame.to_local(center) - p).norm() <= radius_m + clearance
            }
            ObstacleShape::Cylinder {
                center,
                radius_m,
                base_m,
                top_m,
            } => {
                let base = base_m - frame.origin.altitude_m;
                let top = top_m - frame.origin.altitude_m;
                if p.z < base - clearance || p.z > top + clearance {
                    return false;
                }
                let c = frame.to_local(center);
                let dx = p.x - c.x;
                let dy = p.y - c.y;
                (dx * dx + dy * dy).sqrt() <= radius_m + clearance
            }
            ObstacleShape::Box { min, max } => {
                let volume = AxisBox::new(frame.to_local(min), frame.to_local(max));
                (volume.clamp_point(p) - p).norm() <= clearance || volume.contains(p)
            }
        }
    }

    /// Whether a segment passes within `clearance` of the volume.
    pub fn conflicts_with_segment(
        &self,
        frame: &LocalFrame,
        segment: &LineSegment,
        clearance: f64,
    ) -> bool {
        match self {
            ObstacleShape::Sphere { center, radius_m } => {
                segment.distance_to_point(&frame.to_local(center)) <= radius_m + clearance
            }
            ObstacleShape::Cylinder {
                center,
                radius_m,
                base_m,
                top_m,
            } => {
                let c = frame.to_local(center);
                let base = base_m - frame.origin.altitude_m - clearance;
                let top = top_m - frame.origin.altitude_m + clearance;
                segment.distance_to_vertical_axis(&c, base, top) <= radius_m + clearance
            }
            ObstacleShape::Box { min, max } => {
                let lo = frame.to_local(min);
                let hi = frame.to_local(max);
                let inflated = AxisBox::new(
                    Point3::new(lo.x - clearance, lo.y - clearance, lo.z - clearance),
                    Point3::new(hi.x + clearance, hi.y + clearance, hi.z + clearance),
                );
                inflated.intersects_segment(segment)
            }
        }
    }
}

/// A hazard volume with a validity period and a cost magnitude.
///
/// Obstacle sources hand these to the engine pre-parsed; the interval id
/// stays stable across re-receipts of the same phenomenon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub shape: ObstacleShape,
    pub interval: CostInterval,
}

impl Obstacle {
    pub fn new(shape: ObstacleShape, interval: CostInterval) -> Self {
        Self { shape, interval }
    }

    pub fn id(&self) -> &str {
        &self.interval.id
    }

    pub fn active_at(&self, t: DateTime<Utc>) -> bool {
        self.interval.contains_instant(t)
    }

    pub fn active_during(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.interval.overlaps(start, end)
    }
}

/// A volume that makes traversal more or less attractive without forbidding
/// it. Desirability runs from 0 (avoid) to 1 (prefer); 0.5 is neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesirabilityZone {
    pub shape: ObstacleShape,
    pub desirability: f64,
}

impl DesirabilityZone {
    pub fn new(shape: ObstacleShape, desirability: f64) -> Self {
        Self {
            shape,
            desirability: desirability.clamp(0.0, 1.0),
        }
    }

    pub fn intersects_segment(&self, frame: &LocalFrame, segment: &LineSegment) -> bool {
        self.shape.conflicts_with_segment(frame, segment, 0.0)
    }
}

/// Mean desirability of the zones a segment crosses; neutral when none.
pub fn segment_desirability(
    zones: &[DesirabilityZone],
    frame: &LocalFrame,
    segment: &LineSegment,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0u32;
    for zone in zones {
        if zone.intersects_segment(frame, segment) {
            sum += zone.desirability;
            count += 1;
        }
    }
    if count == 0 {
        0.5
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Globe;
    use chrono::TimeZone;

    fn frame() -> LocalFrame {
        LocalFrame::new(Position::new(0.0, 0.0, 0.0), Globe::default())
    }

    fn validity() -> CostInterval {
        CostInterval::new(
            "cell-1",
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            80.0,
        )
    }

    #[test]
    fn sphere_conflicts_respect_clearance() {
        let frame = frame();
        let shape = ObstacleShape::Sphere {
            center: frame.from_local(&Point3::new(100.0, 0.0, 50.0)),
            radius_m: 10.0,
        };
        assert!(shape.conflicts_with_point(&frame, &Point3::new(100.0, 12.0, 50.0), 5.0));
        assert!(!shape.conflicts_with_point(&frame, &Point3::new(100.0, 20.0, 50.0), 5.0));
    }

    #[test]
    fn cylinder_segment_conflict_requires_altitude_overlap() {
        let frame = frame();
        let shape = ObstacleShape::Cylinder {
            center: frame.from_local(&Point3::new(50.0, 0.0, 0.0)),
            radius_m: 10.0,
            base_m: 0.0,
            top_m: 100.0,
        };
        let through = LineSegment::new(Point3::new(0.0, 0.0, 50.0), Point3::new(100.0, 0.0, 50.0));
        let above = LineSegment::new(Point3::new(0.0, 0.0, 150.0), Point3::new(100.0, 0.0, 150.0));
        assert!(shape.conflicts_with_segment(&frame, &through, 0.0));
        assert!(!shape.conflicts_with_segment(&frame, &above, 0.0));
    }

    #[test]
    fn obstacle_validity_window() {
        let obstacle = Obstacle::new(
            ObstacleShape::Sphere {
                center: Position::new(0.0, 0.0, 0.0),
                radius_m: 1.0,
            },
            validity(),
        );
        let inside = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        assert!(obstacle.active_at(inside));
        assert!(!obstacle.active_at(after));
    }

    #[test]
    fn desirability_defaults_to_neutral() {
        let frame = frame();
        let seg = LineSegment::new(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
        assert_eq!(segment_desirability(&[], &frame, &seg), 0.5);
    }
}
