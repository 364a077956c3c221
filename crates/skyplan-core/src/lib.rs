//! skyplan-core — environment model, geometry and cost aggregation.
//!
//! This crate contains the spatio-temporal environment the planners search:
//! globe math, geometry primitives, time-valid cost intervals, obstacle
//! embedding, aircraft capabilities and the waypoint/trajectory model.
//! No planner logic lives here.

pub mod aircraft;
pub mod datalink;
pub mod environment;
pub mod geo;
pub mod geom;
pub mod intervals;
pub mod obstacle;
pub mod policy;
pub mod roadmap;
pub mod waypoint;

pub use aircraft::AircraftCapabilities;
pub use datalink::{AircraftLink, TrackPoint};
pub use environment::{Environment, PlanningGrid, SamplingEnvironment};
pub use geo::{Globe, LocalFrame, Position, PrecisionPosition};
pub use intervals::{CostInterval, IntervalTree};
pub use obstacle::{DesirabilityZone, Obstacle, ObstacleShape};
pub use policy::{CostPolicy, RiskPolicy};
pub use roadmap::{Edge, Roadmap};
pub use waypoint::{Trajectory, TrajectoryWaypoint, Waypoint, WaypointId, WaypointPool};
