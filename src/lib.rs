//! skyplan — spatio-temporal flight trajectory planning for autonomous
//! aircraft.
//!
//! This crate ties the engine together: configuration defaults, and the
//! session layer that builds a planner from a named specification and a
//! populated scenario.

pub mod config;
pub mod session;

pub use config::PlannerDefaults;
pub use session::{build_planner, PlannerKind, PlannerSpec, Scenario};

pub use skyplan_core as core;
pub use skyplan_link as link;
pub use skyplan_planners as planners;
