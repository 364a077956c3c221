//! skyplan-planners — motion planners over skyplan environments.
//!
//! A family of heuristic-search and sampling-based planners sharing the
//! environment abstraction and cost model of `skyplan-core`: grid search
//! (A*, Theta*, ARA*), probabilistic roadmaps (basic/lazy/rigid PRM),
//! rapidly-exploring trees (RRT and variants) and the flexible anytime
//! PRM family (FAPRM, FADPRM, OFADPRM, RADPRM).

pub mod arastar;
pub mod astar;
pub mod error;
pub mod faprm;
pub mod planner;
pub mod prm;
pub mod queue;
pub mod rrt;

pub use arastar::AraStar;
pub use astar::{ForwardAStar, ThetaStar};
pub use error::PlannerError;
pub use faprm::{Fadprm, Faprm, FaprmConfig, Ofadprm, Radprm};
pub use planner::{
    AnytimePlanner, Deadline, DynamicPlanner, OnlinePlanner, Planner, RevisionListener,
};
pub use prm::{BasicPrm, LazyPrm, PrmConfig, RigidPrm};
pub use rrt::{ADrrt, ARrt, Drrt, Extension, HRrt, HeuristicVariant, Rrt, RrtConfig, RrtStar, Strategy};
