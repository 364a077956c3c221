//! Planner error kinds.
//!
//! Only parameter validation and unsupported environments surface as
//! errors; infeasible legs are discarded candidates and "no plan" is an
//! empty trajectory, never a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// Out-of-range quality, bias or distance at setter time.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The planner rejects the environment variant.
    #[error("environment not supported")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, PlannerError>;
