//! Datalink interface to the vehicle.
//!
//! The engine only depends on this trait; concrete adapters (simulated or
//! wire-connected) live outside the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;
use crate::waypoint::Trajectory;

/// A time-stamped track sample of the aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub position: Position,
    pub time: DateTime<Utc>,
}

/// Connection to the planned aircraft.
pub trait AircraftLink: Send + Sync {
    fn connect(&self);
    fn disconnect(&self);
    fn is_connected(&self) -> bool;

    /// Current aircraft position with its timestamp, when known.
    fn aircraft_timed_position(&self) -> Option<TrackPoint>;

    /// Index of the next waypoint of the uploaded flight path the aircraft
    /// is flying towards; `-1` when unknown.
    fn next_waypoint_index(&self) -> i32;

    /// Upload a revised flight path to the vehicle.
    fn upload_flight_path(&self, trajectory: &Trajectory);
}
