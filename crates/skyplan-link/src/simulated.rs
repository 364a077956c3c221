//! Simulated datalink: the vehicle flies the uploaded flight path, one
//! waypoint per tick.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use skyplan_core::{AircraftLink, TrackPoint, Trajectory, TrajectoryWaypoint};

/// In-process stand-in for a vehicle datalink.
///
/// The simulated aircraft advances along the most recently uploaded
/// trajectory whenever `advance` is called; position and next-waypoint
/// index derive from the cursor. Thread-safe, so a monitor task can poll
/// while a planner iterates.
#[derive(Debug, Default)]
pub struct SimulatedLink {
    connected: AtomicBool,
    path: RwLock<Vec<TrajectoryWaypoint>>,
    cursor: AtomicUsize,
    uploads: AtomicUsize,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the simulated aircraft by `steps` waypoints of the uploaded
    /// path.
    pub fn advance(&self, steps: usize) {
        let len = self.path.read().expect("path lock").len();
        if len == 0 {
            return;
        }
        let next = (self.cursor.load(Ordering::SeqCst) + steps).min(len - 1);
        self.cursor.store(next, Ordering::SeqCst);
    }

    /// Number of flight paths uploaded so far.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn path_len(&self) -> usize {
        self.path.read().expect("path lock").len()
    }
}

impl AircraftLink for SimulatedLink {
    fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn aircraft_timed_position(&self) -> Option<TrackPoint> {
        let path = self.path.read().expect("path lock");
        let cursor = self.cursor.load(Ordering::SeqCst);
        path.get(cursor).map(|w| TrackPoint {
            position: w.position,
            time: w.eto.unwrap_or_else(Utc::now),
        })
    }

    fn next_waypoint_index(&self) -> i32 {
        let len = self.path.read().expect("path lock").len();
        if len == 0 {
            return -1;
        }
        let cursor = self.cursor.load(Ordering::SeqCst);
        if cursor + 1 < len {
            (cursor + 1) as i32
        } else {
            cursor as i32
        }
    }

    fn upload_flight_path(&self, trajectory: &Trajectory) {
        let mut path = self.path.write().expect("path lock");
        *path = trajectory.waypoints.clone();
        self.uploads.fetch_add(1, Ordering::SeqCst);
        // keep the cursor on the path
        let len = path.len();
        drop(path);
        if len == 0 {
            self.cursor.store(0, Ordering::SeqCst);
        } else if self.cursor.load(Ordering::SeqCst) >= len {
            self.cursor.store(len - 1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyplan_core::Position;

    fn path(n: usize) -> Trajectory {
        Trajectory::new(
            (0..n)
                .map(|i| TrajectoryWaypoint {
                    position: Position::new(0.0, 0.0, i as f64 * 10.0),
                    eto: Some(Utc::now()),
                    cost: i as f64,
                    dtg: 0.0,
                    ttg_s: 0.0,
                })
                .collect(),
        )
    }

    #[test]
    fn advances_along_uploaded_path() {
        let link = SimulatedLink::new();
        assert_eq!(link.next_waypoint_index(), -1);
        link.upload_flight_path(&path(5));
        assert_eq!(link.next_waypoint_index(), 1);
        link.advance(2);
        assert_eq!(link.next_waypoint_index(), 3);
        let track = link.aircraft_timed_position().unwrap();
        assert_eq!(track.position.altitude_m, 20.0);
        link.advance(100);
        assert_eq!(link.next_waypoint_index(), 4);
    }

    #[test]
    fn connection_toggles() {
        let link = SimulatedLink::new();
        assert!(!link.is_connected());
        link.connect();
        assert!(link.is_connected());
        link.disconnect();
        assert!(!link.is_connected());
    }
}
