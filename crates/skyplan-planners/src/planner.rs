//! Planner traits, revision listeners and shared helpers.

use chrono::{DateTime, Utc};
use std::time::Instant;

use skyplan_core::{
    AircraftCapabilities, Environment, Position, TrackPoint, Trajectory, TrajectoryWaypoint,
};

use crate::error::Result;

/// Listener invoked synchronously on every completed planning pass,
/// including empty "no plan" payloads.
pub type RevisionListener = Box<dyn FnMut(&Trajectory) + Send>;

/// Ordered list of plan-revision listeners.
#[derive(Default)]
pub struct RevisionHooks {
    listeners: Vec<RevisionListener>,
}

impl std::fmt::Debug for RevisionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionHooks")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RevisionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: RevisionListener) {
        self.listeners.push(listener);
    }

    pub fn notify(&mut self, trajectory: &Trajectory) {
        for listener in &mut self.listeners {
            listener(trajectory);
        }
    }
}

/// Caller-supplied cancellation instant, checked at each anytime pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn within(timeout: std::time::Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn expired(&self) -> bool {
        self.0.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// A motion planner producing time-stamped trajectories.
///
/// `plan` is synchronous; anytime and online variants iterate internally
/// until their terminating predicate or the deadline fires.
pub trait Planner {
    fn plan(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        etd: DateTime<Utc>,
    ) -> Trajectory;

    fn plan_via(
        &mut self,
        env: &mut Environment,
        origin: &Position,
        destination: &Position,
        via: &[Position],
        etd: DateTime<Utc>,
    ) -> Trajectory;

    /// Whether this planner can search the given environment variant.
    fn supports_environment(&self, env: &Environment) -> bool;

    /// Whether the given positions are usable: inside the environment and
    /// free of terrain conflict.
    fn supports_waypoints(&self, env: &Environment, waypoints: &[Position]) -> bool;

    fn set_deadline(&mut self, deadline: Deadline);

    fn add_revision_listener(&mut self, listener: RevisionListener);
}

/// Anytime planners trade solution quality against planning time.
/// Quality runs in `[0,1]`; invalid bounds are rejected at setter time.
pub trait AnytimePlanner: Planner {
    fn minimum_quality(&self) -> f64;
    fn set_minimum_quality(&mut self, quality: f64) -> Result<()>;
    fn maximum_quality(&self) -> f64;
    fn set_maximum_quality(&mut self, quality: f64) -> Result<()>;
    fn quality_improvement(&self) -> f64;
    fn set_quality_improvement(&mut self, step: f64) -> Result<()>;
}

/// Online planners revise the remaining plan as the aircraft advances.
pub trait OnlinePlanner: Planner {
    fn is_online(&self) -> bool;
    fn set_online(&mut self, online: bool);
    fn position_threshold(&self) -> f64;
    fn set_position_threshold(&mut self, threshold: f64) -> Result<()>;
    fn aircraft_timed_position(&self) -> Option<TrackPoint>;

    /// Shift the search start to a later plan waypoint, resetting costs and
    /// reconnecting the new start into the graph.
    fn update_start(&mut self, env: &mut Environment, position: &Position);
}

/// Dynamic planners repair their data structures after world changes.
pub trait DynamicPlanner: Planner {
    /// Notify the planner that obstacles changed; conflicted parts of its
    /// graph are invalidated and repaired on the next pass.
    fn world_changed(&mut self, env: &mut Environment) -> Trajectory;
}

/// Shared waypoint-support check: every position must lie inside the
/// environment and clear of currently active obstacles.
pub fn waypoints_supported(
    env: &Environment,
    aircraft: &AircraftCapabilities,
    waypoints: &[Position],
) -> bool {
    waypoints
        .iter()
        .all(|w| env.contains(w) && !env.check_conflict(w, aircraft.separation_radius_m))
}

/// Plan a multi-leg route by chaining single plans through the via
/// positions, departing each leg at the previous leg's arrival time.
/// Any failed leg voids the whole plan.
pub fn plan_via_segments<P: Planner + ?Sized>(
    planner: &mut P,
    env: &mut Environment,
    origin: &Position,
    destination: &Position,
    via: &[Position],
    etd: DateTime<Utc>,
) -> Trajectory {
    let mut parts = Vec::with_capacity(via.len() + 1);
    let mut current_origin = *origin;
    let mut current_etd = etd;

    let mut destinations: Vec<Position> = via.to_vec();
    destinations.push(*destination);

    for current_destination in destinations {
        if current_origin.precision() == current_destination.precision() {
            continue;
        }
        let part = planner.plan(env, &current_origin, &current_destination, current_etd);
        if part.is_empty() {
            return Trajectory::empty();
        }
        if let Some(last) = part.last() {
            current_origin = last.position;
            if let Some(eto) = last.eto {
                current_etd = eto;
            }
        }
        parts.push(part);
    }

    concatenate_trajectories(parts, |a, b| env.distance(a, b))
}

/// Concatenate partial trajectories of a multi-leg plan, dropping the
/// duplicated joint waypoints and accumulating costs. Any empty part
/// voids the whole plan.
pub fn concatenate_trajectories<F>(parts: Vec<Trajectory>, distance: F) -> Trajectory
where
    F: Fn(&Position, &Position) -> f64,
{
    let mut waypoints: Vec<TrajectoryWaypoint> = Vec::new();
    let mut cost_offset = 0.0;

    for (index, part) in parts.into_iter().enumerate() {
        if part.is_empty() {
            return Trajectory::empty();
        }
        let skip = usize::from(index > 0);
        for w in part.waypoints.iter().skip(skip) {
            let mut w = w.clone();
            if w.cost.is_finite() {
                w.cost += cost_offset;
            }
            waypoints.push(w);
        }
        cost_offset = waypoints
            .last()
            .map(|w| if w.cost.is_finite() { w.cost } else { 0.0 })
            .unwrap_or(0.0);
    }

    restamp(Trajectory::new(waypoints), distance)
}

/// Recompute distance-to-go and time-to-go annotations in place.
pub fn restamp<F>(mut trajectory: Trajectory, distance: F) -> Trajectory
where
    F: Fn(&Position, &Position) -> f64,
{
    let final_eto = trajectory.last().and_then(|w| w.eto);
    let mut dtg = 0.0;
    for i in (0..trajectory.waypoints.len()).rev() {
        if i + 1 < trajectory.waypoints.len() {
            dtg += distance(
                &trajectory.waypoints[i].position,
                &trajectory.waypoints[i + 1].position,
            );
        }
        trajectory.waypoints[i].dtg = dtg;
        trajectory.waypoints[i].ttg_s = match (trajectory.waypoints[i].eto, final_eto) {
            (Some(eto), Some(last)) => (last - eto).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
    }
    trajectory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_hooks_fire_in_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut hooks = RevisionHooks::new();
        for tag in ["a", "b"] {
            let log = log.clone();
            hooks.subscribe(Box::new(move |t: &Trajectory| {
                log.lock().unwrap().push((tag, t.len()));
            }));
        }
        hooks.notify(&Trajectory::empty());
        assert_eq!(*log.lock().unwrap(), vec![("a", 0), ("b", 0)]);
    }

    #[test]
    fn concatenation_voids_on_empty_part() {
        let part = Trajectory::new(vec![TrajectoryWaypoint {
            position: Position::new(0.0, 0.0, 0.0),
            eto: None,
            cost: 0.0,
            dtg: 0.0,
            ttg_s: 0.0,
        }]);
        let joined =
            concatenate_trajectories(vec![part, Trajectory::empty()], |_, _| 0.0);
        assert!(joined.is_empty());
    }
}
