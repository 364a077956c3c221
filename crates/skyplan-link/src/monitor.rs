//! Scheduled track monitoring.
//!
//! A background task polls the datalink on a fixed period and publishes
//! track samples to subscribers through a broadcast channel; the latest
//! sample per aircraft stays readable from a shared map.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;

use skyplan_core::{AircraftLink, TrackPoint};

/// One published track sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackUpdate {
    pub aircraft_id: String,
    pub track: TrackPoint,
    /// Next-waypoint index reported alongside the sample; -1 when unknown.
    pub next_waypoint_index: i32,
}

/// Poller publishing track updates from one or more aircraft links.
pub struct TrackMonitor {
    tx: broadcast::Sender<TrackUpdate>,
    latest: Arc<DashMap<String, TrackUpdate>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for TrackMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackMonitor {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            latest: Arc::new(DashMap::new()),
            tasks: Vec::new(),
        }
    }

    /// Subscribe to the track update stream.
    pub fn subscribe_track(&self) -> broadcast::Receiver<TrackUpdate> {
        self.tx.subscribe()
    }

    /// Latest known sample for an aircraft.
    pub fn latest(&self, aircraft_id: &str) -> Option<TrackUpdate> {
        self.latest.get(aircraft_id).map(|entry| entry.clone())
    }

    /// Start polling a link on the given period.
    pub fn start_monitoring(
        &mut self,
        aircraft_id: impl Into<String>,
        link: Arc<dyn AircraftLink>,
        period: Duration,
    ) {
        let aircraft_id = aircraft_id.into();
        let tx = self.tx.clone();
        let latest = Arc::clone(&self.latest);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if !link.is_connected() {
                    continue;
                }
                let Some(track) = link.aircraft_timed_position() else {
                    continue;
                };
                let update = TrackUpdate {
                    aircraft_id: aircraft_id.clone(),
                    track,
                    next_waypoint_index: link.next_waypoint_index(),
                };
                latest.insert(aircraft_id.clone(), update.clone());
                // send only fails when nobody subscribes; that is fine
                if tx.send(update).is_err() {
                    tracing::trace!(aircraft = %aircraft_id, "no track subscribers");
                }
            }
        });
        self.tasks.push(task);
    }

    /// Stop every poller.
    pub fn stop_monitoring(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TrackMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedLink;
    use chrono::Utc;
    use skyplan_core::{Position, Trajectory, TrajectoryWaypoint};

    fn trajectory() -> Trajectory {
        Trajectory::new(
            (0..3)
                .map(|i| TrajectoryWaypoint {
                    position: Position::new(0.0, 0.0, i as f64),
                    eto: Some(Utc::now()),
                    cost: 0.0,
                    dtg: 0.0,
                    ttg_s: 0.0,
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn publishes_track_samples() {
        let link = Arc::new(SimulatedLink::new());
        link.connect();
        link.upload_flight_path(&trajectory());

        let mut monitor = TrackMonitor::new();
        let mut rx = monitor.subscribe_track();
        monitor.start_monitoring("ac-1", link.clone(), Duration::from_millis(5));

        let update = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("sample within a second")
            .expect("channel open");
        assert_eq!(update.aircraft_id, "ac-1");
        assert_eq!(update.next_waypoint_index, 1);
        assert!(monitor.latest("ac-1").is_some());

        monitor.stop_monitoring();
    }

    #[tokio::test]
    async fn disconnected_links_publish_nothing() {
        let link = Arc::new(SimulatedLink::new());
        link.upload_flight_path(&trajectory());

        let mut monitor = TrackMonitor::new();
        let mut rx = monitor.subscribe_track();
        monitor.start_monitoring("ac-2", link.clone(), Duration::from_millis(5));

        let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err(), "no samples while disconnected");
        monitor.stop_monitoring();
    }
}
