//! skyplan-link — datalink adapters and track monitoring.
//!
//! Concrete implementations of the core `AircraftLink` interface plus a
//! scheduled poller that publishes track samples to subscribers.

mod monitor;
mod simulated;

pub use monitor::{TrackMonitor, TrackUpdate};
pub use simulated::SimulatedLink;
