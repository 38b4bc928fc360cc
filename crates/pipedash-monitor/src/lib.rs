//! Analysis run monitor
//!
//! Decides between the live backend and the local simulator, follows each
//! run to a terminal snapshot and publishes a [`DashboardState`] for
//! renderers.
//!
//! # Modules
//!
//! - `health`: Backend health probe
//! - `monitor`: The monitor actor and its handle
//! - `policy`: Reconnect backoff for live channels
//! - `sources`: Stream, poll and simulated status sources

pub mod health;
pub mod monitor;
pub mod policy;
pub mod sources;

pub use monitor::{AnalysisMonitor, DashboardState, MonitorEvent, MonitorHandle};
pub use policy::ReconnectPolicy;
pub use sources::{
    PollSource, RunStream, RunUpdate, Simulator, SourceKind, StatusSource, StreamSource,
};
