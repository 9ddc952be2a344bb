//! # onetrick-engine
//!
//! Attributes finished matches to the loadout a character most plausibly
//! used, and merges every character's view of a match into one aggregate.
//!
//! The driver supplies [`Providers`] for the upstream systems, calls
//! [`init_telemetry`] once, then runs [`Engine::run_cycle`] on its own
//! schedule.

#![deny(unsafe_code)]

pub mod engine;
pub mod enrich;
pub mod error;
pub mod matcher;
pub mod merger;
pub mod mock;
pub mod naming;
pub mod providers;
pub mod snapshot_store;
pub mod tracker;

pub use engine::{CycleReport, Engine, Providers};
pub use error::{EngineError, ProviderError};
pub use matcher::{BestFitMatcher, MatchOutcome, MatchWindow};
pub use merger::AggregateMerger;
pub use naming::{PvpNamer, SnapshotNamer};
pub use snapshot_store::SnapshotStore;
pub use tracker::{EndReason, SessionTracker};

use onetrick_settings::EngineSettings;
use onetrick_telemetry::{TelemetryConfig, TelemetryGuard};

/// Install the process-wide subscriber described by the logging settings.
pub fn init_telemetry(settings: &EngineSettings) -> TelemetryGuard {
    onetrick_telemetry::init_telemetry(TelemetryConfig::from(&settings.logging))
}
