//! AMVF Simulation Harness
//!
//! Deterministic events and scenarios for the adaptive multi-vertex finder.
//!
//! # Core Principle: One Seed, One Event
//!
//! Every source of randomness is derived from a single 64-bit seed:
//! - **Vertices**: positions drawn from the beam spot
//! - **Tracks**: directions drawn within the detector acceptance
//! - **Smearing**: Gaussian resolution on d0, z0 and time
//!
//! The same seed always yields the same tracks and therefore the same finder
//! output, so any failing scenario can be replayed exactly.
//!
//! # Usage
//!
//! ```ignore
//! use amvf_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::TwoClusters);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;
mod scripted;

pub use error::SimError;
pub use exporter::{FoundVertex, TrackWeight, TruthPosition, VertexExport};
pub use oracle::{perigee_through, EventGenerator, GeneratorConfig, SimTrack, TruthVertex};
pub use runner::{ScenarioMetrics, ScenarioOutcome, ScenarioResult, ScenarioRunner};
pub use scripted::{FixedWeightFitter, ScriptedSeedFinder, ScriptedState};
