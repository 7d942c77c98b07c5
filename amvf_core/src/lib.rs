//! AMVF Core - Adaptive Multi-Vertex Finding
//!
//! Finds the interaction vertices of an event from its reconstructed tracks:
//! 1. **How many**: candidates are seeded one at a time from the tracks not yet
//!    explained by an accepted vertex
//! 2. **Where**: every candidate is refit together with the accepted vertices
//!    it shares tracks with, by deterministic annealing
//! 3. **Which tracks**: each track carries a soft weight per vertex, so a track
//!    may contribute fractionally to several vertices
//!
//! The finder talks to its collaborators (seed finder, multi-vertex fitter,
//! impact-point estimator) through the traits in [`traits`]; straight-line
//! reference implementations ship with the crate.

pub mod acceptance;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod finder;
pub mod fitter;
pub mod fitter_state;
pub mod impact_point;
pub mod seeding;
pub mod selection;
pub mod traits;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_utils;

// Re-export key types for convenience
pub use config::{FinderConfig, VertexingOptions};
pub use error::VertexingError;
pub use finder::{AdaptiveMultiVertexFinder, FinderRun, StopReason};
pub use fitter::{AdaptiveFitterConfig, AdaptiveMultiVertexFitter, AnnealingConfig};
pub use fitter_state::FitterState;
pub use impact_point::{ImpactParametersAndSigma, StraightLineEstimator};
pub use seeding::{
    GridDensityConfig, GridDensitySeedFinder, GridDensityState, TrackDensityConfig,
    TrackDensitySeedFinder,
};
pub use traits::{ImpactPointEstimator, InputTrack, MultiVertexFitter, SeedFinder, TrackSet};
pub use types::{
    FitQuality, GeometryContext, MagneticFieldContext, TrackAtVertex, TrackHandle,
    TrackParameters, Vertex, VertexHandle, VertexInfo,
};
pub use validation::{check_output, ValidationReport, Violation};
