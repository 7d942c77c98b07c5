//! Error types for vertex finding.

use crate::types::{TrackHandle, VertexHandle};

/// Errors that can occur while finding or fitting vertices.
///
/// Collaborator failures (seed finder, impact-point estimator, fitter) are
/// surfaced unchanged through the finder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VertexingError {
    #[error("Empty input track collection")]
    EmptyInput,

    #[error("Seed finder failed: {0}")]
    SeedFinder(String),

    #[error("Impact point estimation failed: {0}")]
    ImpactPoint(String),

    #[error("Vertex fit failed: {0}")]
    Fitter(String),

    #[error("Track not found: {0}")]
    TrackNotFound(TrackHandle),

    #[error("Vertex not found: {0}")]
    VertexNotFound(VertexHandle),

    #[error("No track-at-vertex entry for ({0}, {1})")]
    TrackAtVertexNotFound(TrackHandle, VertexHandle),

    #[error("Covariance matrix is singular")]
    SingularCovariance,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VertexingError {
    /// Creates a fitter error.
    pub fn fitter(msg: impl Into<String>) -> Self {
        Self::Fitter(msg.into())
    }

    /// Creates an impact-point error.
    pub fn impact_point(msg: impl Into<String>) -> Self {
        Self::ImpactPoint(msg.into())
    }

    /// Creates a seed finder error.
    pub fn seed_finder(msg: impl Into<String>) -> Self {
        Self::SeedFinder(msg.into())
    }
}
