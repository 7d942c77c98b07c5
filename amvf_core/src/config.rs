//! Finder configuration and per-call vertexing options.

use crate::error::VertexingError;
use crate::types::{FitQuality, GeometryContext, MagneticFieldContext, Vertex};
use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// FINDER CONFIGURATION
// ============================================================================

/// Configuration for the AdaptiveMultiVertexFinder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Maximum number of finder iterations (default: 100)
    pub max_iterations: usize,

    /// Accept vertices with a single compatible track when the fit uses the
    /// beam constraint (default: false)
    pub add_single_track_vertices: bool,

    /// Search compatible tracks among all input tracks instead of only the
    /// remaining seed tracks (default: true)
    pub do_real_multi_vertex: bool,

    /// Seed finder runs with the beam constraint and its output replaces the
    /// constraint (default: true)
    pub use_seed_constraint: bool,

    /// Keep the vertex covariance when computing IP significances (default: false)
    pub use_vertex_cov_for_ip_estimation: bool,

    /// Use the time coordinate in significances and merging (default: false)
    pub use_time: bool,

    /// Maximum |Δz| between track and candidate for attachment (default: 3 mm)
    pub tracks_max_z_interval: f64,

    /// Maximum IP significance for attachment (default: 5)
    pub tracks_max_significance: f64,

    /// χ² cut for track-to-vertex compatibility (default: 18.42)
    pub max_vertex_chi2: f64,

    /// Classify compatibility by vertex_compatibility alone (default: true)
    pub use_fast_compatibility: bool,

    /// Minimum weight for a compatible track in the slow check (default: 1e-4)
    pub min_weight: f64,

    /// Maximum weight contamination of an accepted vertex (default: 0.5)
    pub maximum_vertex_contamination: f64,

    /// Merge test in 3D (4D with time) instead of z only (default: false)
    pub do_3d_splitting: bool,

    /// Candidates closer than this significance to an accepted vertex are
    /// merged (default: 3)
    pub max_merge_vertex_significance: f64,

    /// Diagonal variance of the loose constraint used when the fit runs
    /// unconstrained (default: 1e8)
    pub loose_constr_value: f64,

    /// Fit quality assigned to the loose constraint (default: chi2 0, ndf -3)
    pub default_constr_fit_quality: FitQuality,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            add_single_track_vertices: false,
            do_real_multi_vertex: true,
            use_seed_constraint: true,
            use_vertex_cov_for_ip_estimation: false,
            use_time: false,
            tracks_max_z_interval: 3.0,
            tracks_max_significance: 5.0,
            max_vertex_chi2: 18.42,
            use_fast_compatibility: true,
            min_weight: 1e-4,
            maximum_vertex_contamination: 0.5,
            do_3d_splitting: false,
            max_merge_vertex_significance: 3.0,
            loose_constr_value: 1e8,
            default_constr_fit_quality: FitQuality::new(0.0, -3.0),
        }
    }
}

impl FinderConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, VertexingError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| VertexingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VertexingError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| VertexingError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Rejects configurations the finder cannot run with.
    pub fn validate(&self) -> Result<(), VertexingError> {
        if self.max_iterations == 0 {
            return Err(VertexingError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let positive = [
            ("tracks_max_z_interval", self.tracks_max_z_interval),
            ("tracks_max_significance", self.tracks_max_significance),
            ("max_vertex_chi2", self.max_vertex_chi2),
            ("loose_constr_value", self.loose_constr_value),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(VertexingError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.min_weight) {
            return Err(VertexingError::InvalidConfig(format!(
                "min_weight must lie in [0, 1], got {}",
                self.min_weight
            )));
        }
        if self.maximum_vertex_contamination.is_nan() || self.maximum_vertex_contamination < 0.0 {
            return Err(VertexingError::InvalidConfig(format!(
                "maximum_vertex_contamination must be non-negative, got {}",
                self.maximum_vertex_contamination
            )));
        }
        if self.max_merge_vertex_significance.is_nan() || self.max_merge_vertex_significance < 0.0 {
            return Err(VertexingError::InvalidConfig(format!(
                "max_merge_vertex_significance must be non-negative, got {}",
                self.max_merge_vertex_significance
            )));
        }

        Ok(())
    }
}

// ============================================================================
// PER-CALL OPTIONS
// ============================================================================

/// Options for a single `find` call.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexingOptions {
    /// Beam-spot constraint
    pub constraint: Vertex,

    /// Use the constraint as a prior in the vertex fit
    pub use_constraint_in_fit: bool,

    pub geo_context: GeometryContext,

    pub mag_field_context: MagneticFieldContext,
}

impl VertexingOptions {
    /// Options with the given beam-spot constraint, used in the fit.
    pub fn with_constraint(constraint: Vertex) -> Self {
        Self {
            constraint,
            use_constraint_in_fit: true,
            geo_context: GeometryContext,
            mag_field_context: MagneticFieldContext,
        }
    }

    /// Options without a usable constraint: the beam spot sits at the origin
    /// with zero covariance and the fit runs unconstrained.
    pub fn unconstrained() -> Self {
        Self {
            constraint: Vertex::new(Vector4::zeros(), Matrix4::zeros()),
            use_constraint_in_fit: false,
            geo_context: GeometryContext,
            mag_field_context: MagneticFieldContext,
        }
    }
}
