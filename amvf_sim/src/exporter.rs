//! JSON exporter for found vertices.
//!
//! Writes the truth and the finder output of one scenario run so that events
//! can be inspected offline.

use crate::error::SimError;
use crate::oracle::TruthVertex;
use crate::runner::{ScenarioMetrics, ScenarioOutcome};
use amvf_core::Vertex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A true vertex position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthPosition {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub n_tracks: usize,
}

impl From<&TruthVertex> for TruthPosition {
    fn from(truth: &TruthVertex) -> Self {
        Self {
            id: truth.id,
            x: truth.position.x,
            y: truth.position.y,
            z: truth.position.z,
            n_tracks: truth.n_tracks,
        }
    }
}

/// A track's association with a found vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackWeight {
    pub track: usize,
    pub weight: f64,
    pub chi2: f64,
}

/// A found vertex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundVertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
    pub sigma_z: f64,
    pub chi2: f64,
    pub ndf: f64,
    pub tracks: Vec<TrackWeight>,
}

impl From<&Vertex> for FoundVertex {
    fn from(vertex: &Vertex) -> Self {
        Self {
            x: vertex.position.x,
            y: vertex.position.y,
            z: vertex.position.z,
            t: vertex.position.w,
            sigma_z: vertex.covariance[(2, 2)].max(0.0).sqrt(),
            chi2: vertex.fit_quality.chi2,
            ndf: vertex.fit_quality.ndf,
            tracks: vertex
                .tracks
                .iter()
                .map(|tv| TrackWeight {
                    track: tv.track.0,
                    weight: tv.weight,
                    chi2: tv.chi2,
                })
                .collect(),
        }
    }
}

/// Complete export of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct VertexExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub truth: Vec<TruthPosition>,

    pub vertices: Vec<FoundVertex>,

    pub metrics: ScenarioMetrics,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl VertexExport {
    /// Creates an export from a scenario outcome.
    pub fn from_outcome(outcome: &ScenarioOutcome) -> Self {
        let result = &outcome.result;
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            truth: outcome.truth.iter().map(TruthPosition::from).collect(),
            vertices: outcome.vertices.iter().map(FoundVertex::from).collect(),
            metrics: result.metrics.clone(),
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
