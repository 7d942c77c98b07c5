//! Scripted collaborators for deterministic scenarios.
//!
//! `ScriptedSeedFinder` proposes a fixed list of z positions and then reports
//! exhaustion by returning the constraint. `FixedWeightFitter` leaves vertex
//! positions alone and assigns every linked track the same weight, which
//! makes acceptance decisions predictable.

use amvf_core::{
    FitterState, MultiVertexFitter, SeedFinder, TrackHandle, TrackSet, Vertex, VertexHandle,
    VertexingError, VertexingOptions,
};
use nalgebra::{Matrix4, Vector4};

/// Seeder that replays a script of z positions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSeedFinder {
    pub script: Vec<f64>,
}

/// What the finder told the scripted seeder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptedState {
    /// Number of `find_seeds` calls so far
    pub calls: usize,

    /// Removed-track hints received before each call
    pub removed_hints: Vec<Vec<TrackHandle>>,

    pending: Vec<TrackHandle>,
}

impl ScriptedSeedFinder {
    pub fn new(script: Vec<f64>) -> Self {
        Self { script }
    }
}

impl SeedFinder for ScriptedSeedFinder {
    type State = ScriptedState;

    const ACCEPTS_REMOVED_TRACKS: bool = true;

    fn find_seeds(
        &self,
        _tracks: &TrackSet<'_>,
        _seed_tracks: &[TrackHandle],
        options: &VertexingOptions,
        state: &mut Self::State,
    ) -> Result<Vec<Vertex>, VertexingError> {
        let hints = std::mem::take(&mut state.pending);
        state.removed_hints.push(hints);
        let call = state.calls;
        state.calls += 1;

        let Some(&z) = self.script.get(call) else {
            return Ok(vec![options.constraint.clone()]);
        };

        let beam = &options.constraint.position;
        let covariance = if options.use_constraint_in_fit {
            options.constraint.covariance
        } else {
            Matrix4::zeros()
        };
        Ok(vec![Vertex::new(Vector4::new(beam.x, beam.y, z, beam.w), covariance)])
    }

    fn set_removed_tracks(state: &mut Self::State, removed: &[TrackHandle]) {
        state.pending = removed.to_vec();
    }
}

/// Fitter that assigns a constant weight and compatibility to every link.
#[derive(Debug, Clone, Copy)]
pub struct FixedWeightFitter {
    pub weight: f64,
    pub compatibility: f64,
}

impl FixedWeightFitter {
    pub fn new(weight: f64, compatibility: f64) -> Self {
        Self {
            weight,
            compatibility,
        }
    }
}

impl MultiVertexFitter for FixedWeightFitter {
    fn add_vertex_to_fit(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        tracks: &TrackSet<'_>,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        if state.track_links(vertex)?.is_empty() {
            return Err(VertexingError::fitter(format!(
                "{} has no linked tracks",
                vertex
            )));
        }
        state.vertex_collection = vec![vertex];
        self.fit(state, tracks, options)
    }

    fn fit(
        &self,
        state: &mut FitterState,
        _tracks: &TrackSet<'_>,
        _options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        for vertex in state.vertex_collection.clone() {
            for track in state.track_links(vertex)?.to_vec() {
                let trk_at_vtx = state.track_at_vertex_mut(track, vertex)?;
                trk_at_vtx.weight = self.weight;
                trk_at_vtx.vertex_compatibility = self.compatibility;
                trk_at_vtx.chi2 = self.compatibility;
            }
        }
        Ok(())
    }
}
