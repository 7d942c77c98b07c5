//! Capability contracts for the finder's collaborators.
//!
//! The finder only talks to tracks, seed finders, impact-point estimators and
//! fitters through these traits. Reference implementations live in
//! [`crate::impact_point`], [`crate::seeding`] and [`crate::fitter`].

use crate::config::VertexingOptions;
use crate::error::VertexingError;
use crate::fitter_state::FitterState;
use crate::impact_point::ImpactParametersAndSigma;
use crate::types::{
    GeometryContext, MagneticFieldContext, TrackHandle, TrackParameters, Vertex, VertexHandle,
};
use nalgebra::Matrix4;

// ============================================================================
// TRACKS
// ============================================================================

/// Parameter extractor: maps a caller's track type to perigee parameters.
pub trait InputTrack {
    fn parameters(&self) -> &TrackParameters;
}

impl InputTrack for TrackParameters {
    fn parameters(&self) -> &TrackParameters {
        self
    }
}

impl<T: InputTrack> InputTrack for &T {
    fn parameters(&self) -> &TrackParameters {
        (*self).parameters()
    }
}

/// The tracks of one `find` call, addressable by [`TrackHandle`].
#[derive(Debug, Clone)]
pub struct TrackSet<'a> {
    parameters: Vec<&'a TrackParameters>,
}

impl<'a> TrackSet<'a> {
    /// Extracts parameters from the caller's tracks; handle `i` is `inputs[i]`.
    pub fn new<T: InputTrack>(inputs: &'a [T]) -> Self {
        Self {
            parameters: inputs.iter().map(|t| t.parameters()).collect(),
        }
    }

    /// Parameters of a track.
    pub fn get(&self, handle: TrackHandle) -> Result<&'a TrackParameters, VertexingError> {
        self.parameters
            .get(handle.0)
            .copied()
            .ok_or(VertexingError::TrackNotFound(handle))
    }

    /// All handles in input order.
    pub fn handles(&self) -> impl Iterator<Item = TrackHandle> + '_ {
        (0..self.parameters.len()).map(TrackHandle)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

// ============================================================================
// IMPACT-POINT ESTIMATOR
// ============================================================================

/// Computes impact parameters of a track w.r.t. a vertex.
pub trait ImpactPointEstimator {
    /// Impact parameters and their uncertainties. The vertex covariance
    /// contributes to the sigmas; pass a zero covariance for track-only sigmas.
    fn impact_parameters(
        &self,
        track: &TrackParameters,
        vertex: &Vertex,
        gctx: &GeometryContext,
        mctx: &MagneticFieldContext,
        use_time: bool,
    ) -> Result<ImpactParametersAndSigma, VertexingError>;

    /// Track-only χ² of the track w.r.t. a vertex position.
    ///
    /// Returns `f64::MAX` when the track uncertainties are degenerate.
    fn vertex_compatibility(
        &self,
        track: &TrackParameters,
        vertex: &Vertex,
        gctx: &GeometryContext,
        mctx: &MagneticFieldContext,
        use_time: bool,
    ) -> Result<f64, VertexingError> {
        let point = Vertex::new(vertex.position, Matrix4::zeros());
        let ip = self.impact_parameters(track, &point, gctx, mctx, use_time)?;
        Ok(ip.chi2(use_time).unwrap_or(f64::MAX))
    }
}

// ============================================================================
// SEED FINDER
// ============================================================================

/// Proposes vertex candidates from the remaining seed tracks.
pub trait SeedFinder {
    /// State carried across the calls of one `find` invocation.
    type State: Default;

    /// Whether the state consumes the tracks removed since the previous call.
    const ACCEPTS_REMOVED_TRACKS: bool = false;

    /// Returns candidate vertices; the finder uses the last one.
    fn find_seeds(
        &self,
        tracks: &TrackSet<'_>,
        seed_tracks: &[TrackHandle],
        options: &VertexingOptions,
        state: &mut Self::State,
    ) -> Result<Vec<Vertex>, VertexingError>;

    /// Hands the tracks removed in the previous iteration to the state.
    fn set_removed_tracks(_state: &mut Self::State, _removed: &[TrackHandle]) {}
}

// ============================================================================
// MULTI-VERTEX FITTER
// ============================================================================

/// Jointly refits vertices that share tracks, writing weights and χ² into the
/// fitter state.
pub trait MultiVertexFitter {
    /// Adds `vertex` to the fit and refits it together with every vertex
    /// coupled to it through shared tracks.
    fn add_vertex_to_fit(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        tracks: &TrackSet<'_>,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError>;

    /// Refits the current `vertex_collection`.
    fn fit(
        &self,
        state: &mut FitterState,
        tracks: &TrackSet<'_>,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError>;
}
