//! Attaching compatible tracks to a fresh candidate, with nearest-z recovery.

use crate::config::{FinderConfig, VertexingOptions};
use crate::error::VertexingError;
use crate::fitter_state::FitterState;
use crate::traits::{ImpactPointEstimator, TrackSet};
use crate::types::{TrackAtVertex, TrackHandle, TrackParameters, Vertex, VertexHandle, VertexInfo};
use nalgebra::{Matrix4, Vector4};
use tracing::debug;

/// Selects the tracks a candidate is prepared with.
pub struct TrackSelector<'a, E> {
    pub config: &'a FinderConfig,
    pub estimator: &'a E,
    pub tracks: &'a TrackSet<'a>,
    pub options: &'a VertexingOptions,
}

impl<'a, E: ImpactPointEstimator> TrackSelector<'a, E> {
    /// Longitudinal position of a track's perigee point.
    pub fn track_z(&self, track: &TrackParameters) -> f64 {
        track.position(&self.options.geo_context).z
    }

    /// Combined impact-parameter significance of a track w.r.t. `vertex`.
    ///
    /// The vertex covariance is zeroed unless `use_vertex_cov_for_ip_estimation`
    /// is set. Degenerate spatial sigmas give a significance of 0.
    pub fn ip_significance(
        &self,
        track: &TrackParameters,
        vertex: &Vertex,
    ) -> Result<f64, VertexingError> {
        let mut point = Vertex::new(vertex.position, vertex.covariance);
        if !self.config.use_vertex_cov_for_ip_estimation {
            point.covariance = Matrix4::zeros();
        }

        let ip = self.estimator.impact_parameters(
            track,
            &point,
            &self.options.geo_context,
            &self.options.mag_field_context,
            self.config.use_time,
        )?;

        Ok(ip.chi2(self.config.use_time).map_or(0.0, f64::sqrt))
    }

    /// Links every search track close enough in z and in IP significance.
    pub fn add_compatible_tracks(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        search_tracks: &[TrackHandle],
    ) -> Result<(), VertexingError> {
        let candidate = state.vertex(vertex)?.clone();

        for &track in search_tracks {
            let params = self.tracks.get(track)?;
            if (self.track_z(params) - candidate.z()).abs() > self.config.tracks_max_z_interval {
                continue;
            }
            if self.ip_significance(params, &candidate)? < self.config.tracks_max_significance {
                state.info_mut(vertex)?.track_links.push(track);
                state
                    .tracks_at_vertices
                    .insert((track, vertex), TrackAtVertex::new(track, params.clone()));
            }
        }
        Ok(())
    }

    /// When nothing was attached, moves the candidate onto the seed track
    /// nearest in z and retries. Returns false if the candidate stays empty.
    pub fn can_recover_from_no_compatible_tracks(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        seed_tracks: &[TrackHandle],
        search_tracks: &[TrackHandle],
    ) -> Result<bool, VertexingError> {
        if !state.track_links(vertex)?.is_empty() {
            return Ok(true);
        }

        let candidate_z = state.vertex(vertex)?.z();
        let mut nearest: Option<(f64, f64)> = None;
        for &track in seed_tracks {
            let z = self.track_z(self.tracks.get(track)?);
            let distance = (z - candidate_z).abs();
            if nearest.map_or(true, |(best, _)| distance < best) {
                nearest = Some((distance, z));
            }
        }

        let Some((_, new_z)) = nearest else {
            debug!("No nearest track to seed found");
            return Ok(false);
        };

        let position = Vector4::new(0.0, 0.0, new_z, 0.0);
        state.vertex_mut(vertex)?.position = position;
        let constraint = state.info(vertex)?.constraint.clone();
        state.vtx_info_map.insert(vertex, VertexInfo::new(constraint, position));
        debug!("Moved {} to nearest seed track at z = {:.4}", vertex, new_z);

        self.add_compatible_tracks(state, vertex, search_tracks)?;
        if state.track_links(vertex)?.is_empty() {
            debug!("No tracks near the relocated seed were found");
            return Ok(false);
        }
        Ok(true)
    }

    /// Creates the candidate's bookkeeping with `constraint` and attaches
    /// its tracks. Returns false if the candidate cannot be fit.
    pub fn can_prepare_vertex_for_fit(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        constraint: &Vertex,
        seed_tracks: &[TrackHandle],
        search_tracks: &[TrackHandle],
    ) -> Result<bool, VertexingError> {
        let seed_position = state.vertex(vertex)?.position;
        state
            .vtx_info_map
            .insert(vertex, VertexInfo::new(constraint.clone(), seed_position));

        self.add_compatible_tracks(state, vertex, search_tracks)?;
        self.can_recover_from_no_compatible_tracks(state, vertex, seed_tracks, search_tracks)
    }
}
