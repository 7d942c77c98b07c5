//! The adaptive multi-vertex fitter.
//!
//! Vertices sharing tracks are refit together. Each fit iteration
//! 1. evaluates the χ² compatibility of every track with every vertex it is
//!    linked to,
//! 2. turns compatibilities into soft weights with deterministic annealing
//!    (the weight of a track is shared between competing vertices),
//! 3. solves the weighted least-squares problem for each vertex position,
//!    including the vertex constraint as a prior.
//!
//! For straight-line tracks the residuals are linear in the vertex position,
//! so step 3 is exact for a fixed set of weights.

use crate::config::VertexingOptions;
use crate::error::VertexingError;
use crate::fitter_state::FitterState;
use crate::impact_point::{closest_approach, transported_variances, StraightLineEstimator};
use crate::traits::{ImpactPointEstimator, MultiVertexFitter, TrackSet};
use crate::types::{
    FitQuality, GeometryContext, TrackParameters, Vertex, VertexHandle, D0, SPEED_OF_LIGHT, TIME,
    Z0,
};
use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ============================================================================
// ANNEALING
// ============================================================================

/// Temperature schedule and χ² cutoff for deterministic annealing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// Decreasing temperatures; the last one is the equilibrium temperature
    pub temperatures: Vec<f64>,

    /// χ² at which a track is equally likely to be an outlier (default: 9)
    pub chi2_cutoff: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            temperatures: vec![8.0, 4.0, 2.0, 2.0_f64.sqrt(), 1.5_f64.sqrt(), 1.0],
            chi2_cutoff: 9.0,
        }
    }
}

impl AnnealingConfig {
    #[inline]
    fn gaussian_factor(chi2: f64, temperature: f64) -> f64 {
        (-chi2 / (2.0 * temperature)).exp()
    }

    /// Annealed weight of a track with compatibility `chi2`, given the
    /// compatibilities of the track with every vertex competing for it
    /// (including this one).
    pub fn weight(&self, chi2: f64, competing: &[f64], temperature: f64) -> f64 {
        let numerator = Self::gaussian_factor(chi2, temperature);
        let denominator = Self::gaussian_factor(self.chi2_cutoff, temperature)
            + competing
                .iter()
                .map(|&c| Self::gaussian_factor(c, temperature))
                .sum::<f64>();
        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    }
}

/// Position in the temperature schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnealingState {
    step: usize,
}

impl AnnealingState {
    pub fn temperature(&self, config: &AnnealingConfig) -> f64 {
        config
            .temperatures
            .get(self.step)
            .or_else(|| config.temperatures.last())
            .copied()
            .unwrap_or(1.0)
    }

    pub fn is_equilibrium(&self, config: &AnnealingConfig) -> bool {
        self.step + 1 >= config.temperatures.len()
    }

    pub fn anneal(&mut self, config: &AnnealingConfig) {
        if !self.is_equilibrium(config) {
            self.step += 1;
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveFitterConfig {
    pub annealing: AnnealingConfig,

    /// Maximum fit iterations per call (default: 30)
    pub max_iterations: usize,

    /// Relinearize once a vertex moved further than this (default: 0.5 mm)
    pub max_distance_to_linearization_point: f64,

    /// Convergence threshold on the covariance-weighted shift (default: 0.01)
    pub max_relative_shift: f64,

    /// Tracks at or below this weight do not enter the position update (default: 1e-4)
    pub min_weight: f64,

    /// Diagonal prior variance when the fit runs without constraint (default: 1e8)
    pub loose_prior_variance: f64,

    /// Fit the time coordinate (default: false)
    pub use_time: bool,
}

impl Default for AdaptiveFitterConfig {
    fn default() -> Self {
        Self {
            annealing: AnnealingConfig::default(),
            max_iterations: 30,
            max_distance_to_linearization_point: 0.5,
            max_relative_shift: 0.01,
            min_weight: 1e-4,
            loose_prior_variance: 1e8,
            use_time: false,
        }
    }
}

// ============================================================================
// LINEARIZATION
// ============================================================================

/// A track's residuals linearized around a point: the point of closest
/// approach and the information matrix of (d0, z0[, t]) in vertex coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearizedTrack {
    pub pca: Vector4<f64>,
    pub information: Matrix4<f64>,
}

/// Linearizes a straight-line track around `point`.
///
/// Returns `None` when the transported spatial variances are not positive.
pub fn linearize(
    track: &TrackParameters,
    point: &Vector4<f64>,
    gctx: &GeometryContext,
    use_time: bool,
) -> Option<LinearizedTrack> {
    let pca = closest_approach(track, &point.xyz(), gctx);
    let (var_d0, var_z0, var_t) = transported_variances(track, pca.path_length);
    if var_d0 <= 0.0 || var_z0 <= 0.0 {
        return None;
    }

    let (sin_phi, cos_phi) = track.phi().sin_cos();
    let (sin_theta, cos_theta) = track.theta().sin_cos();
    let cot_theta = cos_theta / sin_theta;

    // Residual gradients w.r.t. (m - v), m the PCA and v the vertex
    let h_d0 = Vector4::new(-sin_phi, cos_phi, 0.0, 0.0);
    let h_z0 = Vector4::new(-cot_theta * cos_phi, -cot_theta * sin_phi, 1.0, 0.0);
    let mut information = h_d0 * h_d0.transpose() / var_d0 + h_z0 * h_z0.transpose() / var_z0;

    if use_time && var_t > 0.0 {
        let inv_speed = 1.0 / (sin_theta * SPEED_OF_LIGHT);
        let h_t = Vector4::new(-cos_phi * inv_speed, -sin_phi * inv_speed, 0.0, 1.0);
        information += h_t * h_t.transpose() / var_t;
    }

    Some(LinearizedTrack {
        pca: pca.point,
        information,
    })
}

/// Inverse of the prior covariance. Without time the time coordinate is
/// decoupled and carried through unchanged.
fn prior_information(covariance: &Matrix4<f64>, use_time: bool) -> Option<Matrix4<f64>> {
    if use_time {
        return covariance.try_inverse();
    }
    let spatial = covariance.fixed_view::<3, 3>(0, 0).into_owned().try_inverse()?;
    let mut information = Matrix4::zeros();
    information.fixed_view_mut::<3, 3>(0, 0).copy_from(&spatial);
    information[(3, 3)] = 1.0;
    Some(information)
}

// ============================================================================
// FITTER
// ============================================================================

/// Multi-vertex fitter with deterministic annealing.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveMultiVertexFitter<E = StraightLineEstimator> {
    pub config: AdaptiveFitterConfig,
    estimator: E,
}

impl<E: ImpactPointEstimator> AdaptiveMultiVertexFitter<E> {
    pub fn new(config: AdaptiveFitterConfig, estimator: E) -> Self {
        Self { config, estimator }
    }

    fn prior(&self, state: &FitterState, vertex: VertexHandle, options: &VertexingOptions)
        -> Result<(Vector4<f64>, Matrix4<f64>), VertexingError>
    {
        let constraint = &state.info(vertex)?.constraint;
        let covariance = if options.use_constraint_in_fit {
            constraint.covariance
        } else {
            Matrix4::identity() * self.config.loose_prior_variance
        };
        Ok((constraint.position, covariance))
    }

    /// Recomputes the compatibility of each linked track with the current
    /// vertex position. Tracks are linearized again only when the vertex
    /// moved too far from the linearization point or they have no valid
    /// linearization yet.
    fn update_compatibilities(
        &self,
        state: &mut FitterState,
        tracks: &TrackSet<'_>,
        vertex: VertexHandle,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        let current = state.vertex(vertex)?.clone();
        let (links, relinearize, linearization_point) = {
            let info = state.info_mut(vertex)?;
            let moved = (current.position3() - info.linearization_point.xyz()).norm();
            let relinearize = moved > self.config.max_distance_to_linearization_point;
            if relinearize {
                trace!("Relinearizing {} after moving {:.4} mm", vertex, moved);
                info.linearization_point = current.position;
            }
            (info.track_links.clone(), relinearize, info.linearization_point)
        };

        for track in links {
            let params = tracks.get(track)?;
            let compatibility = self.estimator.vertex_compatibility(
                params,
                &current,
                &options.geo_context,
                &options.mag_field_context,
                self.config.use_time,
            )?;
            let trk_at_vtx = state.track_at_vertex_mut(track, vertex)?;
            if relinearize || !trk_at_vtx.is_linearized {
                trk_at_vtx.linearized = linearize(
                    params,
                    &linearization_point,
                    &options.geo_context,
                    self.config.use_time,
                );
                trk_at_vtx.is_linearized = true;
            }
            trk_at_vtx.vertex_compatibility = compatibility;
        }
        Ok(())
    }

    /// Shares each track's weight between the vertices competing for it.
    fn update_weights(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        temperature: f64,
    ) -> Result<(), VertexingError> {
        let links = state.track_links(vertex)?.to_vec();
        for track in links {
            let own = state.track_at_vertex(track, vertex)?.vertex_compatibility;
            let competitors = state.vertices_of_track(track);
            let mut competing: Vec<f64> = competitors
                .iter()
                .filter_map(|v| state.tracks_at_vertices.get(&(track, *v)))
                .map(|tv| tv.vertex_compatibility)
                .collect();
            if !competitors.contains(&vertex) {
                competing.push(own);
            }

            let weight = self.config.annealing.weight(own, &competing, temperature);
            state.track_at_vertex_mut(track, vertex)?.weight = weight;
        }
        Ok(())
    }

    /// Weighted least-squares update of one vertex position from the cached
    /// track linearizations.
    fn update_vertex(
        &self,
        state: &mut FitterState,
        vertex: VertexHandle,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        let use_time = self.config.use_time;
        let (prior_position, prior_covariance) = self.prior(state, vertex, options)?;

        let mut information = prior_information(&prior_covariance, use_time)
            .ok_or(VertexingError::SingularCovariance)?;
        let mut weighted = information * prior_position;

        for &track in &state.info(vertex)?.track_links {
            let trk_at_vtx = state.track_at_vertex(track, vertex)?;
            if trk_at_vtx.weight <= self.config.min_weight {
                continue;
            }
            if let Some(lin) = &trk_at_vtx.linearized {
                weighted += lin.information * lin.pca * trk_at_vtx.weight;
                information += lin.information * trk_at_vtx.weight;
            }
        }

        let mut covariance = information
            .try_inverse()
            .ok_or(VertexingError::SingularCovariance)?;
        let position = covariance * weighted;
        if !use_time {
            covariance[(3, 3)] = prior_covariance[(3, 3)];
        }

        let vtx = state.vertex_mut(vertex)?;
        vtx.position = position;
        vtx.covariance = covariance;
        Ok(())
    }

    /// True if every vertex moved less than `max_relative_shift` in units of
    /// its covariance since the previous iteration.
    fn is_small_shift(
        &self,
        state: &FitterState,
        vertices: &[VertexHandle],
    ) -> Result<bool, VertexingError> {
        for &vertex in vertices {
            let vtx = state.vertex(vertex)?;
            let delta = vtx.position3() - state.info(vertex)?.old_position.xyz();
            let Some(inverse) = vtx.covariance3().try_inverse() else {
                return Ok(false);
            };
            let shift = (delta.transpose() * inverse * delta)[(0, 0)];
            if shift >= self.config.max_relative_shift {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Final per-track χ², refitted parameters and vertex fit quality.
    fn finalize(
        &self,
        state: &mut FitterState,
        tracks: &TrackSet<'_>,
        vertex: VertexHandle,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        let use_time = self.config.use_time;
        let fitted = state.vertex(vertex)?.clone();
        let point = Vertex::new(fitted.position, Matrix4::zeros());
        let links = state.track_links(vertex)?.to_vec();

        let mut chi2_sum = 0.0;
        let mut weight_sum = 0.0;
        for track in links {
            let params = tracks.get(track)?;
            let ip = self.estimator.impact_parameters(
                params,
                &point,
                &options.geo_context,
                &options.mag_field_context,
                use_time,
            )?;
            let chi2 = ip.chi2(use_time).unwrap_or(f64::MAX);

            let mut refitted = params.clone();
            refitted.reference = fitted.position3();
            refitted.parameters[D0] = ip.d0;
            refitted.parameters[Z0] = ip.z0;
            refitted.covariance[(D0, D0)] = ip.sigma_d0 * ip.sigma_d0;
            refitted.covariance[(Z0, Z0)] = ip.sigma_z0 * ip.sigma_z0;
            if let Some(dt) = ip.delta_t {
                refitted.parameters[TIME] = fitted.time() + dt;
            }

            let trk_at_vtx = state.track_at_vertex_mut(track, vertex)?;
            trk_at_vtx.chi2 = chi2;
            trk_at_vtx.vertex_compatibility = chi2;
            trk_at_vtx.fitted_parameters = refitted;

            if trk_at_vtx.weight > self.config.min_weight && chi2 < f64::MAX {
                chi2_sum += trk_at_vtx.weight * chi2;
                weight_sum += trk_at_vtx.weight;
            }
        }

        let dims = if use_time { 4.0 } else { 3.0 };
        let per_track = if use_time { 3.0 } else { 2.0 };
        let mut ndf = per_track * weight_sum - dims;
        if options.use_constraint_in_fit {
            let (prior_position, prior_covariance) = self.prior(state, vertex, options)?;
            if let Some(information) = prior_information(&prior_covariance, use_time) {
                let delta = fitted.position - prior_position;
                chi2_sum += (delta.transpose() * information * delta)[(0, 0)];
            }
            ndf += dims;
        }

        state.vertex_mut(vertex)?.fit_quality = FitQuality::new(chi2_sum, ndf);
        Ok(())
    }

    fn fit_impl(
        &self,
        state: &mut FitterState,
        tracks: &TrackSet<'_>,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        let vertices = state.vertex_collection.clone();
        let mut annealing = AnnealingState::default();

        for iteration in 0..self.config.max_iterations {
            for &vertex in &vertices {
                let position = state.vertex(vertex)?.position;
                state.info_mut(vertex)?.old_position = position;
            }

            for &vertex in &vertices {
                self.update_compatibilities(state, tracks, vertex, options)?;
            }
            let temperature = annealing.temperature(&self.config.annealing);
            for &vertex in &vertices {
                self.update_weights(state, vertex, temperature)?;
            }
            for &vertex in &vertices {
                self.update_vertex(state, vertex, options)?;
            }

            let converged = annealing.is_equilibrium(&self.config.annealing)
                && self.is_small_shift(state, &vertices)?;
            annealing.anneal(&self.config.annealing);
            if converged {
                trace!(
                    "Fit of {} vertices converged after {} iterations",
                    vertices.len(),
                    iteration + 1
                );
                break;
            }
        }

        for &vertex in &vertices {
            self.finalize(state, tracks, vertex, options)?;
        }
        Ok(())
    }
}

impl<E: ImpactPointEstimator> MultiVertexFitter for AdaptiveMultiVertexFitter<E> {
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

        // Every vertex reachable through shared tracks is refit with the new one
        let mut to_fit = vec![vertex];
        let mut frontier = vec![vertex];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for current in frontier {
                for &track in state.track_links(current)? {
                    for &other in state.vertices_of_track(track) {
                        if !to_fit.contains(&other) {
                            to_fit.push(other);
                            next.push(other);
                        }
                    }
                }
            }
            frontier = next;
        }

        let seed_position = state.info(vertex)?.seed_position;
        state.info_mut(vertex)?.linearization_point = seed_position;
        state.vertex_collection = to_fit;

        self.fit_impl(state, tracks, options)
    }

    fn fit(
        &self,
        state: &mut FitterState,
        tracks: &TrackSet<'_>,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        self.fit_impl(state, tracks, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{beam_spot, cluster, register_candidate};
    use approx::assert_relative_eq;

    #[test]
    fn test_annealing_schedule() {
        let config = AnnealingConfig::default();
        let mut state = AnnealingState::default();
        assert_eq!(state.temperature(&config), 8.0);

        for _ in 0..10 {
            state.anneal(&config);
        }
        assert!(state.is_equilibrium(&config));
        assert_relative_eq!(state.temperature(&config), 1.0);
    }

    #[test]
    fn test_annealing_weight_sharing() {
        let config = AnnealingConfig::default();

        // A perfectly compatible track alone keeps almost all its weight
        let alone = config.weight(0.0, &[0.0], 1.0);
        assert!(alone > 0.98 && alone < 1.0);

        // Two equally compatible vertices split the weight
        let shared = config.weight(0.0, &[0.0, 0.0], 1.0);
        assert_relative_eq!(shared, 0.5, epsilon = 0.01);

        // An incompatible vertex loses the track
        let lost = config.weight(50.0, &[50.0, 0.0], 1.0);
        assert!(lost < 1e-6);

        // Degenerate compatibility maps to zero weight
        assert_eq!(config.weight(f64::MAX, &[f64::MAX], 1.0), 0.0);
    }

    #[test]
    fn test_linearized_track_has_rank_two_information() {
        let tracks = cluster(0.0, 1, 0.05);
        let lin = linearize(&tracks[0], &Vector4::zeros(), &GeometryContext, false).unwrap();

        // No information along the track direction
        let spatial = lin.information.fixed_view::<3, 3>(0, 0).into_owned();
        let along = spatial * tracks[0].direction();
        assert!(along.norm() < 1e-9, "residual {}", along.norm());
        assert!(lin.information[(0, 0)] >= 0.0);
        assert_eq!(lin.information[(3, 3)], 0.0);

        let timed = linearize(&tracks[0], &Vector4::zeros(), &GeometryContext, true).unwrap();
        assert!(timed.information[(3, 3)] > 0.0);
    }

    #[test]
    fn test_single_vertex_fit_recovers_position() {
        let inputs = cluster(5.0, 8, 0.05);
        let tracks = TrackSet::new(&inputs);
        let options = VertexingOptions::with_constraint(beam_spot());
        let mut state = FitterState::new();
        let seed = Vector4::new(0.0, 0.0, 5.2, 0.0);
        let vertex = register_candidate(
            &mut state,
            &tracks,
            seed,
            &options.constraint,
            &[0, 1, 2, 3, 4, 5, 6, 7],
        );

        let fitter = AdaptiveMultiVertexFitter::<StraightLineEstimator>::default();
        fitter.add_vertex_to_fit(&mut state, vertex, &tracks, &options).unwrap();

        let fitted = state.vertex(vertex).unwrap();
        assert_relative_eq!(fitted.z(), 5.0, epsilon = 0.05);
        assert!(fitted.position.xy().norm() < 0.05);
        assert!(fitted.fit_quality.ndf > 0.0);
        for track in state.track_links(vertex).unwrap() {
            let tv = state.track_at_vertex(*track, vertex).unwrap();
            assert!(tv.weight > 0.9, "weight {}", tv.weight);
            assert!(tv.is_linearized);
            assert!(tv.chi2 < 5.0);
        }
    }

    #[test]
    fn test_tracks_relinearize_after_large_shift() {
        let inputs = cluster(0.0, 6, 0.05);
        let tracks = TrackSet::new(&inputs);
        let options = VertexingOptions::with_constraint(beam_spot());
        let mut state = FitterState::new();
        // Seeded 2 mm away, beyond the 0.5 mm relinearization distance
        let vertex = register_candidate(
            &mut state,
            &tracks,
            Vector4::new(0.0, 0.0, 2.0, 0.0),
            &options.constraint,
            &[0, 1, 2, 3, 4, 5],
        );

        let fitter = AdaptiveMultiVertexFitter::<StraightLineEstimator>::default();
        fitter.add_vertex_to_fit(&mut state, vertex, &tracks, &options).unwrap();

        let point = state.info(vertex).unwrap().linearization_point;
        assert!(point.z.abs() < 0.5, "linearized at z = {}", point.z);
        assert_relative_eq!(state.vertex(vertex).unwrap().z(), 0.0, epsilon = 0.05);
        for &track in state.track_links(vertex).unwrap() {
            let tv = state.track_at_vertex(track, vertex).unwrap();
            assert!(tv.is_linearized);
            let expected = linearize(&inputs[track.0], &point, &GeometryContext, false);
            assert!(expected.is_some());
            assert_eq!(tv.linearized, expected);
        }
    }

    #[test]
    fn test_shared_track_prefers_closer_vertex() {
        let mut inputs = cluster(0.0, 6, 0.05);
        inputs.extend(cluster(2.0, 6, 0.05));
        let tracks = TrackSet::new(&inputs);
        let options = VertexingOptions::with_constraint(beam_spot());
        let fitter = AdaptiveMultiVertexFitter::<StraightLineEstimator>::default();
        let mut state = FitterState::new();

        let first = register_candidate(
            &mut state,
            &tracks,
            Vector4::new(0.0, 0.0, 0.0, 0.0),
            &options.constraint,
            &[0, 1, 2, 3, 4, 5],
        );
        fitter.add_vertex_to_fit(&mut state, first, &tracks, &options).unwrap();

        // Second candidate also claims track 0, which sits on the first vertex
        let second = register_candidate(
            &mut state,
            &tracks,
            Vector4::new(0.0, 0.0, 2.0, 0.0),
            &options.constraint,
            &[0, 6, 7, 8, 9, 10, 11],
        );
        fitter.add_vertex_to_fit(&mut state, second, &tracks, &options).unwrap();

        // Coupled through track 0, both vertices were refit together
        assert_eq!(state.vertex_collection, vec![second, first]);

        let shared = crate::types::TrackHandle(0);
        let w_first = state.track_at_vertex(shared, first).unwrap().weight;
        let w_second = state.track_at_vertex(shared, second).unwrap().weight;
        assert!(w_first > 0.9);
        assert!(w_second < 1e-3);
        assert_relative_eq!(state.vertex(second).unwrap().z(), 2.0, epsilon = 0.05);
    }

    #[test]
    fn test_add_vertex_without_tracks_fails() {
        let inputs = cluster(0.0, 2, 0.05);
        let tracks = TrackSet::new(&inputs);
        let options = VertexingOptions::with_constraint(beam_spot());
        let mut state = FitterState::new();
        let vertex =
            register_candidate(&mut state, &tracks, Vector4::zeros(), &options.constraint, &[]);

        let fitter = AdaptiveMultiVertexFitter::<StraightLineEstimator>::default();
        let result = fitter.add_vertex_to_fit(&mut state, vertex, &tracks, &options);
        assert!(matches!(result, Err(VertexingError::Fitter(_))));
    }

    #[test]
    fn test_unconstrained_fit_uses_loose_prior() {
        let inputs = cluster(40.0, 5, 0.05);
        let tracks = TrackSet::new(&inputs);
        let mut options = VertexingOptions::with_constraint(beam_spot());
        options.use_constraint_in_fit = false;
        let mut state = FitterState::new();
        // Constraint sits far away; without use_constraint_in_fit it must not pull
        let vertex = register_candidate(
            &mut state,
            &tracks,
            Vector4::new(0.0, 0.0, 40.0, 0.0),
            &options.constraint,
            &[0, 1, 2, 3, 4],
        );

        let fitter = AdaptiveMultiVertexFitter::<StraightLineEstimator>::default();
        fitter.add_vertex_to_fit(&mut state, vertex, &tracks, &options).unwrap();

        let fitted = state.vertex(vertex).unwrap();
        assert_relative_eq!(fitted.z(), 40.0, epsilon = 0.05);
        // ndf without constraint: 2 * sum(w) - 3
        assert!(fitted.fit_quality.ndf < 2.0 * 5.0 - 3.0 + 1e-9);
    }
}
