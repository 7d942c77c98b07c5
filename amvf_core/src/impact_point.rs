//! Straight-line impact-point estimation.
//!
//! Tracks are treated as straight lines through their perigee point. This is
//! exact for neutral or very stiff tracks and adequate over the few-millimetre
//! distances between a track's perigee and the vertices it is tested against.

use crate::error::VertexingError;
use crate::traits::ImpactPointEstimator;
use crate::types::{
    GeometryContext, MagneticFieldContext, TrackParameters, Vertex, D0, PHI, SPEED_OF_LIGHT,
    THETA, TIME, Z0,
};
use nalgebra::{Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Impact parameters of a track w.r.t. a vertex, with uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactParametersAndSigma {
    /// Signed transverse impact parameter (mm)
    pub d0: f64,
    /// Longitudinal impact parameter (mm)
    pub z0: f64,
    pub sigma_d0: f64,
    pub sigma_z0: f64,
    /// Time difference at closest approach (ns), when requested
    pub delta_t: Option<f64>,
    pub sigma_delta_t: Option<f64>,
}

impl ImpactParametersAndSigma {
    /// χ² of the impact parameters, or `None` if a spatial sigma is not positive.
    ///
    /// The time term is added only when `use_time` is set and its sigma is positive.
    pub fn chi2(&self, use_time: bool) -> Option<f64> {
        if self.sigma_d0 <= 0.0 || self.sigma_z0 <= 0.0 {
            return None;
        }
        let mut chi2 = (self.d0 / self.sigma_d0).powi(2) + (self.z0 / self.sigma_z0).powi(2);
        if use_time {
            if let (Some(dt), Some(sigma_t)) = (self.delta_t, self.sigma_delta_t) {
                if sigma_t > 0.0 {
                    chi2 += (dt / sigma_t).powi(2);
                }
            }
        }
        Some(chi2)
    }
}

/// Point of closest transverse approach of a track line to a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Transverse path length from the perigee point to the PCA
    pub path_length: f64,
    /// PCA in space-time (time assumes β = 1)
    pub point: Vector4<f64>,
    /// Transverse unit vector perpendicular to the track (d0 direction)
    pub d0_direction: Vector3<f64>,
}

/// Closest approach of `track` to `reference` in the transverse plane.
pub fn closest_approach(
    track: &TrackParameters,
    reference: &Vector3<f64>,
    gctx: &GeometryContext,
) -> ClosestApproach {
    let perigee = track.position(gctx);
    let (sin_phi, cos_phi) = track.phi().sin_cos();
    let (sin_theta, cos_theta) = track.theta().sin_cos();
    let cot_theta = cos_theta / sin_theta;

    let path_length = (reference.x - perigee.x) * cos_phi + (reference.y - perigee.y) * sin_phi;
    let pca = perigee + Vector3::new(cos_phi, sin_phi, cot_theta) * path_length;
    let time = track.time() + path_length / (sin_theta * SPEED_OF_LIGHT);

    ClosestApproach {
        path_length,
        point: Vector4::new(pca.x, pca.y, pca.z, time),
        d0_direction: Vector3::new(-sin_phi, cos_phi, 0.0),
    }
}

/// Track-only variances of (d0, z0, t) transported by `path_length`.
pub fn transported_variances(track: &TrackParameters, path_length: f64) -> (f64, f64, f64) {
    let sin_theta = track.theta().sin();
    let var_d0 = track.variance(D0) + path_length.powi(2) * track.variance(PHI);
    let z0_lever = path_length / (sin_theta * sin_theta);
    let var_z0 = track.variance(Z0) + z0_lever.powi(2) * track.variance(THETA);
    (var_d0, var_z0, track.variance(TIME))
}

/// Impact-point estimator for straight-line tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineEstimator;

impl ImpactPointEstimator for StraightLineEstimator {
    fn impact_parameters(
        &self,
        track: &TrackParameters,
        vertex: &Vertex,
        gctx: &GeometryContext,
        _mctx: &MagneticFieldContext,
        use_time: bool,
    ) -> Result<ImpactParametersAndSigma, VertexingError> {
        let theta = track.theta();
        if !theta.is_finite() || theta <= 0.0 || theta >= std::f64::consts::PI {
            return Err(VertexingError::impact_point(format!(
                "theta {} outside (0, pi)",
                theta
            )));
        }

        let v = vertex.position3();
        let pca = closest_approach(track, &v, gctx);
        let n = pca.d0_direction;

        let d0 = (pca.point.xyz() - v).dot(&n);
        let z0 = pca.point.z - v.z;

        let (trk_var_d0, trk_var_z0, trk_var_t) = transported_variances(track, pca.path_length);
        let vtx_cov = vertex.covariance3();
        let var_d0 = trk_var_d0 + (n.transpose() * vtx_cov * n)[(0, 0)];
        let var_z0 = trk_var_z0 + vtx_cov[(2, 2)];

        let (delta_t, sigma_delta_t) = if use_time {
            let var_t = trk_var_t + vertex.covariance[(3, 3)];
            (
                Some(pca.point.w - vertex.time()),
                Some(var_t.max(0.0).sqrt()),
            )
        } else {
            (None, None)
        };

        Ok(ImpactParametersAndSigma {
            d0,
            z0,
            sigma_d0: var_d0.max(0.0).sqrt(),
            sigma_z0: var_z0.max(0.0).sqrt(),
            delta_t,
            sigma_delta_t,
        })
    }
}
