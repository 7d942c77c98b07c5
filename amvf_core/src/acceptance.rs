//! Acceptance of fitted candidates: weight contamination and merge detection.

use crate::config::FinderConfig;
use crate::error::VertexingError;
use crate::fitter_state::FitterState;
use crate::types::{Vertex, VertexHandle};
use tracing::warn;

/// Weight contamination Σw(1−w)/Σw² of a candidate, 0 without weight.
pub fn contamination(state: &FitterState, vertex: VertexHandle) -> Result<f64, VertexingError> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for &track in state.track_links(vertex)? {
        let weight = state.track_at_vertex(track, vertex)?.weight;
        numerator += weight * (1.0 - weight);
        denominator += weight * weight;
    }

    if denominator != 0.0 {
        Ok(numerator / denominator)
    } else {
        Ok(0.0)
    }
}

/// Covariance-weighted distance between two vertices.
///
/// Uses z only unless `do_3d_splitting`, then the 3D position or, with
/// `use_time`, the full space-time position. Returns `None` when the summed
/// covariance cannot be used.
pub fn merge_significance(
    config: &FinderConfig,
    candidate: &Vertex,
    other: &Vertex,
) -> Option<f64> {
    if !config.do_3d_splitting {
        let sum_var_z = candidate.covariance[(2, 2)] + other.covariance[(2, 2)];
        if sum_var_z <= 0.0 {
            warn!("Summed z variance {} of vertex pair is not positive, skipping", sum_var_z);
            return None;
        }
        return Some((candidate.z() - other.z()).abs() / sum_var_z.sqrt());
    }

    let distance2 = if config.use_time {
        let delta = candidate.position - other.position;
        let Some(inverse) = (candidate.covariance + other.covariance).try_inverse() else {
            warn!("Summed 4D vertex covariance is singular, skipping pair");
            return None;
        };
        (delta.transpose() * inverse * delta)[(0, 0)]
    } else {
        let delta = candidate.position3() - other.position3();
        let Some(inverse) = (candidate.covariance3() + other.covariance3()).try_inverse() else {
            warn!("Summed 3D vertex covariance is singular, skipping pair");
            return None;
        };
        (delta.transpose() * inverse * delta)[(0, 0)]
    };

    Some(distance2.max(0.0).sqrt())
}

/// Whether the candidate sits too close to any of the `accepted` vertices.
pub fn is_merged_vertex(
    config: &FinderConfig,
    state: &FitterState,
    vertex: VertexHandle,
    accepted: &[VertexHandle],
) -> Result<bool, VertexingError> {
    let candidate = state.vertex(vertex)?;
    for &other in accepted {
        if other == vertex {
            continue;
        }
        let Some(significance) = merge_significance(config, candidate, state.vertex(other)?) else {
            continue;
        };
        if significance < config.max_merge_vertex_significance {
            return Ok(true);
        }
    }
    Ok(false)
}

/// A good candidate is kept unless it is contaminated or merged.
pub fn keep_new_vertex(
    config: &FinderConfig,
    state: &FitterState,
    vertex: VertexHandle,
    accepted: &[VertexHandle],
) -> Result<bool, VertexingError> {
    if contamination(state, vertex)? > config.maximum_vertex_contamination {
        return Ok(false);
    }
    Ok(!is_merged_vertex(config, state, vertex, accepted)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cluster;
    use crate::types::{TrackAtVertex, TrackHandle, VertexInfo};
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Vector4};

    fn weighted_vertex(
        state: &mut FitterState,
        z: f64,
        var_z: f64,
        weights: &[f64],
    ) -> VertexHandle {
        let inputs = cluster(z, weights.len(), 0.05);
        let mut covariance = Matrix4::identity() * 1e-4;
        covariance[(2, 2)] = var_z;
        let vertex = Vertex::new(Vector4::new(0.0, 0.0, z, 0.0), covariance);
        let handle = state.insert_vertex(vertex.clone());
        let mut info = VertexInfo::new(vertex, Vector4::new(0.0, 0.0, z, 0.0));
        for (i, &w) in weights.iter().enumerate() {
            let mut tv = TrackAtVertex::new(TrackHandle(i), inputs[i].clone());
            tv.weight = w;
            info.track_links.push(TrackHandle(i));
            state.tracks_at_vertices.insert((TrackHandle(i), handle), tv);
        }
        state.vtx_info_map.insert(handle, info);
        handle
    }

    #[test]
    fn test_contamination() {
        let mut state = FitterState::new();
        let clean = weighted_vertex(&mut state, 0.0, 0.01, &[1.0, 1.0, 1.0]);
        let shared = weighted_vertex(&mut state, 0.0, 0.01, &[0.5, 0.5]);
        let empty = weighted_vertex(&mut state, 0.0, 0.01, &[0.0, 0.0]);

        assert_eq!(contamination(&state, clean).unwrap(), 0.0);
        assert_relative_eq!(contamination(&state, shared).unwrap(), 1.0);
        assert_eq!(contamination(&state, empty).unwrap(), 0.0);
    }

    #[test]
    fn test_z_merge_significance() {
        let config = FinderConfig::default();
        let a = Vertex::new(Vector4::new(0.0, 0.0, 0.0, 0.0), Matrix4::identity() * 0.005);
        let b = Vertex::new(Vector4::new(0.0, 0.0, 0.05, 0.0), Matrix4::identity() * 0.005);
        assert_relative_eq!(merge_significance(&config, &a, &b).unwrap(), 0.5, epsilon = 1e-12);

        let point = Vertex::at(Vector4::zeros());
        assert!(merge_significance(&config, &point, &point).is_none());
    }

    #[test]
    fn test_3d_and_4d_merge_significance() {
        let mut config = FinderConfig {
            do_3d_splitting: true,
            ..Default::default()
        };
        let a = Vertex::new(Vector4::new(0.0, 0.0, 0.0, 0.0), Matrix4::identity() * 0.5);
        let b = Vertex::new(Vector4::new(1.0, 0.0, 0.0, 3.0), Matrix4::identity() * 0.5);
        assert_relative_eq!(merge_significance(&config, &a, &b).unwrap(), 1.0, epsilon = 1e-12);

        config.use_time = true;
        assert_relative_eq!(
            merge_significance(&config, &a, &b).unwrap(),
            10.0_f64.sqrt(),
            epsilon = 1e-12
        );

        // Singular sum is skipped
        let point = Vertex::at(Vector4::zeros());
        assert!(merge_significance(&config, &point, &point).is_none());
    }

    #[test]
    fn test_keep_new_vertex() {
        let config = FinderConfig::default();
        let mut state = FitterState::new();
        let first = weighted_vertex(&mut state, 0.0, 0.01, &[1.0, 1.0]);
        let close = weighted_vertex(&mut state, 0.05, 0.01, &[1.0, 1.0]);
        let far = weighted_vertex(&mut state, 30.0, 0.01, &[1.0, 1.0]);
        let contaminated = weighted_vertex(&mut state, 60.0, 0.01, &[0.5, 0.5]);

        assert!(is_merged_vertex(&config, &state, close, &[first]).unwrap());
        assert!(!is_merged_vertex(&config, &state, first, &[first]).unwrap());

        assert!(!keep_new_vertex(&config, &state, close, &[first]).unwrap());
        assert!(keep_new_vertex(&config, &state, far, &[first]).unwrap());
        assert!(!keep_new_vertex(&config, &state, contaminated, &[first, far]).unwrap());
    }
}
