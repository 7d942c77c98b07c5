//! Track and state builders shared by the unit tests.

use crate::fitter_state::FitterState;
use crate::traits::TrackSet;
use crate::types::{TrackAtVertex, TrackHandle, TrackParameters, Vertex, VertexHandle, VertexInfo};
use nalgebra::{Matrix4, Matrix6, Vector3, Vector4, Vector6};

/// Straight-line track through `vertex` with the given direction and
/// d0/z0 resolution.
pub fn track_through(vertex: &Vector3<f64>, phi: f64, theta: f64, sigma: f64) -> TrackParameters {
    let (sin_phi, cos_phi) = phi.sin_cos();
    let lambda = -(vertex.x * cos_phi + vertex.y * sin_phi);
    let pca = vertex + Vector3::new(cos_phi, sin_phi, 1.0 / theta.tan()) * lambda;
    let d0 = -pca.x * sin_phi + pca.y * cos_phi;
    let sigma2 = sigma * sigma;

    TrackParameters::new(
        Vector6::new(d0, pca.z, phi, theta, 1e-3, 0.0),
        Matrix6::from_diagonal(&Vector6::new(sigma2, sigma2, 1e-8, 1e-8, 1e-10, 1.0)),
    )
}

/// `n` tracks from (0, 0, z) spread in phi and theta, with small alternating
/// z0 offsets.
pub fn cluster(z: f64, n: usize, sigma: f64) -> Vec<TrackParameters> {
    (0..n)
        .map(|i| {
            let phi = 0.1 + i as f64 * std::f64::consts::TAU / n.max(1) as f64;
            let theta = 0.8 + 0.1 * (i % 5) as f64;
            let mut track = track_through(&Vector3::new(0.0, 0.0, z), phi, theta, sigma);
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            track.parameters[crate::types::Z0] += sign * 0.3 * sigma;
            track
        })
        .collect()
}

/// Beam spot at the origin, narrow in x/y and wide in z.
pub fn beam_spot() -> Vertex {
    Vertex::new(
        Vector4::zeros(),
        Matrix4::from_diagonal(&Vector4::new(0.01 * 0.01, 0.01 * 0.01, 100.0 * 100.0, 1.0)),
    )
}

/// Inserts a candidate at `seed` linked to the given tracks and registers it
/// in the multi-map, the way the finder prepares a candidate.
pub fn register_candidate(
    state: &mut FitterState,
    tracks: &TrackSet<'_>,
    seed: Vector4<f64>,
    constraint: &Vertex,
    links: &[usize],
) -> VertexHandle {
    let handle = state.insert_vertex(Vertex::new(seed, constraint.covariance));
    let mut info = VertexInfo::new(constraint.clone(), seed);
    for &index in links {
        let track = TrackHandle(index);
        let params = tracks.get(track).expect("track index in range").clone();
        info.track_links.push(track);
        state
            .tracks_at_vertices
            .insert((track, handle), TrackAtVertex::new(track, params));
    }
    state.vtx_info_map.insert(handle, info);
    state.add_vertex_to_multi_map(handle).expect("info was just inserted");
    handle
}
