//! Post-fit classification of a candidate's tracks and seed-set maintenance.

use crate::config::FinderConfig;
use crate::error::VertexingError;
use crate::fitter_state::FitterState;
use crate::traits::TrackSet;
use crate::types::{GeometryContext, TrackAtVertex, TrackHandle, VertexHandle};
use tracing::debug;

/// Whether a fitted track counts as belonging to its vertex.
pub fn is_compatible(config: &FinderConfig, trk_at_vtx: &TrackAtVertex) -> bool {
    if config.use_fast_compatibility {
        trk_at_vtx.vertex_compatibility < config.max_vertex_chi2
    } else {
        trk_at_vtx.weight > config.min_weight && trk_at_vtx.chi2 < config.max_vertex_chi2
    }
}

/// Counts the compatible tracks that are still seed tracks and decides
/// whether the candidate is good enough to keep.
///
/// Tracks attached from outside the seed set do not count.
pub fn check_vertex_and_compatible_tracks(
    config: &FinderConfig,
    state: &FitterState,
    vertex: VertexHandle,
    seed_tracks: &[TrackHandle],
    use_constraint_in_fit: bool,
) -> Result<(usize, bool), VertexingError> {
    let mut n_compatible = 0;
    for &track in state.track_links(vertex)? {
        let trk_at_vtx = state.track_at_vertex(track, vertex)?;
        if is_compatible(config, trk_at_vtx) && seed_tracks.contains(&track) {
            n_compatible += 1;
        }
    }

    let is_good = (config.add_single_track_vertices && use_constraint_in_fit && n_compatible >= 1)
        || n_compatible >= 2;

    Ok((n_compatible, is_good))
}

/// Moves every compatible track of `vertex` from the seed set to `removed`.
pub fn remove_compatible_tracks_from_seed_tracks(
    config: &FinderConfig,
    state: &FitterState,
    vertex: VertexHandle,
    seed_tracks: &mut Vec<TrackHandle>,
    removed: &mut Vec<TrackHandle>,
) -> Result<(), VertexingError> {
    for &track in state.track_links(vertex)? {
        if !is_compatible(config, state.track_at_vertex(track, vertex)?) {
            continue;
        }
        if let Some(index) = seed_tracks.iter().position(|&t| t == track) {
            seed_tracks.remove(index);
            removed.push(track);
        }
    }
    Ok(())
}

/// Removes the single most incompatible seed track of `vertex`, or the seed
/// track nearest in z if no linked track has a positive compatibility.
///
/// Returns false when no seed track could be removed.
pub fn remove_track_if_incompatible(
    state: &FitterState,
    vertex: VertexHandle,
    tracks: &TrackSet<'_>,
    gctx: &GeometryContext,
    seed_tracks: &mut Vec<TrackHandle>,
    removed: &mut Vec<TrackHandle>,
) -> Result<bool, VertexingError> {
    let mut max_compatibility = 0.0;
    let mut worst: Option<usize> = None;
    for &track in state.track_links(vertex)? {
        let compatibility = state.track_at_vertex(track, vertex)?.vertex_compatibility;
        if compatibility > max_compatibility {
            if let Some(index) = seed_tracks.iter().position(|&t| t == track) {
                max_compatibility = compatibility;
                worst = Some(index);
            }
        }
    }

    if worst.is_none() {
        let vertex_z = state.vertex(vertex)?.z();
        let mut smallest_dz = f64::MAX;
        for (index, &track) in seed_tracks.iter().enumerate() {
            let dz = (tracks.get(track)?.position(gctx).z - vertex_z).abs();
            if dz < smallest_dz {
                smallest_dz = dz;
                worst = Some(index);
            }
        }
    }

    match worst {
        Some(index) => {
            let track = seed_tracks.remove(index);
            debug!("Removed seed track {} from {}", track, vertex);
            removed.push(track);
            Ok(true)
        }
        None => {
            debug!("No seed track left to remove for {}", vertex);
            Ok(false)
        }
    }
}
