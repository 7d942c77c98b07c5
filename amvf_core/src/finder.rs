//! The adaptive multi-vertex finder.
//!
//! Greedy iterative vertex finding:
//! 1. the seed finder proposes a candidate from the remaining seed tracks,
//! 2. compatible tracks are attached (with nearest-z recovery),
//! 3. the candidate is fit together with every accepted vertex it shares
//!    tracks with,
//! 4. its compatible tracks leave the seed set,
//! 5. the candidate is kept unless it is bad, contaminated or merged with an
//!    accepted vertex, in which case it is removed and the rest refit.
//!
//! The loop ends when the seed set is exhausted, the seeder has nothing left,
//! a candidate cannot be prepared, no seed track can be removed, or after
//! `max_iterations` iterations.

use crate::acceptance::keep_new_vertex;
use crate::compatibility::{
    check_vertex_and_compatible_tracks, remove_compatible_tracks_from_seed_tracks,
    remove_track_if_incompatible,
};
use crate::config::{FinderConfig, VertexingOptions};
use crate::error::VertexingError;
use crate::fitter_state::FitterState;
use crate::impact_point::StraightLineEstimator;
use crate::selection::TrackSelector;
use crate::traits::{ImpactPointEstimator, InputTrack, MultiVertexFitter, SeedFinder, TrackSet};
use crate::types::{TrackHandle, Vertex, VertexHandle};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Why the finder loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Too few seed tracks left to form a vertex
    SeedTracksExhausted,
    /// `max_iterations` reached
    MaxIterations,
    /// The seeder returned the constraint position (or nothing)
    NoMoreSeeds,
    /// A candidate ended up without tracks
    CannotPrepare,
    /// No seed track could be removed after an unproductive candidate
    NoRemovableTrack,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StopReason::SeedTracksExhausted => "seed tracks exhausted",
            StopReason::MaxIterations => "max iterations",
            StopReason::NoMoreSeeds => "no more seeds",
            StopReason::CannotPrepare => "cannot prepare candidate",
            StopReason::NoRemovableTrack => "no removable track",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one finder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FinderRun {
    /// Accepted vertices in acceptance order, with their tracks attached
    pub vertices: Vec<Vertex>,
    /// Completed iterations
    pub iterations: usize,
    /// Candidates that were fit and then rejected
    pub rejected_candidates: usize,
    pub stop_reason: StopReason,
}

/// Adaptive multi-vertex finder over a seed finder `S`, a multi-vertex
/// fitter `F` and an impact-point estimator `E`.
#[derive(Debug, Clone)]
pub struct AdaptiveMultiVertexFinder<S, F, E = StraightLineEstimator> {
    config: FinderConfig,
    seed_finder: S,
    fitter: F,
    estimator: E,
    /// Seeder consumes removed-track hints
    feeds_removed_tracks: bool,
}

impl<S, F, E> AdaptiveMultiVertexFinder<S, F, E>
where
    S: SeedFinder,
    F: MultiVertexFitter,
    E: ImpactPointEstimator,
{
    pub fn new(config: FinderConfig, seed_finder: S, fitter: F, estimator: E) -> Self {
        Self {
            config,
            seed_finder,
            fitter,
            estimator,
            feeds_removed_tracks: S::ACCEPTS_REMOVED_TRACKS,
        }
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn seed_finder(&self) -> &S {
        &self.seed_finder
    }

    /// Finds vertices with a fresh seeder state.
    pub fn find<T: InputTrack>(
        &self,
        all_tracks: &[T],
        options: &VertexingOptions,
    ) -> Result<Vec<Vertex>, VertexingError> {
        let mut seed_state = S::State::default();
        self.find_with_state(all_tracks, options, &mut seed_state)
    }

    /// Finds vertices, keeping the seeder state in the caller's hands.
    pub fn find_with_state<T: InputTrack>(
        &self,
        all_tracks: &[T],
        options: &VertexingOptions,
        seed_state: &mut S::State,
    ) -> Result<Vec<Vertex>, VertexingError> {
        Ok(self.run(all_tracks, options, seed_state)?.vertices)
    }

    /// Runs the finder loop and reports how it ended.
    pub fn run<T: InputTrack>(
        &self,
        all_tracks: &[T],
        options: &VertexingOptions,
        seed_state: &mut S::State,
    ) -> Result<FinderRun, VertexingError> {
        if all_tracks.is_empty() {
            return Err(VertexingError::EmptyInput);
        }

        let tracks = TrackSet::new(all_tracks);
        let orig_tracks: Vec<TrackHandle> = tracks.handles().collect();
        let mut seed_tracks = orig_tracks.clone();
        let mut removed_seed_tracks: Vec<TrackHandle> = Vec::new();

        let mut state = FitterState::new();
        let mut all_vertices: Vec<VertexHandle> = Vec::new();

        let mut seed_options = options.clone();
        seed_options.use_constraint_in_fit = self.config.use_seed_constraint;

        let selector = TrackSelector {
            config: &self.config,
            estimator: &self.estimator,
            tracks: &tracks,
            options,
        };

        let mut iteration = 0;
        let mut rejected_candidates = 0;

        let stop_reason = loop {
            let enough_seeds = (self.config.add_single_track_vertices && !seed_tracks.is_empty())
                || seed_tracks.len() > 1;
            if !enough_seeds {
                break StopReason::SeedTracksExhausted;
            }
            if iteration >= self.config.max_iterations {
                break StopReason::MaxIterations;
            }

            let search_tracks = if self.config.do_real_multi_vertex {
                orig_tracks.clone()
            } else {
                seed_tracks.clone()
            };

            let mut current_constraint = options.constraint.clone();
            let Some(seed) = self.do_seeding(
                &tracks,
                &seed_tracks,
                &mut removed_seed_tracks,
                &mut current_constraint,
                &seed_options,
                options.use_constraint_in_fit,
                seed_state,
            )?
            else {
                debug!("Seed finder returned no candidate, stopping");
                break StopReason::NoMoreSeeds;
            };
            debug!(
                "Iteration {}: candidate after seeding at {:?}",
                iteration,
                seed.position.as_slice()
            );

            // Exact comparison: the seeder signals exhaustion by returning the constraint
            if seed.z() == options.constraint.z() {
                debug!("No seed found anymore, stopping");
                break StopReason::NoMoreSeeds;
            }

            let candidate = state.insert_vertex(seed);
            if !selector.can_prepare_vertex_for_fit(
                &mut state,
                candidate,
                &current_constraint,
                &seed_tracks,
                &search_tracks,
            )? {
                debug!("Could not prepare {} for fit, stopping", candidate);
                state.remove_vertex(candidate)?;
                break StopReason::CannotPrepare;
            }

            state.add_vertex_to_multi_map(candidate)?;
            self.fitter
                .add_vertex_to_fit(&mut state, candidate, &tracks, options)?;
            debug!(
                "{} after fit at {:?} with {} tracks",
                candidate,
                state.vertex(candidate)?.position.as_slice(),
                state.track_links(candidate)?.len()
            );

            let (n_compatible, is_good) = check_vertex_and_compatible_tracks(
                &self.config,
                &state,
                candidate,
                &seed_tracks,
                options.use_constraint_in_fit,
            )?;
            debug!(
                "{} has {} compatible seed tracks, good: {}",
                candidate, n_compatible, is_good
            );

            if n_compatible > 0 {
                remove_compatible_tracks_from_seed_tracks(
                    &self.config,
                    &state,
                    candidate,
                    &mut seed_tracks,
                    &mut removed_seed_tracks,
                )?;
            } else if !remove_track_if_incompatible(
                &state,
                candidate,
                &tracks,
                &options.geo_context,
                &mut seed_tracks,
                &mut removed_seed_tracks,
            )? {
                debug!("Could not remove any further seed track, stopping");
                self.delete_last_vertex(&mut state, candidate, &tracks, options)?;
                break StopReason::NoRemovableTrack;
            }

            let keep = is_good && keep_new_vertex(&self.config, &state, candidate, &all_vertices)?;
            if keep {
                debug!("Accepted {}", candidate);
                all_vertices.push(candidate);
            } else {
                debug!("Rejected {}", candidate);
                rejected_candidates += 1;
                self.delete_last_vertex(&mut state, candidate, &tracks, options)?;
            }

            iteration += 1;
        };

        let vertices = Self::vertex_output_list(&state, &all_vertices)?;
        info!(
            "Found {} vertices from {} tracks in {} iterations ({})",
            vertices.len(),
            orig_tracks.len(),
            iteration,
            stop_reason
        );

        Ok(FinderRun {
            vertices,
            iterations: iteration,
            rejected_candidates,
            stop_reason,
        })
    }

    /// Runs the seed finder and adapts the constraint to the seed.
    ///
    /// Returns `None` when the seeder proposed nothing.
    #[allow(clippy::too_many_arguments)]
    fn do_seeding(
        &self,
        tracks: &TrackSet<'_>,
        seed_tracks: &[TrackHandle],
        removed_seed_tracks: &mut Vec<TrackHandle>,
        current_constraint: &mut Vertex,
        seed_options: &VertexingOptions,
        use_constraint_in_fit: bool,
        seed_state: &mut S::State,
    ) -> Result<Option<Vertex>, VertexingError> {
        if self.feeds_removed_tracks {
            S::set_removed_tracks(seed_state, removed_seed_tracks);
        }

        let seeds = self
            .seed_finder
            .find_seeds(tracks, seed_tracks, seed_options, seed_state)?;
        removed_seed_tracks.clear();

        let Some(mut seed) = seeds.into_iter().last() else {
            return Ok(None);
        };
        self.set_constraint_after_seeding(current_constraint, use_constraint_in_fit, &mut seed);
        Ok(Some(seed))
    }

    /// Adapts the fit constraint (and the seed covariance) to a new seed.
    pub fn set_constraint_after_seeding(
        &self,
        current_constraint: &mut Vertex,
        use_constraint_in_fit: bool,
        seed: &mut Vertex,
    ) {
        if use_constraint_in_fit {
            if self.config.use_seed_constraint {
                current_constraint.position = seed.position;
                current_constraint.covariance = seed.covariance;
            } else {
                seed.covariance = current_constraint.covariance;
            }
        } else {
            current_constraint.position = seed.position;
            current_constraint.covariance = Matrix4::identity() * self.config.loose_constr_value;
            current_constraint.fit_quality = self.config.default_constr_fit_quality;
        }
    }

    /// Removes a candidate from every index and refits what is left.
    fn delete_last_vertex(
        &self,
        state: &mut FitterState,
        candidate: VertexHandle,
        tracks: &TrackSet<'_>,
        options: &VertexingOptions,
    ) -> Result<(), VertexingError> {
        state.remove_vertex(candidate)?;
        if !state.vertex_collection.is_empty() {
            self.fitter.fit(state, tracks, options)?;
        }
        Ok(())
    }

    /// Copies of the accepted vertices with their tracks attached.
    fn vertex_output_list(
        state: &FitterState,
        accepted: &[VertexHandle],
    ) -> Result<Vec<Vertex>, VertexingError> {
        accepted
            .iter()
            .map(|&handle| {
                let mut vertex = state.vertex(handle)?.clone();
                vertex.tracks = state
                    .track_links(handle)?
                    .iter()
                    .map(|&track| state.track_at_vertex(track, handle).cloned())
                    .collect::<Result<_, _>>()?;
                Ok(vertex)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptance::merge_significance;
    use crate::fitter::AdaptiveMultiVertexFitter;
    use crate::seeding::{GridDensitySeedFinder, TrackDensitySeedFinder};
    use crate::test_utils::{beam_spot, cluster, track_through};
    use crate::types::TrackParameters;
    use approx::assert_relative_eq;
    use nalgebra::{Vector3, Vector4};
    use std::cell::Cell;

    type DensityFinder =
        AdaptiveMultiVertexFinder<TrackDensitySeedFinder, AdaptiveMultiVertexFitter>;

    fn density_finder(config: FinderConfig) -> DensityFinder {
        AdaptiveMultiVertexFinder::new(
            config,
            TrackDensitySeedFinder::default(),
            AdaptiveMultiVertexFitter::default(),
            StraightLineEstimator,
        )
    }

    fn two_clusters() -> Vec<TrackParameters> {
        let mut tracks = cluster(0.0, 10, 0.05);
        tracks.extend(cluster(30.0, 10, 0.05));
        tracks
    }

    /// Seeds at the z of the first remaining seed track and records the
    /// removed-track hints it was handed.
    #[derive(Debug, Default)]
    struct RecordingSeeder;

    #[derive(Debug, Default)]
    struct RecordingState {
        pending: Vec<TrackHandle>,
        hints: Vec<Vec<TrackHandle>>,
    }

    impl SeedFinder for RecordingSeeder {
        type State = RecordingState;
        const ACCEPTS_REMOVED_TRACKS: bool = true;

        fn find_seeds(
            &self,
            tracks: &TrackSet<'_>,
            seed_tracks: &[TrackHandle],
            options: &VertexingOptions,
            state: &mut Self::State,
        ) -> Result<Vec<Vertex>, VertexingError> {
            state.hints.push(std::mem::take(&mut state.pending));
            let Some(&first) = seed_tracks.first() else {
                return Ok(vec![options.constraint.clone()]);
            };
            let z = tracks.get(first)?.z0();
            Ok(vec![Vertex::new(Vector4::new(0.0, 0.0, z, 0.0), options.constraint.covariance)])
        }

        fn set_removed_tracks(state: &mut Self::State, removed: &[TrackHandle]) {
            state.pending = removed.to_vec();
        }
    }

    /// Always proposes the constraint.
    #[derive(Debug, Default)]
    struct ExhaustedSeeder;

    impl SeedFinder for ExhaustedSeeder {
        type State = ();

        fn find_seeds(
            &self,
            _tracks: &TrackSet<'_>,
            _seed_tracks: &[TrackHandle],
            options: &VertexingOptions,
            _state: &mut (),
        ) -> Result<Vec<Vertex>, VertexingError> {
            Ok(vec![options.constraint.clone()])
        }
    }

    /// Proposes the listed z positions in order, then the constraint.
    #[derive(Debug)]
    struct ScriptedSeeder(Vec<f64>);

    impl SeedFinder for ScriptedSeeder {
        type State = usize;

        fn find_seeds(
            &self,
            _tracks: &TrackSet<'_>,
            _seed_tracks: &[TrackHandle],
            options: &VertexingOptions,
            calls: &mut usize,
        ) -> Result<Vec<Vertex>, VertexingError> {
            let seed = match self.0.get(*calls) {
                Some(&z) => Vertex::new(
                    Vector4::new(0.0, 0.0, z, 0.0),
                    options.constraint.covariance,
                ),
                None => options.constraint.clone(),
            };
            *calls += 1;
            Ok(vec![seed])
        }
    }

    /// Counts the refits of the vertices left after a deletion.
    #[derive(Debug, Default)]
    struct CountingFitter {
        inner: AdaptiveMultiVertexFitter,
        refits: Cell<usize>,
    }

    impl MultiVertexFitter for CountingFitter {
        fn add_vertex_to_fit(
            &self,
            state: &mut FitterState,
            vertex: VertexHandle,
            tracks: &TrackSet<'_>,
            options: &VertexingOptions,
        ) -> Result<(), VertexingError> {
            self.inner.add_vertex_to_fit(state, vertex, tracks, options)
        }

        fn fit(
            &self,
            state: &mut FitterState,
            tracks: &TrackSet<'_>,
            options: &VertexingOptions,
        ) -> Result<(), VertexingError> {
            self.refits.set(self.refits.get() + 1);
            self.inner.fit(state, tracks, options)
        }
    }

    #[test]
    fn test_empty_input() {
        let finder = density_finder(FinderConfig::default());
        let options = VertexingOptions::with_constraint(beam_spot());
        let result = finder.find::<TrackParameters>(&[], &options);
        assert_eq!(result, Err(VertexingError::EmptyInput));
    }

    #[test]
    fn test_two_separated_clusters() {
        let finder = density_finder(FinderConfig::default());
        let options = VertexingOptions::with_constraint(beam_spot());
        let inputs = two_clusters();

        let run = finder.run(&inputs, &options, &mut ()).unwrap();
        assert_eq!(run.vertices.len(), 2);
        assert_eq!(run.stop_reason, StopReason::SeedTracksExhausted);
        assert_eq!(run.rejected_candidates, 0);

        let mut zs: Vec<f64> = run.vertices.iter().map(Vertex::z).collect();
        zs.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(zs[0], 0.0, epsilon = 0.2);
        assert_relative_eq!(zs[1], 30.0, epsilon = 0.2);

        let config = finder.config();
        for vertex in &run.vertices {
            assert_eq!(vertex.tracks.len(), 10);
        }
        let pair = merge_significance(config, &run.vertices[0], &run.vertices[1]).unwrap();
        assert!(pair >= config.max_merge_vertex_significance);
    }

    #[test]
    fn test_find_is_deterministic() {
        let finder = density_finder(FinderConfig::default());
        let options = VertexingOptions::with_constraint(beam_spot());
        let inputs = two_clusters();

        let first = finder.find(&inputs, &options).unwrap();
        let second = finder.find(&inputs, &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_iterations_bounds_the_loop() {
        let finder = density_finder(FinderConfig {
            max_iterations: 1,
            ..Default::default()
        });
        let options = VertexingOptions::with_constraint(beam_spot());
        let inputs = two_clusters();

        let run = finder.run(&inputs, &options, &mut ()).unwrap();
        assert_eq!(run.iterations, 1);
        assert_eq!(run.vertices.len(), 1);
        assert_eq!(run.stop_reason, StopReason::MaxIterations);
    }

    #[test]
    fn test_constraint_seed_stops_immediately() {
        let finder = AdaptiveMultiVertexFinder::new(
            FinderConfig::default(),
            ExhaustedSeeder,
            AdaptiveMultiVertexFitter::<StraightLineEstimator>::default(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(beam_spot());
        let inputs = two_clusters();

        let run = finder.run(&inputs, &options, &mut ()).unwrap();
        assert!(run.vertices.is_empty());
        assert_eq!(run.iterations, 0);
        assert_eq!(run.stop_reason, StopReason::NoMoreSeeds);
    }

    #[test]
    fn test_removed_tracks_reach_capable_seeder() {
        let finder = AdaptiveMultiVertexFinder::new(
            FinderConfig::default(),
            RecordingSeeder,
            AdaptiveMultiVertexFitter::<StraightLineEstimator>::default(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(beam_spot());
        let inputs = two_clusters();

        let mut state = RecordingState::default();
        let vertices = finder.find_with_state(&inputs, &options, &mut state).unwrap();
        assert_eq!(vertices.len(), 2);

        // First call sees no hint, the second the first cluster's tracks
        assert!(state.hints[0].is_empty());
        let expected: Vec<TrackHandle> = (0..10).map(TrackHandle).collect();
        assert_eq!(state.hints[1], expected);
    }

    #[test]
    fn test_grid_seeder_finds_both_clusters() {
        let finder = AdaptiveMultiVertexFinder::new(
            FinderConfig::default(),
            GridDensitySeedFinder::default(),
            AdaptiveMultiVertexFitter::<StraightLineEstimator>::default(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(beam_spot());
        let vertices = finder.find(&two_clusters(), &options).unwrap();
        assert_eq!(vertices.len(), 2);
    }

    #[test]
    fn test_accepted_vertices_are_clean() {
        let config = FinderConfig::default();
        let finder = density_finder(config.clone());
        let options = VertexingOptions::with_constraint(beam_spot());
        let mut inputs = two_clusters();
        inputs.extend(cluster(0.05, 10, 0.1));

        let vertices = finder.find(&inputs, &options).unwrap();
        for (i, a) in vertices.iter().enumerate() {
            let weights: Vec<f64> = a.tracks.iter().map(|t| t.weight).collect();
            let num: f64 = weights.iter().map(|w| w * (1.0 - w)).sum();
            let den: f64 = weights.iter().map(|w| w * w).sum();
            if den > 0.0 {
                assert!(num / den <= config.maximum_vertex_contamination);
            }
            for b in &vertices[i + 1..] {
                if let Some(s) = merge_significance(&config, a, b) {
                    assert!(s >= config.max_merge_vertex_significance);
                }
            }
        }
    }

    #[test]
    fn test_set_constraint_after_seeding() {
        let beam = beam_spot();
        let seed_position = Vector4::new(0.1, 0.2, 5.0, 0.3);
        let seed_covariance = Matrix4::identity() * 2.0;

        // Constraint in fit, seed constraint: constraint follows the seed
        let finder = density_finder(FinderConfig::default());
        let mut constraint = beam.clone();
        let mut seed = Vertex::new(seed_position, seed_covariance);
        finder.set_constraint_after_seeding(&mut constraint, true, &mut seed);
        assert_eq!(constraint.position, seed_position);
        assert_eq!(constraint.covariance, seed_covariance);

        // Constraint in fit, no seed constraint: seed takes the beam covariance
        let finder = density_finder(FinderConfig {
            use_seed_constraint: false,
            ..Default::default()
        });
        let mut constraint = beam.clone();
        let mut seed = Vertex::new(seed_position, seed_covariance);
        finder.set_constraint_after_seeding(&mut constraint, true, &mut seed);
        assert_eq!(constraint, beam);
        assert_eq!(seed.position, seed_position);
        assert_eq!(seed.covariance, beam.covariance);

        // No constraint in fit: loose constraint at the seed
        let finder = density_finder(FinderConfig::default());
        let mut constraint = beam.clone();
        let mut seed = Vertex::new(seed_position, seed_covariance);
        finder.set_constraint_after_seeding(&mut constraint, false, &mut seed);
        assert_eq!(constraint.position, seed_position);
        assert_eq!(constraint.covariance, Matrix4::identity() * 1e8);
        assert_eq!(constraint.fit_quality.ndf, -3.0);
    }

    #[test]
    fn test_overlapping_clusters_give_one_vertex() {
        let finder = density_finder(FinderConfig::default());
        let options = VertexingOptions::with_constraint(beam_spot());
        let mut inputs = cluster(0.0, 10, 0.1);
        inputs.extend(cluster(0.05, 10, 0.1));

        let run = finder.run(&inputs, &options, &mut ()).unwrap();
        assert_eq!(run.vertices.len(), 1);
        assert_relative_eq!(run.vertices[0].z(), 0.025, epsilon = 0.1);
        assert!(run.vertices[0]
            .tracks
            .iter()
            .all(|t| (0.0..=1.0).contains(&t.weight)));
    }

    #[test]
    fn test_unbounded_windows_link_every_track() {
        let finder = density_finder(FinderConfig {
            max_iterations: 1,
            tracks_max_z_interval: f64::INFINITY,
            tracks_max_significance: f64::INFINITY,
            ..Default::default()
        });
        let options = VertexingOptions::with_constraint(beam_spot());
        let inputs = two_clusters();

        let run = finder.run(&inputs, &options, &mut ()).unwrap();
        assert_eq!(run.vertices.len(), 1);
        let mut linked: Vec<TrackHandle> = run.vertices[0].tracks.iter().map(|t| t.track).collect();
        linked.sort();
        assert_eq!(linked, (0..inputs.len()).map(TrackHandle).collect::<Vec<_>>());
    }

    #[test]
    fn test_merged_candidate_is_removed_and_rest_refit() {
        // The second seed sits between the clusters, so the candidate shares
        // the first vertex's tracks and is fit together with it
        let finder = AdaptiveMultiVertexFinder::new(
            FinderConfig {
                tracks_max_z_interval: 0.35,
                max_merge_vertex_significance: 100.0,
                ..Default::default()
            },
            ScriptedSeeder(vec![0.01, 0.25]),
            CountingFitter::default(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(beam_spot());
        let mut inputs = cluster(0.0, 10, 0.2);
        inputs.extend(cluster(0.5, 10, 0.2));

        let run = finder.run(&inputs, &options, &mut 0).unwrap();
        assert_eq!(run.rejected_candidates, 1);
        assert_eq!(finder.fitter.refits.get(), 1);

        assert_eq!(run.vertices.len(), 1);
        let survivor = &run.vertices[0];
        assert_relative_eq!(survivor.z(), 0.0, epsilon = 0.1);
        let mut linked: Vec<TrackHandle> = survivor.tracks.iter().map(|t| t.track).collect();
        linked.sort();
        assert_eq!(linked, (0..10).map(TrackHandle).collect::<Vec<_>>());
        assert!(survivor.fit_quality.ndf > 0.0);
        assert!(survivor.tracks.iter().all(|t| t.weight > 0.5));
    }

    #[test]
    fn test_unpreparable_candidate_stops_the_loop() {
        // 5 mm from the beam line: incompatible with any beam-line candidate
        let inputs: Vec<TrackParameters> = [10.0, 12.0, 14.0]
            .iter()
            .map(|&z| track_through(&Vector3::new(0.0, 5.0, z), 0.0, 1.0, 0.05))
            .collect();
        let finder = AdaptiveMultiVertexFinder::new(
            FinderConfig::default(),
            ScriptedSeeder(vec![50.0]),
            AdaptiveMultiVertexFitter::<StraightLineEstimator>::default(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(beam_spot());

        let run = finder.run(&inputs, &options, &mut 0).unwrap();
        assert_eq!(run.stop_reason, StopReason::CannotPrepare);
        assert!(run.vertices.is_empty());
        assert_eq!(run.iterations, 0);
        assert_eq!(run.rejected_candidates, 0);
    }
}
