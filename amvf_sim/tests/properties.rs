//! Property tests for the finder on generated events.

use amvf_core::{
    AdaptiveMultiVertexFinder, AdaptiveMultiVertexFitter, FinderConfig, FinderRun,
    StraightLineEstimator, TrackDensitySeedFinder, VertexingOptions,
};
use amvf_sim::EventGenerator;
use proptest::prelude::*;

/// Vertices 25 mm apart starting at z = -40.
fn separated_event(seed: u64, n_vertices: usize, n_tracks: usize) -> EventGenerator {
    let mut generator = EventGenerator::new(seed).unwrap();
    for i in 0..n_vertices {
        generator
            .add_vertex_at_z(-40.0 + 25.0 * i as f64, n_tracks)
            .unwrap();
    }
    generator
}

fn run(generator: &EventGenerator, max_iterations: usize) -> FinderRun {
    let config = FinderConfig {
        max_iterations,
        ..Default::default()
    };
    let finder = AdaptiveMultiVertexFinder::new(
        config,
        TrackDensitySeedFinder::default(),
        AdaptiveMultiVertexFitter::<StraightLineEstimator>::default(),
        StraightLineEstimator,
    );
    let options = VertexingOptions::with_constraint(generator.beam_spot());
    finder
        .run(generator.tracks(), &options, &mut ())
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_same_seed_same_output(seed in any::<u64>(), n_vertices in 1usize..4) {
        let first = run(&separated_event(seed, n_vertices, 6), 100);
        let second = run(&separated_event(seed, n_vertices, 6), 100);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_iterations_bounded(seed in any::<u64>(), max_iterations in 1usize..6) {
        let generator = separated_event(seed, 4, 6);
        let result = run(&generator, max_iterations);
        prop_assert!(result.iterations <= max_iterations);
        prop_assert!(result.vertices.len() <= result.iterations);
    }

    #[test]
    fn prop_more_iterations_never_lose_vertices(seed in any::<u64>(), max_iterations in 1usize..5) {
        let generator = separated_event(seed, 4, 6);
        let fewer = run(&generator, max_iterations);
        let more = run(&generator, max_iterations + 1);
        prop_assert!(fewer.vertices.len() <= more.vertices.len());
    }

    #[test]
    fn prop_vertices_keep_tracks(
        seed in any::<u64>(),
        n_vertices in 1usize..4,
        n_tracks in 4usize..10,
    ) {
        let generator = separated_event(seed, n_vertices, n_tracks);
        let result = run(&generator, 100);
        for vertex in &result.vertices {
            prop_assert!(!vertex.tracks.is_empty());
        }
    }
}
