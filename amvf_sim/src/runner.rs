//! Scenario runner - executes vertex finding scenarios.

use crate::error::SimError;
use crate::oracle::{EventGenerator, GeneratorConfig, SimTrack, TruthVertex};
use crate::scenarios::ScenarioId;
use crate::scripted::{FixedWeightFitter, ScriptedSeedFinder, ScriptedState};

use amvf_core::{
    check_output, AdaptiveFitterConfig, AdaptiveMultiVertexFinder, AdaptiveMultiVertexFitter,
    FinderConfig, FinderRun, GridDensitySeedFinder, GridDensityState, MultiVertexFitter, SeedFinder,
    StopReason, StraightLineEstimator, TrackDensitySeedFinder, TrackParameters,
    ValidationReport, Vertex, VertexingError, VertexingOptions,
};
use nalgebra::{Matrix4, Matrix6, Vector4, Vector6};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Truth-matching window (mm)
const MATCH_WINDOW: f64 = 0.5;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Input tracks
    pub track_count: usize,

    /// True vertices in the event
    pub truth_vertices: usize,

    /// Vertices returned by the finder
    pub found_vertices: usize,

    /// Completed finder iterations
    pub iterations: usize,

    /// Candidates fit and then rejected
    pub rejected_candidates: usize,

    pub stop_reason: Option<StopReason>,

    /// Fraction of true vertices found
    pub efficiency: f64,

    /// Fraction of found vertices without truth match
    pub fake_rate: f64,

    /// z residual RMS of matched vertices (mm)
    pub z_residual_rms: f64,

    /// Structural output checks that failed
    pub violations: usize,
}

/// A scenario result together with the event it was run on.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub result: ScenarioResult,
    pub truth: Vec<TruthVertex>,
    pub vertices: Vec<Vertex>,
}

/// Runs vertex finding scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Finder configuration shared by all scenarios
    config: FinderConfig,

    /// Adaptive fitter configuration
    fitter_config: AdaptiveFitterConfig,

    /// Detector description for generated events
    generator_config: GeneratorConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: FinderConfig::default(),
            fitter_config: AdaptiveFitterConfig::default(),
            generator_config: GeneratorConfig::default(),
        }
    }

    /// Sets the finder configuration.
    pub fn with_config(mut self, config: FinderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the fitter configuration.
    pub fn with_fitter_config(mut self, fitter_config: AdaptiveFitterConfig) -> Self {
        self.fitter_config = fitter_config;
        self
    }

    /// Sets the event generator configuration.
    pub fn with_generator_config(mut self, generator_config: GeneratorConfig) -> Self {
        self.generator_config = generator_config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_detailed(scenario).result
    }

    /// Runs a scenario and keeps its truth and output vertices.
    pub fn run_detailed(&self, scenario: ScenarioId) -> ScenarioOutcome {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        if let Err(e) = self.config.validate() {
            return self.failed(scenario, format!("Invalid finder configuration: {}", e));
        }

        let outcome = match scenario {
            ScenarioId::EmptyInput => self.run_empty_input(),
            ScenarioId::SingleTrack => self.run_single_track(),
            ScenarioId::TwoClusters => self.run_two_clusters(),
            ScenarioId::Overlapping => self.run_overlapping(),
            ScenarioId::Contaminated => self.run_contaminated(),
            ScenarioId::SeedAtOrigin => self.run_seed_at_origin(),
            ScenarioId::SeederExhausted => self.run_seeder_exhausted(),
            ScenarioId::Pileup => self.run_pileup(),
            ScenarioId::GridSeeding => self.run_grid_seeding(),
        };

        outcome.unwrap_or_else(|e| self.failed(scenario, e.to_string()))
    }

    fn failed(&self, scenario: ScenarioId, reason: String) -> ScenarioOutcome {
        warn!("Scenario {} could not run: {}", scenario.name(), reason);
        ScenarioOutcome {
            result: ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                failure_reason: Some(reason),
                metrics: ScenarioMetrics::default(),
            },
            truth: Vec::new(),
            vertices: Vec::new(),
        }
    }

    fn generator(&self) -> Result<EventGenerator, SimError> {
        EventGenerator::with_config(self.seed, self.generator_config.clone())
    }

    /// Adaptive fitter that fits time whenever the finder uses it.
    fn adaptive_fitter(&self) -> AdaptiveMultiVertexFitter {
        let config = AdaptiveFitterConfig {
            use_time: self.fitter_config.use_time || self.config.use_time,
            ..self.fitter_config.clone()
        };
        AdaptiveMultiVertexFitter::new(config, StraightLineEstimator)
    }

    fn density_finder(
        &self,
        config: FinderConfig,
    ) -> AdaptiveMultiVertexFinder<TrackDensitySeedFinder, AdaptiveMultiVertexFitter> {
        AdaptiveMultiVertexFinder::new(
            config,
            TrackDensitySeedFinder::default(),
            self.adaptive_fitter(),
            StraightLineEstimator,
        )
    }

    /// Runs `finder` on the generated event and evaluates it.
    fn evaluate<S, F>(
        &self,
        scenario: ScenarioId,
        finder: &AdaptiveMultiVertexFinder<S, F>,
        generator: &EventGenerator,
        options: &VertexingOptions,
        seed_state: &mut S::State,
        check: impl Fn(&FinderRun, &ValidationReport) -> Result<(), String>,
    ) -> Result<ScenarioOutcome, SimError>
    where
        S: SeedFinder,
        F: MultiVertexFitter,
    {
        let run = finder.run(generator.tracks(), options, seed_state)?;
        let report = ValidationReport::evaluate(&generator.truth_z(), &run.vertices, MATCH_WINDOW);
        let violations =
            check_output(finder.config(), &run.vertices, options.use_constraint_in_fit);
        for violation in &violations {
            debug!("  output check: {}", violation);
        }

        let metrics = ScenarioMetrics {
            track_count: generator.tracks().len(),
            truth_vertices: generator.truth().len(),
            found_vertices: run.vertices.len(),
            iterations: run.iterations,
            rejected_candidates: run.rejected_candidates,
            stop_reason: Some(run.stop_reason),
            efficiency: report.efficiency(),
            fake_rate: report.fake_rate(),
            z_residual_rms: report.z_residual_rms,
            violations: violations.len(),
        };

        let failure_reason = check(&run, &report).err();
        info!(
            "  {} vertices from {} tracks in {} iterations ({})",
            metrics.found_vertices, metrics.track_count, metrics.iterations, run.stop_reason
        );

        Ok(ScenarioOutcome {
            result: ScenarioResult {
                scenario,
                seed: self.seed,
                passed: failure_reason.is_none(),
                failure_reason,
                metrics,
            },
            truth: generator.truth().to_vec(),
            vertices: run.vertices,
        })
    }

    /// S1: an empty track list is an error, not an empty result.
    fn run_empty_input(&self) -> Result<ScenarioOutcome, SimError> {
        let generator = self.generator()?;
        let finder = self.density_finder(self.config.clone());
        let options = VertexingOptions::with_constraint(generator.beam_spot());

        let tracks: Vec<SimTrack> = Vec::new();
        let failure_reason = match finder.find(&tracks, &options) {
            Err(VertexingError::EmptyInput) => None,
            Err(e) => Some(format!("Expected EmptyInput, got {}", e)),
            Ok(vertices) => Some(format!("Expected EmptyInput, got {} vertices", vertices.len())),
        };

        Ok(ScenarioOutcome {
            result: ScenarioResult {
                scenario: ScenarioId::EmptyInput,
                seed: self.seed,
                passed: failure_reason.is_none(),
                failure_reason,
                metrics: ScenarioMetrics::default(),
            },
            truth: Vec::new(),
            vertices: Vec::new(),
        })
    }

    /// S2: one track becomes a constrained single-track vertex.
    fn run_single_track(&self) -> Result<ScenarioOutcome, SimError> {
        let mut generator = self.generator()?;
        let variances = Vector6::new(0.02_f64.powi(2), 0.05_f64.powi(2), 1e-8, 1e-8, 1e-10, 1.0);
        generator.add_track(TrackParameters::new(
            Vector6::new(0.0, 50.0, 0.3, 1.0, 1e-3, 0.0),
            Matrix6::from_diagonal(&variances),
        ));

        let config = FinderConfig {
            add_single_track_vertices: true,
            ..self.config.clone()
        };
        let finder = self.density_finder(config);
        let beam_variances = Vector4::new(0.015_f64.powi(2), 0.015_f64.powi(2), 2500.0, 1.0);
        let options = VertexingOptions::with_constraint(Vertex::new(
            Vector4::zeros(),
            Matrix4::from_diagonal(&beam_variances),
        ));

        self.evaluate(
            ScenarioId::SingleTrack,
            &finder,
            &generator,
            &options,
            &mut (),
            |run, _| {
                expect_count(run, 1)?;
                expect_near(&run.vertices[0], 50.0, 0.1)?;
                if run.vertices[0].tracks.len() != 1 {
                    return Err(format!("Expected 1 track, got {}", run.vertices[0].tracks.len()));
                }
                Ok(())
            },
        )
    }

    /// S3: two well separated clusters give two vertices at the truth.
    fn run_two_clusters(&self) -> Result<ScenarioOutcome, SimError> {
        let generator = self.two_cluster_event()?;
        let finder = self.density_finder(self.config.clone());
        let options = VertexingOptions::with_constraint(generator.beam_spot());

        self.evaluate(
            ScenarioId::TwoClusters,
            &finder,
            &generator,
            &options,
            &mut (),
            |run, report| {
                expect_count(run, 2)?;
                expect_resolved(report, 2, 0.2)
            },
        )
    }

    fn two_cluster_event(&self) -> Result<EventGenerator, SimError> {
        let mut generator = self.generator()?;
        generator.add_vertex_at_z(0.0, 10)?;
        generator.add_vertex_at_z(30.0, 10)?;
        Ok(generator)
    }

    /// S4: clusters closer than their resolution end up in one vertex.
    fn run_overlapping(&self) -> Result<ScenarioOutcome, SimError> {
        let mut generator = EventGenerator::with_config(
            self.seed,
            GeneratorConfig {
                z0_resolution: 0.1,
                ..self.generator_config.clone()
            },
        )?;
        generator.add_vertex_at_z(0.0, 10)?;
        generator.add_vertex_at_z(0.05, 10)?;
        let finder = self.density_finder(self.config.clone());
        let options = VertexingOptions::with_constraint(generator.beam_spot());

        self.evaluate(
            ScenarioId::Overlapping,
            &finder,
            &generator,
            &options,
            &mut (),
            |run, _| {
                expect_count(run, 1)?;
                expect_near(&run.vertices[0], 0.025, 0.2)
            },
        )
    }

    /// S5: a fitter that leaves every track half assigned makes every
    /// candidate too contaminated to keep.
    fn run_contaminated(&self) -> Result<ScenarioOutcome, SimError> {
        let mut generator = self.generator()?;
        generator.add_vertex_at_z(0.0, 10)?;
        let finder = AdaptiveMultiVertexFinder::new(
            self.config.clone(),
            TrackDensitySeedFinder::default(),
            FixedWeightFitter::new(0.5, 0.0),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(generator.beam_spot());

        self.evaluate(
            ScenarioId::Contaminated,
            &finder,
            &generator,
            &options,
            &mut (),
            |run, _| {
                expect_count(run, 0)?;
                if run.rejected_candidates == 0 {
                    return Err("Expected at least one rejected candidate".to_string());
                }
                Ok(())
            },
        )
    }

    /// S6: a seed at z=0 is a real seed when the constraint sits at z=-1.
    fn run_seed_at_origin(&self) -> Result<ScenarioOutcome, SimError> {
        let mut generator = self.generator()?;
        generator.add_vertex_at_z(100.0, 5)?;
        let finder = AdaptiveMultiVertexFinder::new(
            self.config.clone(),
            ScriptedSeedFinder::new(vec![0.0]),
            self.adaptive_fitter(),
            StraightLineEstimator,
        );
        let mut beam = generator.beam_spot();
        beam.position.z = -1.0;
        let options = VertexingOptions {
            use_constraint_in_fit: false,
            ..VertexingOptions::with_constraint(beam)
        };

        self.evaluate(
            ScenarioId::SeedAtOrigin,
            &finder,
            &generator,
            &options,
            &mut ScriptedState::default(),
            |run, _| {
                expect_count(run, 1)?;
                expect_near(&run.vertices[0], 100.0, 0.2)
            },
        )
    }

    /// S7: the seeder knows one vertex; the second is never proposed.
    fn run_seeder_exhausted(&self) -> Result<ScenarioOutcome, SimError> {
        let mut generator = self.generator()?;
        generator.add_vertex_at_z(10.0, 10)?;
        generator.add_vertex_at_z(40.0, 10)?;
        let finder = AdaptiveMultiVertexFinder::new(
            self.config.clone(),
            ScriptedSeedFinder::new(vec![10.0]),
            self.adaptive_fitter(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(generator.beam_spot());
        let mut seed_state = ScriptedState::default();

        let outcome = self.evaluate(
            ScenarioId::SeederExhausted,
            &finder,
            &generator,
            &options,
            &mut seed_state,
            |run, _| {
                expect_count(run, 1)?;
                expect_near(&run.vertices[0], 10.0, 0.2)?;
                if run.stop_reason != StopReason::NoMoreSeeds {
                    return Err(format!("Expected no more seeds, stopped by {}", run.stop_reason));
                }
                if run.iterations != 1 {
                    return Err(format!("Expected 1 iteration, got {}", run.iterations));
                }
                Ok(())
            },
        )?;

        debug!(
            "  seeder saw {} removed tracks before its second call",
            seed_state.removed_hints.get(1).map_or(0, Vec::len)
        );
        Ok(outcome)
    }

    /// Pileup: many vertices along the beam spot.
    fn run_pileup(&self) -> Result<ScenarioOutcome, SimError> {
        let mut generator = self.generator()?;
        generator.add_pileup(20, 8)?;
        let finder = self.density_finder(self.config.clone());
        let options = VertexingOptions::with_constraint(generator.beam_spot());

        let outcome = self.evaluate(
            ScenarioId::Pileup,
            &finder,
            &generator,
            &options,
            &mut (),
            |_, report| {
                if report.passes_criteria(0.8, 0.2) {
                    Ok(())
                } else {
                    Err(format!(
                        "Efficiency {:.1}% / fake rate {:.1}% outside limits",
                        report.efficiency() * 100.0,
                        report.fake_rate() * 100.0
                    ))
                }
            },
        )?;

        if outcome.result.metrics.violations > 0 {
            warn!(
                "  {} output checks failed in pileup event",
                outcome.result.metrics.violations
            );
        }
        Ok(outcome)
    }

    /// Two clusters seeded from the binned density.
    fn run_grid_seeding(&self) -> Result<ScenarioOutcome, SimError> {
        let generator = self.two_cluster_event()?;
        let finder = AdaptiveMultiVertexFinder::new(
            self.config.clone(),
            GridDensitySeedFinder::default(),
            self.adaptive_fitter(),
            StraightLineEstimator,
        );
        let options = VertexingOptions::with_constraint(generator.beam_spot());

        self.evaluate(
            ScenarioId::GridSeeding,
            &finder,
            &generator,
            &options,
            &mut GridDensityState::default(),
            |run, report| {
                expect_count(run, 2)?;
                expect_resolved(report, 2, 0.2)
            },
        )
    }
}

fn expect_count(run: &FinderRun, expected: usize) -> Result<(), String> {
    if run.vertices.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "Expected {} vertices, found {} ({})",
            expected,
            run.vertices.len(),
            run.stop_reason
        ))
    }
}

fn expect_near(vertex: &Vertex, z: f64, tolerance: f64) -> Result<(), String> {
    if (vertex.z() - z).abs() <= tolerance {
        Ok(())
    } else {
        Err(format!("Vertex at z={:.4}, expected {:.4} ± {}", vertex.z(), z, tolerance))
    }
}

fn expect_resolved(
    report: &ValidationReport,
    matched: usize,
    max_residual: f64,
) -> Result<(), String> {
    if report.matched_truth != matched {
        return Err(format!(
            "Matched {}/{} true vertices",
            report.matched_truth, report.truth_count
        ));
    }
    if report.max_z_residual > max_residual {
        return Err(format!(
            "z residual {:.4} mm exceeds {}",
            report.max_z_residual, max_residual
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_passes(scenario: ScenarioId) {
        let result = ScenarioRunner::new(42).run(scenario);
        assert!(
            result.passed,
            "{} failed: {:?}",
            scenario,
            result.failure_reason
        );
    }

    #[test]
    fn test_empty_input() {
        assert_passes(ScenarioId::EmptyInput);
    }

    #[test]
    fn test_single_track() {
        assert_passes(ScenarioId::SingleTrack);
    }

    #[test]
    fn test_two_clusters() {
        assert_passes(ScenarioId::TwoClusters);
    }

    #[test]
    fn test_overlapping() {
        assert_passes(ScenarioId::Overlapping);
    }

    #[test]
    fn test_contaminated() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Contaminated);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.found_vertices, 0);
        assert!(result.metrics.rejected_candidates >= 1);
    }

    #[test]
    fn test_seed_at_origin() {
        assert_passes(ScenarioId::SeedAtOrigin);
    }

    #[test]
    fn test_seeder_exhausted() {
        let result = ScenarioRunner::new(42).run(ScenarioId::SeederExhausted);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.stop_reason, Some(StopReason::NoMoreSeeds));
        assert_eq!(result.metrics.iterations, 1);
    }

    #[test]
    fn test_grid_seeding() {
        assert_passes(ScenarioId::GridSeeding);
    }

    #[test]
    fn test_pileup_reports_truth_metrics() {
        let outcome = ScenarioRunner::new(7).run_detailed(ScenarioId::Pileup);
        assert_eq!(outcome.result.metrics.truth_vertices, 20);
        assert_eq!(outcome.result.metrics.track_count, 160);
        assert_eq!(outcome.truth.len(), 20);
        assert_eq!(outcome.vertices.len(), outcome.result.metrics.found_vertices);
        assert!(
            outcome.result.passed,
            "pileup failed: {:?}",
            outcome.result.failure_reason
        );
    }

    #[test]
    fn test_finder_time_switches_fitter_time() {
        let runner = ScenarioRunner::new(42);
        assert!(!runner.adaptive_fitter().config.use_time);

        let runner = runner.with_config(FinderConfig {
            use_time: true,
            ..Default::default()
        });
        assert!(runner.adaptive_fitter().config.use_time);
        assert!(runner.density_finder(runner.config.clone()).config().use_time);
    }

    #[test]
    fn test_invalid_config_fails_scenario() {
        let config = FinderConfig {
            max_iterations: 0,
            ..Default::default()
        };
        let result = ScenarioRunner::new(42)
            .with_config(config)
            .run(ScenarioId::TwoClusters);
        assert!(!result.passed);
        assert!(result.failure_reason.is_some());
    }
}
