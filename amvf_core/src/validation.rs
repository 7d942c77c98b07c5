//! Validation Module - Output Checks and Truth Comparison
//! =======================================================
//!
//! Two kinds of checks on finder output:
//! - structural: properties every output list must satisfy for the
//!   configuration it was produced with (track lists, merging, contamination)
//! - truth matching: efficiency, fakes and z resolution against the true
//!   vertex positions of a simulated event
//!
//! Usage:
//! ```ignore
//! let violations = check_output(&config, &vertices, options.use_constraint_in_fit);
//! assert!(violations.is_empty());
//!
//! let report = ValidationReport::evaluate(&truth_z, &vertices, 0.5);
//! report.print();
//! ```

use crate::acceptance::merge_significance;
use crate::config::FinderConfig;
use crate::types::Vertex;
use serde::{Deserialize, Serialize};

// =============================================================================
// STRUCTURAL CHECKS
// =============================================================================

/// A property of the output list that does not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Violation {
    /// Vertex without tracks although single-track vertices are not allowed
    EmptyTrackList { vertex: usize },
    /// Two returned vertices satisfy the merge predicate
    Merged {
        first: usize,
        second: usize,
        significance: f64,
    },
    /// Vertex weight contamination above the configured maximum
    Contaminated { vertex: usize, contamination: f64 },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::EmptyTrackList { vertex } => write!(f, "vertex {} has no tracks", vertex),
            Violation::Merged {
                first,
                second,
                significance,
            } => write!(
                f,
                "vertices {} and {} are merged (significance {:.3})",
                first, second, significance
            ),
            Violation::Contaminated {
                vertex,
                contamination,
            } => write!(f, "vertex {} is contaminated ({:.3})", vertex, contamination),
        }
    }
}

/// Weight contamination Σw(1−w)/Σw² of an output vertex.
pub fn vertex_contamination(vertex: &Vertex) -> f64 {
    let (numerator, denominator) = vertex.tracks.iter().fold((0.0, 0.0), |(num, den), tv| {
        (num + tv.weight * (1.0 - tv.weight), den + tv.weight * tv.weight)
    });
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Checks an output list against the configuration it was produced with.
pub fn check_output(
    config: &FinderConfig,
    vertices: &[Vertex],
    use_constraint_in_fit: bool,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let single_track_allowed = config.add_single_track_vertices && use_constraint_in_fit;

    for (i, vertex) in vertices.iter().enumerate() {
        if vertex.tracks.is_empty() && !single_track_allowed {
            violations.push(Violation::EmptyTrackList { vertex: i });
        }

        let contamination = vertex_contamination(vertex);
        if contamination > config.maximum_vertex_contamination {
            violations.push(Violation::Contaminated {
                vertex: i,
                contamination,
            });
        }

        for (j, other) in vertices.iter().enumerate().skip(i + 1) {
            if let Some(significance) = merge_significance(config, vertex, other) {
                if significance < config.max_merge_vertex_significance {
                    violations.push(Violation::Merged {
                        first: i,
                        second: j,
                        significance,
                    });
                }
            }
        }
    }

    violations
}

// =============================================================================
// TRUTH MATCHING
// =============================================================================

/// Truth comparison of one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Number of true vertices
    pub truth_count: usize,
    /// Number of reconstructed vertices
    pub reco_count: usize,
    /// True vertices with at least one reconstructed vertex in the window
    pub matched_truth: usize,
    /// Reconstructed vertices with no true vertex in the window
    pub fakes: usize,
    /// Extra reconstructed vertices matched to an already found true vertex
    pub duplicates: usize,
    /// RMS of z(reco) − z(truth) over the best match of each found vertex (mm)
    pub z_residual_rms: f64,
    /// Largest |z(reco) − z(truth)| among those matches (mm)
    pub max_z_residual: f64,
}

impl ValidationReport {
    /// Matches each reconstructed vertex to the nearest true z within `window`.
    pub fn evaluate(truth_z: &[f64], vertices: &[Vertex], window: f64) -> Self {
        let mut best: Vec<Option<f64>> = vec![None; truth_z.len()];
        let mut fakes = 0;
        let mut duplicates = 0;

        for vertex in vertices {
            let nearest = truth_z
                .iter()
                .enumerate()
                .map(|(i, &z)| (i, vertex.z() - z))
                .filter(|(_, dz)| dz.abs() <= window)
                .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));

            match nearest {
                None => fakes += 1,
                Some((i, dz)) => match best[i] {
                    None => best[i] = Some(dz),
                    Some(previous) => {
                        duplicates += 1;
                        if dz.abs() < previous.abs() {
                            best[i] = Some(dz);
                        }
                    }
                },
            }
        }

        let residuals: Vec<f64> = best.iter().flatten().copied().collect();
        let z_residual_rms = if residuals.is_empty() {
            0.0
        } else {
            (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
        };
        let max_z_residual = residuals.iter().fold(0.0_f64, |m, r| m.max(r.abs()));

        Self {
            truth_count: truth_z.len(),
            reco_count: vertices.len(),
            matched_truth: residuals.len(),
            fakes,
            duplicates,
            z_residual_rms,
            max_z_residual,
        }
    }

    /// Fraction of true vertices that were found.
    pub fn efficiency(&self) -> f64 {
        if self.truth_count == 0 {
            return 1.0;
        }
        self.matched_truth as f64 / self.truth_count as f64
    }

    /// Fraction of reconstructed vertices that are fakes.
    pub fn fake_rate(&self) -> f64 {
        if self.reco_count == 0 {
            return 0.0;
        }
        self.fakes as f64 / self.reco_count as f64
    }

    pub fn passes_criteria(&self, min_efficiency: f64, max_fake_rate: f64) -> bool {
        self.efficiency() >= min_efficiency && self.fake_rate() <= max_fake_rate
    }

    pub fn print(&self) {
        println!("\n=== Vertex Validation ===");
        println!("  Truth vertices:   {}", self.truth_count);
        println!("  Reco vertices:    {}", self.reco_count);
        println!("  Efficiency:       {:.1}%", self.efficiency() * 100.0);
        println!("  Fakes:            {}", self.fakes);
        println!("  Duplicates:       {}", self.duplicates);
        println!("  z residual RMS:   {:.4} mm", self.z_residual_rms);
        println!("  max |z residual|: {:.4} mm", self.max_z_residual);
    }
}
