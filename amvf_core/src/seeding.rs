//! Reference seed finders.
//!
//! Both seeders look at the longitudinal position of the remaining seed
//! tracks where they pass the beam line and propose the densest region as
//! the next vertex candidate. When no usable track is left they return the
//! constraint vertex unchanged, which the finder reads as "no more seeds".

use crate::config::VertexingOptions;
use crate::error::VertexingError;
use crate::impact_point::{closest_approach, transported_variances};
use crate::traits::{SeedFinder, TrackSet};
use crate::types::{TrackHandle, Vertex};
use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// A seed track as seen from the beam line.
#[derive(Debug, Clone, Copy)]
struct BeamLineTrack {
    z: f64,
    var_z: f64,
    d0_significance: f64,
}

fn at_beam_line(
    tracks: &TrackSet<'_>,
    track: TrackHandle,
    options: &VertexingOptions,
) -> Result<Option<BeamLineTrack>, VertexingError> {
    let params = tracks.get(track)?;
    let beam = options.constraint.position3();
    let pca = closest_approach(params, &beam, &options.geo_context);
    let (var_d0, var_z, _) = transported_variances(params, pca.path_length);
    if var_d0 <= 0.0 || var_z <= 0.0 || !pca.point.z.is_finite() {
        return Ok(None);
    }
    let d0 = (pca.point.xyz() - beam).dot(&pca.d0_direction);
    Ok(Some(BeamLineTrack {
        z: pca.point.z,
        var_z,
        d0_significance: d0.abs() / var_d0.sqrt(),
    }))
}

/// Seed on the beam line at `z`. Carries the constraint covariance only when
/// the seed options use the constraint.
/// Seed vertex on the beam line at `z`.
///
/// A z equal to the constraint's is reserved for "no more seeds", so a real
/// peak landing exactly there is moved by one ulp.
fn seed_vertex(z: f64, options: &VertexingOptions) -> Vertex {
    let beam = &options.constraint.position;
    let z = if z == beam.z {
        f64::from_bits(z.to_bits() + 1)
    } else {
        z
    };
    let covariance = if options.use_constraint_in_fit {
        options.constraint.covariance
    } else {
        Matrix4::zeros()
    };
    Vertex::new(Vector4::new(beam.x, beam.y, z, beam.w), covariance)
}

// ============================================================================
// TRACK DENSITY (KERNEL MEAN SHIFT)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDensityConfig {
    /// Tracks further from the beam line than this are ignored (default: 3.5σ)
    pub max_d0_significance: f64,

    /// Maximum mean-shift steps (default: 50)
    pub max_shift_iterations: usize,

    /// Mean shift stops once a step is shorter than this (default: 1e-4 mm)
    pub shift_tolerance: f64,
}

impl Default for TrackDensityConfig {
    fn default() -> Self {
        Self {
            max_d0_significance: 3.5,
            max_shift_iterations: 50,
            shift_tolerance: 1e-4,
        }
    }
}

/// Gaussian kernel density of track z at the beam line, maximized by mean
/// shift from the densest track.
#[derive(Debug, Clone, Default)]
pub struct TrackDensitySeedFinder {
    pub config: TrackDensityConfig,
}

impl TrackDensitySeedFinder {
    pub fn new(config: TrackDensityConfig) -> Self {
        Self { config }
    }

    /// Kernel density at `z`: Σ exp(−(z − zᵢ)²/2σᵢ²)/σᵢ.
    fn density(kernels: &[BeamLineTrack], z: f64) -> f64 {
        kernels
            .iter()
            .map(|k| (-(z - k.z).powi(2) / (2.0 * k.var_z)).exp() / k.var_z.sqrt())
            .sum()
    }

    fn mean_shift(&self, kernels: &[BeamLineTrack], start: f64) -> f64 {
        let mut z = start;
        for _ in 0..self.config.max_shift_iterations {
            let (numerator, denominator) = kernels.iter().fold((0.0, 0.0), |(num, den), k| {
                let w = (-(z - k.z).powi(2) / (2.0 * k.var_z)).exp() / k.var_z;
                (num + w * k.z, den + w)
            });
            if denominator <= 0.0 {
                break;
            }
            let next = numerator / denominator;
            let step = (next - z).abs();
            z = next;
            if step < self.config.shift_tolerance {
                break;
            }
        }
        z
    }
}

impl SeedFinder for TrackDensitySeedFinder {
    type State = ();

    fn find_seeds(
        &self,
        tracks: &TrackSet<'_>,
        seed_tracks: &[TrackHandle],
        options: &VertexingOptions,
        _state: &mut Self::State,
    ) -> Result<Vec<Vertex>, VertexingError> {
        let mut kernels = Vec::with_capacity(seed_tracks.len());
        for &track in seed_tracks {
            if let Some(k) = at_beam_line(tracks, track, options)? {
                if k.d0_significance < self.config.max_d0_significance {
                    kernels.push(k);
                }
            }
        }

        if kernels.is_empty() {
            return Ok(vec![options.constraint.clone()]);
        }

        let mut start = kernels[0].z;
        let mut best = f64::NEG_INFINITY;
        for k in &kernels {
            let density = Self::density(&kernels, k.z);
            if density > best {
                best = density;
                start = k.z;
            }
        }

        let z = self.mean_shift(&kernels, start);
        trace!("Density seed at z = {:.4} from {} tracks", z, kernels.len());
        Ok(vec![seed_vertex(z, options)])
    }
}

// ============================================================================
// GRID DENSITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDensityConfig {
    /// Number of bins of the main grid (default: 2000)
    pub main_grid_size: usize,

    /// Grid covers [−z_max, z_max] (default: 100 mm)
    pub z_max: f64,

    /// Half-width of a track's contribution in bins (default: 15)
    pub track_grid_half_width: usize,

    /// Tracks further from the beam line than this are ignored (default: 3.5σ)
    pub max_d0_significance: f64,
}

impl Default for GridDensityConfig {
    fn default() -> Self {
        Self {
            main_grid_size: 2000,
            z_max: 100.0,
            track_grid_half_width: 15,
            max_d0_significance: 3.5,
        }
    }
}

impl GridDensityConfig {
    pub fn bin_width(&self) -> f64 {
        2.0 * self.z_max / self.main_grid_size as f64
    }
}

/// Contribution of one track: first bin and values.
#[derive(Debug, Clone, PartialEq)]
struct TrackContribution {
    first_bin: usize,
    values: Vec<f64>,
}

/// Density grid carried across the seeding calls of one `find` invocation.
#[derive(Debug, Clone, Default)]
pub struct GridDensityState {
    main_density: Vec<f64>,
    track_contributions: HashMap<TrackHandle, TrackContribution>,
    initialized: bool,
    tracks_to_remove: Vec<TrackHandle>,
}

impl GridDensityState {
    /// Number of tracks currently contributing to the grid.
    pub fn contributing_tracks(&self) -> usize {
        self.track_contributions.len()
    }
}

/// Binned track density with cached per-track contributions. Tracks removed
/// by the finder are subtracted instead of rebuilding the grid.
#[derive(Debug, Clone, Default)]
pub struct GridDensitySeedFinder {
    pub config: GridDensityConfig,
}

impl GridDensitySeedFinder {
    pub fn new(config: GridDensityConfig) -> Self {
        Self { config }
    }

    fn bin_center(&self, bin: f64) -> f64 {
        -self.config.z_max + (bin + 0.5) * self.config.bin_width()
    }

    fn contribution(&self, track: &BeamLineTrack) -> Option<TrackContribution> {
        let width = self.config.bin_width();
        if track.z.abs() >= self.config.z_max {
            return None;
        }
        let center = ((track.z + self.config.z_max) / width) as usize;
        let half = self.config.track_grid_half_width;
        let first_bin = center.saturating_sub(half);
        let last_bin = (center + half).min(self.config.main_grid_size - 1);

        // Kernel no narrower than a bin so that narrow tracks still fill it
        let sigma = track.var_z.sqrt().max(width);
        let values = (first_bin..=last_bin)
            .map(|bin| {
                let dz = self.bin_center(bin as f64) - track.z;
                (-dz * dz / (2.0 * sigma * sigma)).exp() / sigma
            })
            .collect();
        Some(TrackContribution { first_bin, values })
    }

    fn add(density: &mut [f64], contribution: &TrackContribution) {
        for (bin, value) in density[contribution.first_bin..]
            .iter_mut()
            .zip(&contribution.values)
        {
            *bin += value;
        }
    }

    fn subtract(density: &mut [f64], contribution: &TrackContribution) {
        for (bin, value) in density[contribution.first_bin..]
            .iter_mut()
            .zip(&contribution.values)
        {
            *bin = (*bin - value).max(0.0);
        }
    }

    fn initialize(
        &self,
        tracks: &TrackSet<'_>,
        seed_tracks: &[TrackHandle],
        options: &VertexingOptions,
        state: &mut GridDensityState,
    ) -> Result<(), VertexingError> {
        state.main_density = vec![0.0; self.config.main_grid_size];
        state.track_contributions.clear();
        for &track in seed_tracks {
            let Some(k) = at_beam_line(tracks, track, options)? else {
                continue;
            };
            if k.d0_significance >= self.config.max_d0_significance {
                continue;
            }
            if let Some(contribution) = self.contribution(&k) {
                Self::add(&mut state.main_density, &contribution);
                state.track_contributions.insert(track, contribution);
            }
        }
        state.initialized = true;
        Ok(())
    }

    /// Sub-bin peak position by parabolic interpolation.
    fn refine_peak(density: &[f64], bin: usize) -> f64 {
        if bin == 0 || bin + 1 >= density.len() {
            return bin as f64;
        }
        let (y0, y1, y2) = (density[bin - 1], density[bin], density[bin + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        if denom.abs() < 1e-12 {
            return bin as f64;
        }
        bin as f64 + (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
    }
}

impl SeedFinder for GridDensitySeedFinder {
    type State = GridDensityState;

    const ACCEPTS_REMOVED_TRACKS: bool = true;

    fn find_seeds(
        &self,
        tracks: &TrackSet<'_>,
        seed_tracks: &[TrackHandle],
        options: &VertexingOptions,
        state: &mut Self::State,
    ) -> Result<Vec<Vertex>, VertexingError> {
        if self.config.main_grid_size < 3 || self.config.z_max <= 0.0 {
            return Err(VertexingError::seed_finder(format!(
                "grid of {} bins over ±{} mm is unusable",
                self.config.main_grid_size, self.config.z_max
            )));
        }

        if !state.initialized {
            self.initialize(tracks, seed_tracks, options, state)?;
        } else {
            for track in std::mem::take(&mut state.tracks_to_remove) {
                if let Some(contribution) = state.track_contributions.remove(&track) {
                    Self::subtract(&mut state.main_density, &contribution);
                }
            }
        }
        state.tracks_to_remove.clear();

        if state.track_contributions.is_empty() {
            return Ok(vec![options.constraint.clone()]);
        }

        let (peak_bin, peak_value) = state
            .main_density
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(best_bin, best), (bin, &value)| {
                if value > best {
                    (bin, value)
                } else {
                    (best_bin, best)
                }
            });
        if peak_value <= 0.0 {
            return Ok(vec![options.constraint.clone()]);
        }

        let z = self.bin_center(Self::refine_peak(&state.main_density, peak_bin));
        trace!(
            "Grid seed at z = {:.4} ({} contributing tracks)",
            z,
            state.track_contributions.len()
        );
        Ok(vec![seed_vertex(z, options)])
    }

    fn set_removed_tracks(state: &mut Self::State, removed: &[TrackHandle]) {
        state.tracks_to_remove.extend_from_slice(removed);
    }
}
