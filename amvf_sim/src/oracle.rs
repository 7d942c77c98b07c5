//! Truth event generator.
//!
//! The generator keeps the "God's eye view" of a simulated event:
//! - true vertex positions
//! - straight-line tracks emitted from them
//! - reconstructed track parameters (with Gaussian smearing)

use crate::error::SimError;
use amvf_core::types::{D0, TIME, Z0};
use amvf_core::{InputTrack, TrackParameters, Vertex};
use nalgebra::{Matrix4, Matrix6, Vector3, Vector4, Vector6};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// A true interaction vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthVertex {
    /// Index in generation order
    pub id: usize,

    /// Position [x, y, z, t] (mm, ns)
    pub position: Vector4<f64>,

    /// Number of tracks emitted
    pub n_tracks: usize,
}

/// A reconstructed track with its truth origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SimTrack {
    /// Truth vertex the track came from, `None` for hand-placed tracks
    pub truth_vertex: Option<usize>,

    pub params: TrackParameters,
}

impl InputTrack for SimTrack {
    fn parameters(&self) -> &TrackParameters {
        &self.params
    }
}

/// Detector and beam description used by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Transverse impact parameter resolution (default: 0.02 mm)
    pub d0_resolution: f64,

    /// Longitudinal impact parameter resolution (default: 0.05 mm)
    pub z0_resolution: f64,

    /// Track time resolution (default: 0.03 ns)
    pub time_resolution: f64,

    /// Beam spot width in x and y (default: 0.01 mm)
    pub beam_sigma_xy: f64,

    /// Beam spot width in z (default: 50 mm)
    pub beam_sigma_z: f64,

    /// Pseudorapidity acceptance |η| (default: 2.5)
    pub max_eta: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            d0_resolution: 0.02,
            z0_resolution: 0.05,
            time_resolution: 0.03,
            beam_sigma_xy: 0.01,
            beam_sigma_z: 50.0,
            max_eta: 2.5,
        }
    }
}

/// Perigee parameters (at the origin) of the straight line through `origin`
/// with direction (phi, theta).
pub fn perigee_through(origin: &Vector4<f64>, phi: f64, theta: f64) -> Vector6<f64> {
    let (sin_phi, cos_phi) = phi.sin_cos();
    let lambda = -(origin.x * cos_phi + origin.y * sin_phi);
    let pca = origin.xyz() + Vector3::new(cos_phi, sin_phi, 1.0 / theta.tan()) * lambda;
    let d0 = -pca.x * sin_phi + pca.y * cos_phi;
    // β = 1: the perigee is reached λ / sinθ·c after the vertex time
    let time = origin.w + lambda / (theta.sin() * amvf_core::types::SPEED_OF_LIGHT);
    Vector6::new(d0, pca.z, phi, theta, 1e-3, time)
}

/// Generates events deterministically from a seed.
pub struct EventGenerator {
    /// Master seed
    seed: u64,

    rng: ChaCha8Rng,

    config: GeneratorConfig,

    d0_noise: Normal<f64>,
    z0_noise: Normal<f64>,
    time_noise: Normal<f64>,

    truth: Vec<TruthVertex>,
    tracks: Vec<SimTrack>,
}

impl EventGenerator {
    /// Creates a generator with the default detector description.
    pub fn new(seed: u64) -> Result<Self, SimError> {
        Self::with_config(seed, GeneratorConfig::default())
    }

    /// Creates a generator, rejecting widths that are not finite and positive.
    pub fn with_config(seed: u64, config: GeneratorConfig) -> Result<Self, SimError> {
        for (name, value) in [
            ("d0_resolution", config.d0_resolution),
            ("z0_resolution", config.z0_resolution),
            ("time_resolution", config.time_resolution),
            ("beam_sigma_xy", config.beam_sigma_xy),
            ("beam_sigma_z", config.beam_sigma_z),
            ("max_eta", config.max_eta),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::invalid_parameter(format!(
                    "{} must be finite and positive, got {}",
                    name, value
                )));
            }
        }

        let normal = |sigma: f64, name: &str| {
            Normal::new(0.0, sigma)
                .map_err(|e| SimError::invalid_parameter(format!("{} {}: {}", name, sigma, e)))
        };
        Ok(Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            d0_noise: normal(config.d0_resolution, "d0_resolution")?,
            z0_noise: normal(config.z0_resolution, "z0_resolution")?,
            time_noise: normal(config.time_resolution, "time_resolution")?,
            config,
            truth: Vec::new(),
            tracks: Vec::new(),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Parameter covariance of every generated track.
    fn track_covariance(&self) -> Matrix6<f64> {
        Matrix6::from_diagonal(&Vector6::new(
            self.config.d0_resolution.powi(2),
            self.config.z0_resolution.powi(2),
            1e-8,
            1e-8,
            1e-10,
            self.config.time_resolution.powi(2),
        ))
    }

    /// Emits `n_tracks` smeared tracks from `position` and returns the truth id.
    pub fn add_vertex(&mut self, position: Vector4<f64>, n_tracks: usize) -> usize {
        let id = self.truth.len();
        let covariance = self.track_covariance();

        for _ in 0..n_tracks {
            let phi = self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
            let eta = self.rng.gen_range(-self.config.max_eta..self.config.max_eta);
            let theta = 2.0 * (-eta).exp().atan();

            let mut parameters = perigee_through(&position, phi, theta);
            parameters[D0] += self.d0_noise.sample(&mut self.rng);
            parameters[Z0] += self.z0_noise.sample(&mut self.rng);
            parameters[TIME] += self.time_noise.sample(&mut self.rng);

            self.tracks.push(SimTrack {
                truth_vertex: Some(id),
                params: TrackParameters::new(parameters, covariance),
            });
        }

        self.truth.push(TruthVertex {
            id,
            position,
            n_tracks,
        });
        id
    }

    /// Adds a vertex at longitudinal position `z` inside the beam spot.
    pub fn add_vertex_at_z(&mut self, z: f64, n_tracks: usize) -> Result<usize, SimError> {
        let spread = Normal::new(0.0, self.config.beam_sigma_xy)
            .map_err(|e| SimError::invalid_parameter(e.to_string()))?;
        let position = Vector4::new(
            spread.sample(&mut self.rng),
            spread.sample(&mut self.rng),
            z,
            0.0,
        );
        Ok(self.add_vertex(position, n_tracks))
    }

    /// Adds `count` vertices with z drawn from the beam spot.
    pub fn add_pileup(&mut self, count: usize, n_tracks: usize) -> Result<(), SimError> {
        let z_spread = Normal::new(0.0, self.config.beam_sigma_z)
            .map_err(|e| SimError::invalid_parameter(e.to_string()))?;
        for _ in 0..count {
            let z = z_spread.sample(&mut self.rng);
            self.add_vertex_at_z(z, n_tracks)?;
        }
        Ok(())
    }

    /// Adds a hand-placed track without truth vertex.
    pub fn add_track(&mut self, params: TrackParameters) {
        self.tracks.push(SimTrack {
            truth_vertex: None,
            params,
        });
    }

    /// Beam-spot constraint matching the generator's beam.
    pub fn beam_spot(&self) -> Vertex {
        Vertex::new(
            Vector4::zeros(),
            Matrix4::from_diagonal(&Vector4::new(
                self.config.beam_sigma_xy.powi(2),
                self.config.beam_sigma_xy.powi(2),
                self.config.beam_sigma_z.powi(2),
                1.0,
            )),
        )
    }

    pub fn truth(&self) -> &[TruthVertex] {
        &self.truth
    }

    /// True z positions in generation order.
    pub fn truth_z(&self) -> Vec<f64> {
        self.truth.iter().map(|v| v.position.z).collect()
    }

    pub fn tracks(&self) -> &[SimTrack] {
        &self.tracks
    }
}
