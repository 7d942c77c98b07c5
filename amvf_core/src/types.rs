//! Core data model: track parameters, vertices and per-(track, vertex) records.

use crate::fitter::LinearizedTrack;
use nalgebra::{Matrix3, Matrix4, Matrix6, Vector3, Vector4, Vector6};
use serde::{Deserialize, Serialize};

/// Speed of light in mm/ns.
pub const SPEED_OF_LIGHT: f64 = 299.792_458;

// Perigee parameter indices
pub const D0: usize = 0;
pub const Z0: usize = 1;
pub const PHI: usize = 2;
pub const THETA: usize = 3;
pub const QOP: usize = 4;
pub const TIME: usize = 5;

// ============================================================================
// HANDLES
// ============================================================================

/// Index of an input track in the slice handed to the finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackHandle(pub usize);

/// Arena slot of a vertex candidate. Handles are never reused within one
/// fitter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexHandle(pub usize);

impl std::fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trk#{}", self.0)
    }
}

impl std::fmt::Display for VertexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vtx#{}", self.0)
    }
}

// ============================================================================
// CONTEXTS
// ============================================================================

/// Detector geometry/alignment context forwarded to collaborators.
///
/// The reference collaborators work in the global frame and do not read it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryContext;

/// Magnetic field context forwarded to collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MagneticFieldContext;

// ============================================================================
// TRACK PARAMETERS
// ============================================================================

/// Perigee track parameters `[d0, z0, phi, theta, q/p, t]` with covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackParameters {
    /// Parameter vector, indexed by [`D0`], [`Z0`], [`PHI`], [`THETA`], [`QOP`], [`TIME`]
    pub parameters: Vector6<f64>,

    /// 6×6 parameter covariance
    pub covariance: Matrix6<f64>,

    /// Perigee reference point in global coordinates (mm)
    pub reference: Vector3<f64>,
}

impl TrackParameters {
    /// Creates perigee parameters expressed at the global origin.
    pub fn new(parameters: Vector6<f64>, covariance: Matrix6<f64>) -> Self {
        Self {
            parameters,
            covariance,
            reference: Vector3::zeros(),
        }
    }

    /// Creates perigee parameters expressed at `reference`.
    pub fn with_reference(
        parameters: Vector6<f64>,
        covariance: Matrix6<f64>,
        reference: Vector3<f64>,
    ) -> Self {
        Self {
            parameters,
            covariance,
            reference,
        }
    }

    #[inline]
    pub fn d0(&self) -> f64 {
        self.parameters[D0]
    }

    #[inline]
    pub fn z0(&self) -> f64 {
        self.parameters[Z0]
    }

    #[inline]
    pub fn phi(&self) -> f64 {
        self.parameters[PHI]
    }

    #[inline]
    pub fn theta(&self) -> f64 {
        self.parameters[THETA]
    }

    #[inline]
    pub fn qop(&self) -> f64 {
        self.parameters[QOP]
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.parameters[TIME]
    }

    /// Global position of the perigee point.
    pub fn position(&self, _gctx: &GeometryContext) -> Vector3<f64> {
        let (sin_phi, cos_phi) = self.phi().sin_cos();
        self.reference + Vector3::new(-self.d0() * sin_phi, self.d0() * cos_phi, self.z0())
    }

    /// Unit momentum direction.
    pub fn direction(&self) -> Vector3<f64> {
        let (sin_phi, cos_phi) = self.phi().sin_cos();
        let (sin_theta, cos_theta) = self.theta().sin_cos();
        Vector3::new(cos_phi * sin_theta, sin_phi * sin_theta, cos_theta)
    }

    /// Variance of a single parameter.
    #[inline]
    pub fn variance(&self, index: usize) -> f64 {
        self.covariance[(index, index)]
    }
}

// ============================================================================
// VERTEX
// ============================================================================

/// Fit quality of a vertex: χ² and (possibly fractional, possibly negative) ndf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub chi2: f64,
    pub ndf: f64,
}

impl FitQuality {
    pub fn new(chi2: f64, ndf: f64) -> Self {
        Self { chi2, ndf }
    }
}

/// A track's association with one vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAtVertex {
    /// The input track
    pub track: TrackHandle,

    /// Parameters as handed to the finder
    pub original_parameters: TrackParameters,

    /// Perigee parameters re-expressed at the fitted vertex
    pub fitted_parameters: TrackParameters,

    /// Soft-assignment weight in [0, 1]
    pub weight: f64,

    /// χ² of the track w.r.t. the fitted vertex
    pub chi2: f64,

    /// χ² compatibility used during annealing
    pub vertex_compatibility: f64,

    /// Whether `linearized` belongs to the current linearization point
    pub is_linearized: bool,

    /// Cached linearization, `None` while stale or when the transported
    /// variances were unusable
    #[serde(skip)]
    pub linearized: Option<LinearizedTrack>,
}

impl TrackAtVertex {
    /// Creates a fresh association with unit weight.
    pub fn new(track: TrackHandle, parameters: TrackParameters) -> Self {
        Self {
            track,
            fitted_parameters: parameters.clone(),
            original_parameters: parameters,
            weight: 1.0,
            chi2: 0.0,
            vertex_compatibility: 0.0,
            is_linearized: false,
            linearized: None,
        }
    }
}

/// A space-time vertex with covariance, fit quality and attached tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Position [x, y, z, t] (mm, mm, mm, ns)
    pub position: Vector4<f64>,

    /// 4×4 covariance
    pub covariance: Matrix4<f64>,

    pub fit_quality: FitQuality,

    /// Tracks at this vertex; only filled on finder output
    pub tracks: Vec<TrackAtVertex>,
}

impl Vertex {
    /// Creates a vertex with the given position and covariance.
    pub fn new(position: Vector4<f64>, covariance: Matrix4<f64>) -> Self {
        Self {
            position,
            covariance,
            fit_quality: FitQuality::default(),
            tracks: Vec::new(),
        }
    }

    /// Creates a vertex at `position` with zero covariance.
    pub fn at(position: Vector4<f64>) -> Self {
        Self::new(position, Matrix4::zeros())
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.position[2]
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.position[3]
    }

    /// Spatial part of the position.
    #[inline]
    pub fn position3(&self) -> Vector3<f64> {
        self.position.xyz()
    }

    /// Spatial block of the covariance.
    #[inline]
    pub fn covariance3(&self) -> Matrix3<f64> {
        self.covariance.fixed_view::<3, 3>(0, 0).into()
    }
}

/// Per-vertex bookkeeping kept by the fitter state.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexInfo {
    /// Prior used by the fit (beam spot or seed-derived)
    pub constraint: Vertex,

    /// Position the candidate was seeded (or recovered) at
    pub seed_position: Vector4<f64>,

    /// Point the tracks were last linearized around
    pub linearization_point: Vector4<f64>,

    /// Position before the latest fit iteration
    pub old_position: Vector4<f64>,

    /// Linked tracks in attachment order
    pub track_links: Vec<TrackHandle>,
}

impl VertexInfo {
    pub fn new(constraint: Vertex, seed_position: Vector4<f64>) -> Self {
        Self {
            constraint,
            seed_position,
            linearization_point: seed_position,
            old_position: seed_position,
            track_links: Vec::new(),
        }
    }
}
