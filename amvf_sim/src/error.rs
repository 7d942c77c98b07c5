//! Error types for the simulation harness.

use amvf_core::VertexingError;

/// Errors that can occur while generating events or running scenarios.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Vertex finding failed: {0}")]
    Vertexing(#[from] VertexingError),

    #[error("Invalid generator parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
