//! Error types for pexmesh-core.
//!
//! Every stage fails fast with the first problem it detects. All of these are
//! deterministic input-data problems, so none of them is retried.

use pexmesh_compute::ComputeError;
use pexmesh_geometry::{Axis, GeometryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Degenerate domain: only {count} distinct coordinate(s) along {axis} after merging")]
    DegenerateDomain { axis: Axis, count: usize },

    #[error("Conductors '{first}' and '{second}' overlap in cell {cell:?}")]
    AmbiguousConductorOverlap {
        cell: [usize; 3],
        first: String,
        second: String,
    },

    #[error(
        "Degenerate coupling at cell {cell:?} along {axis}: d = {distance:e}, k = {coefficient}"
    )]
    DegenerateCoupling {
        cell: [usize; 3],
        axis: Axis,
        distance: f64,
        coefficient: f64,
    },

    #[error("Invalid port '{port}': {reason}")]
    InvalidPort { port: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl MeshError {
    pub(crate) fn invalid_port(port: &str, reason: impl Into<String>) -> Self {
        MeshError::InvalidPort {
            port: port.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MeshError::DegenerateDomain { .. } => "DegenerateDomain",
            MeshError::AmbiguousConductorOverlap { .. } => "AmbiguousConductorOverlap",
            MeshError::DegenerateCoupling { .. } => "DegenerateCoupling",
            MeshError::InvalidPort { .. } => "InvalidPort",
            MeshError::InvalidInput(_) | MeshError::Geometry(_) => "InvalidInput",
            MeshError::Compute(_) => "Compute",
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
