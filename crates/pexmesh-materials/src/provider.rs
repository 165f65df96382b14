//! Material property provider trait.
//!
//! All material data sources implement [`MaterialProvider`], which returns
//! the static conductivity and permittivity of a material.

use thiserror::Error;

/// Errors from material providers.
#[derive(Debug, Error, PartialEq)]
pub enum MaterialError {
    #[error("Material not found: {0}")]
    NotFound(String),

    #[error("Material '{name}' already defined")]
    Duplicate { name: String },

    #[error("Material '{name}' has invalid {property} {value}")]
    InvalidValue {
        name: String,
        property: &'static str,
        value: f64,
    },
}

/// Provides quasi-static material properties.
pub trait MaterialProvider: Send + Sync {
    /// Human-readable name of this material.
    fn name(&self) -> &str;

    /// Electrical conductivity (S/m). Zero for insulators.
    fn conductivity(&self) -> f64;

    /// Relative permittivity $\epsilon_r$.
    fn relative_permittivity(&self) -> f64;

    /// Whether the material conducts.
    fn is_conductor(&self) -> bool {
        self.conductivity() > 0.0
    }
}
