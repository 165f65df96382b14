//! Material regions.
//!
//! A region is an axis-aligned volume filled with one material. Regions own no
//! mesh cells; the conductor marker queries them by containment.

use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;

/// A volumetric region with scalar material properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRegion {
    /// Identity of the region. Regions sharing a name belong to the same
    /// conductor and may overlap freely.
    pub name: String,
    /// Spatial extent.
    pub bounds: Aabb,
    /// Electrical conductivity (S/m). Strictly positive marks a conductor.
    pub conductivity: f64,
    /// Relative permittivity (dimensionless).
    pub permittivity: f64,
}

impl MaterialRegion {
    pub fn new(
        name: impl Into<String>,
        bounds: Aabb,
        conductivity: f64,
        permittivity: f64,
    ) -> Self {
        Self {
            name: name.into(),
            bounds,
            conductivity,
            permittivity,
        }
    }

    /// A conducting region (permittivity is irrelevant inside metal and set to 1).
    pub fn conductor(name: impl Into<String>, bounds: Aabb, conductivity: f64) -> Self {
        Self::new(name, bounds, conductivity, 1.0)
    }

    /// A lossless dielectric region.
    pub fn dielectric(name: impl Into<String>, bounds: Aabb, permittivity: f64) -> Self {
        Self::new(name, bounds, 0.0, permittivity)
    }

    pub fn is_conductor(&self) -> bool {
        self.conductivity > 0.0
    }
}
