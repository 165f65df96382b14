//! The aggregate geometry model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounds::Aabb;
use crate::port::Port;
use crate::region::MaterialRegion;
use crate::transform::Transform;

/// Default tolerance below which two coordinates are considered the same grid
/// line.
pub const DEFAULT_MERGE_TOLERANCE: f64 = 1e-12;

/// Malformed geometry detected before meshing.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Region '{name}' has malformed bounds {min:?}..{max:?}")]
    MalformedBounds {
        name: String,
        min: [f64; 3],
        max: [f64; 3],
    },

    #[error("Region '{name}' has invalid {property} {value}")]
    InvalidProperty {
        name: String,
        property: &'static str,
        value: f64,
    },

    #[error("Merge tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    #[error("Background permittivity must be finite and non-negative, got {0}")]
    InvalidBackground(f64),
}

/// Complete geometric description of one extraction domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryModel {
    pub regions: Vec<MaterialRegion>,
    pub ports: Vec<Port>,
    /// Coordinates closer than this merge into one grid line.
    pub tolerance: f64,
    /// Relative permittivity of space covered by no region.
    #[serde(default = "default_background")]
    pub background_permittivity: f64,
}

fn default_background() -> f64 {
    1.0
}

impl Default for GeometryModel {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            ports: Vec::new(),
            tolerance: DEFAULT_MERGE_TOLERANCE,
            background_permittivity: default_background(),
        }
    }
}

impl GeometryModel {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: MaterialRegion) -> Self {
        self.regions.push(region);
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Bounding box of all regions, or `None` for an empty model.
    pub fn domain(&self) -> Option<Aabb> {
        let mut iter = self.regions.iter();
        let first = iter.next()?.bounds;
        Some(iter.fold(first, |acc, r| acc.union(&r.bounds)))
    }

    /// Check bounds, material properties and numeric settings.
    ///
    /// Port-level checks that need the meshed domain (location, role
    /// conflicts) are left to the mesh generator.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(GeometryError::InvalidTolerance(self.tolerance));
        }
        if !self.background_permittivity.is_finite() || self.background_permittivity < 0.0 {
            return Err(GeometryError::InvalidBackground(self.background_permittivity));
        }
        for region in &self.regions {
            if !region.bounds.is_well_formed() {
                return Err(GeometryError::MalformedBounds {
                    name: region.name.clone(),
                    min: region.bounds.min,
                    max: region.bounds.max,
                });
            }
            for (property, value) in [
                ("conductivity", region.conductivity),
                ("permittivity", region.permittivity),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(GeometryError::InvalidProperty {
                        name: region.name.clone(),
                        property,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply a transform to every region and port. The merge tolerance is
    /// scaled with the geometry.
    pub fn transformed(&self, transform: &Transform) -> GeometryModel {
        GeometryModel {
            regions: self
                .regions
                .iter()
                .map(|r| MaterialRegion {
                    bounds: transform.apply_box(&r.bounds),
                    ..r.clone()
                })
                .collect(),
            ports: self
                .ports
                .iter()
                .map(|p| Port {
                    position: transform.apply(&p.position),
                    ..p.clone()
                })
                .collect(),
            tolerance: self.tolerance * transform.scale_factor(),
            background_permittivity: self.background_permittivity,
        }
    }
}
