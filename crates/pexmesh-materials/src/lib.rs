//! # pexmesh Materials
//!
//! Material property providers for the pexmesh front end. All materials
//! implement the [`MaterialProvider`](provider::MaterialProvider) trait, which
//! reports the two scalar properties the stiffness assembler consumes:
//! conductivity and relative permittivity.
//!
//! ## Built-in library
//!
//! | Material | Kind | Source of values |
//! |----------|------|------------------|
//! | Cu, Al, W | Metals | Bulk room-temperature conductivity |
//! | SiO2, Si3N4, low-k | Dielectrics | Typical BEOL relative permittivity |
//! | air | Background | Vacuum |
//!
//! See [`library::MaterialLibrary`] for lookup by name.

pub mod library;
pub mod provider;

pub use library::{InterconnectMaterial, MaterialLibrary};
pub use provider::{MaterialError, MaterialProvider};
