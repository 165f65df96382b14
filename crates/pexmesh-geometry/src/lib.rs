//! # pexmesh Geometry
//!
//! The in-memory geometry model consumed by the meshing pipeline. This crate
//! provides:
//!
//! - **Bounds** ([`bounds`]): Axis-aligned boxes and the [`Axis`](bounds::Axis)
//!   enumeration shared by every stage.
//! - **Material regions** ([`region`]): Volumes carrying conductivity and
//!   relative permittivity.
//! - **Ports** ([`port`]): Named terminals with a location and a role.
//! - **Model** ([`model`]): The aggregate handed to the mesh generator.
//! - **Transformations** ([`transform`]): Length-unit scaling.
//!
//! The model makes no assumption about where it came from: readers of layout
//! or system-description files build a [`GeometryModel`](model::GeometryModel)
//! and hand it over.

pub mod bounds;
pub mod model;
pub mod port;
pub mod region;
pub mod transform;

pub use bounds::{Aabb, Axis};
pub use model::{GeometryError, GeometryModel};
pub use port::{Port, PortRole};
pub use region::MaterialRegion;
pub use transform::Transform;
