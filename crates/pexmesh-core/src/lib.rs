//! # pexmesh Core
//!
//! The numerical front end of the extraction flow. A [`GeometryModel`] of
//! axis-aligned conductor and dielectric regions is turned into a
//! non-uniform rectilinear grid, every cell is classified, conductor cells
//! are collapsed into nodes, and one sparse stiffness matrix is assembled per
//! coupling law.
//!
//! ## Pipeline
//!
//! 1. [`mesh::generate_grid`]: tolerance-aware coordinate unification.
//! 2. [`marker::mark_conductors`]: cell classification, port tagging and
//!    node numbering through a disjoint-set forest.
//! 3. [`assembly::assemble`]: coupling traversal over the marked mesh, once
//!    per [`coupling::CouplingLaw`].
//!
//! [`system::ExtractionSystem`] runs the stages in order and keeps their
//! results together with per-stage timing reports.
//!
//! ## Modules
//!
//! - [`error`]: the error taxonomy shared by all stages.
//! - [`mesh`]: coordinate sets and the grid.
//! - [`disjoint`]: union-find over cell indices.
//! - [`marker`]: classification table and nodes.
//! - [`coupling`]: conductance and capacitance laws.
//! - [`sparse`]: CSR storage.
//! - [`assembly`]: the stiffness assembler.
//! - [`system`]: the run state and checkpoint snapshot.
//!
//! [`GeometryModel`]: pexmesh_geometry::GeometryModel

pub mod assembly;
pub mod coupling;
pub mod disjoint;
pub mod error;
pub mod marker;
pub mod mesh;
pub mod sparse;
pub mod system;

pub use assembly::{assemble, BoundaryCondition, StiffnessMatrix};
pub use coupling::{CapacitanceLaw, ConductanceLaw, CouplingLaw, EPSILON_0};
pub use error::{MeshError, Result};
pub use marker::{mark_conductors, CellClass, CellTag, MarkedMesh, Node, NodeKind};
pub use mesh::{generate_grid, CoordinateSet, Grid, MeshOptions};
pub use sparse::CsrMatrix;
pub use system::{ExtractionConfig, ExtractionSystem, StageReport, SystemSnapshot};
