//! Conductor marking: cell classification, port tagging and node numbering.
//!
//! Regions are painted onto the grid in declaration order. A cell covered by
//! a conductor stays a conductor; dielectrics stack with the later layer on
//! top; two differently named conductors claiming one cell abort the run.
//!
//! The resulting table is read-only and is handed by reference to the
//! stiffness assembler. Its unknowns are:
//!
//! 1. one terminal node per port location, in port order, and
//! 2. one node per connected body of the remaining conductor cells, numbered
//!    by the body's smallest linear cell index.

use log::{debug, info};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use pexmesh_geometry::{Axis, GeometryModel, MaterialRegion};

use crate::disjoint::DisjointSet;
use crate::error::{MeshError, Result};
use crate::mesh::Grid;

/// What fills a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellClass {
    Conductor { region: usize },
    Dielectric { region: usize },
    /// Covered by no region; uses the background permittivity.
    #[default]
    Air,
}

impl CellClass {
    pub fn is_conductor(&self) -> bool {
        matches!(self, CellClass::Conductor { .. })
    }

    /// Index of the region filling the cell, if any.
    pub fn region(&self) -> Option<usize> {
        match *self {
            CellClass::Conductor { region } | CellClass::Dielectric { region } => Some(region),
            CellClass::Air => None,
        }
    }
}

/// Classification of one cell plus the port terminating on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellTag {
    pub class: CellClass,
    /// Index of the first port tagging this cell.
    pub port: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Terminal cell shared by one or more coincident ports.
    Port { ports: Vec<usize> },
    /// Connected conductor body not tied to a port.
    Body,
}

/// One unknown of the assembled system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub index: usize,
    pub kind: NodeKind,
    /// Region of the anchor cell.
    pub region: usize,
    /// Cell with the smallest linear index belonging to the node.
    pub anchor: [usize; 3],
    /// Number of cells collapsed into the node.
    pub cells: usize,
}

impl Node {
    /// Human-readable name: the first port name for terminals, the region
    /// name and anchor cell for bodies.
    pub fn label(&self, model: &GeometryModel) -> String {
        match &self.kind {
            NodeKind::Port { ports } => ports
                .first()
                .and_then(|&p| model.ports.get(p))
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("port#{}", self.index)),
            NodeKind::Body => {
                let region = model
                    .regions
                    .get(self.region)
                    .map(|r| r.name.as_str())
                    .unwrap_or("?");
                let [i, j, k] = self.anchor;
                format!("{region}@{i}_{j}_{k}")
            }
        }
    }
}

/// The classified mesh: grid, per-cell table and node numbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkedMesh {
    pub grid: Grid,
    pub cells: Array3<CellTag>,
    pub node_of: Array3<Option<usize>>,
    pub nodes: Vec<Node>,
}

/// Cell counts per classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub conductor: usize,
    pub dielectric: usize,
    pub air: usize,
    pub port: usize,
}

impl MarkedMesh {
    pub fn tag(&self, cell: [usize; 3]) -> &CellTag {
        &self.cells[cell]
    }

    pub fn node_at(&self, cell: [usize; 3]) -> Option<usize> {
        self.node_of[cell]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node carrying the given port.
    pub fn port_node(&self, port: usize) -> Option<usize> {
        self.nodes.iter().position(|n| match &n.kind {
            NodeKind::Port { ports } => ports.contains(&port),
            NodeKind::Body => false,
        })
    }

    pub fn class_counts(&self) -> ClassCounts {
        let mut counts = ClassCounts::default();
        for tag in self.cells.iter() {
            match tag.class {
                CellClass::Conductor { .. } => counts.conductor += 1,
                CellClass::Dielectric { .. } => counts.dielectric += 1,
                CellClass::Air => counts.air += 1,
            }
            if tag.port.is_some() {
                counts.port += 1;
            }
        }
        counts
    }
}

/// Classify every cell of `grid` against the regions of `model`, tag port
/// cells and number the conductor nodes.
pub fn mark_conductors(model: &GeometryModel, grid: &Grid) -> Result<MarkedMesh> {
    let shape = grid.shape();
    let mut cells = Array3::from_elem(shape, CellTag::default());

    for (r, region) in model.regions.iter().enumerate() {
        paint_region(&mut cells, model, grid, r, region)?;
    }

    let port_cells = tag_ports(&mut cells, model, grid)?;
    let (node_of, nodes) = number_nodes(&cells, grid, &port_cells);

    let mesh = MarkedMesh {
        grid: grid.clone(),
        cells,
        node_of,
        nodes,
    };
    let counts = mesh.class_counts();
    let port_nodes = mesh
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Port { .. }))
        .count();
    info!(
        "Marked {} cells: {} conductor, {} dielectric, {} air; {} node(s) ({} port, {} body)",
        grid.cell_count(),
        counts.conductor,
        counts.dielectric,
        counts.air,
        mesh.nodes.len(),
        port_nodes,
        mesh.nodes.len() - port_nodes
    );
    for node in &mesh.nodes {
        debug!("Node {} '{}': {} cell(s)", node.index, node.label(model), node.cells);
    }
    Ok(mesh)
}

fn paint_region(
    cells: &mut Array3<CellTag>,
    model: &GeometryModel,
    grid: &Grid,
    r: usize,
    region: &MaterialRegion,
) -> Result<()> {
    let mut ranges = Vec::with_capacity(3);
    for axis in Axis::ALL {
        let (lo, hi) = region.bounds.interval(axis);
        let range = grid.axis(axis).cell_range(lo, hi, grid.tolerance).ok_or_else(|| {
            MeshError::InvalidInput(format!(
                "bounds of region '{}' along {} do not lie on grid lines",
                region.name, axis
            ))
        })?;
        if range.is_empty() {
            return Err(MeshError::InvalidInput(format!(
                "region '{}' has no thickness along {} after merging under tolerance {:e}",
                region.name, axis, grid.tolerance
            )));
        }
        ranges.push(range);
    }

    for i in ranges[0].clone() {
        for j in ranges[1].clone() {
            for k in ranges[2].clone() {
                let tag = &mut cells[[i, j, k]];
                match tag.class {
                    CellClass::Conductor { region: first } if region.is_conductor() => {
                        let first_name = &model.regions[first].name;
                        if *first_name != region.name {
                            return Err(MeshError::AmbiguousConductorOverlap {
                                cell: [i, j, k],
                                first: first_name.clone(),
                                second: region.name.clone(),
                            });
                        }
                    }
                    CellClass::Conductor { .. } => {}
                    _ if region.is_conductor() => tag.class = CellClass::Conductor { region: r },
                    _ => tag.class = CellClass::Dielectric { region: r },
                }
            }
        }
    }
    Ok(())
}

/// Attach every port to a conductor cell. Returns the cell of each port.
fn tag_ports(
    cells: &mut Array3<CellTag>,
    model: &GeometryModel,
    grid: &Grid,
) -> Result<Vec<[usize; 3]>> {
    let mut vertices: Vec<[usize; 3]> = Vec::with_capacity(model.ports.len());
    let mut port_cells: Vec<[usize; 3]> = Vec::with_capacity(model.ports.len());

    for (p, port) in model.ports.iter().enumerate() {
        let mut vertex = [0usize; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            vertex[a] = grid
                .axis(axis)
                .snap(port.position[a], grid.tolerance)
                .ok_or_else(|| {
                    MeshError::invalid_port(
                        &port.name,
                        format!("{} coordinate is not a grid line", axis),
                    )
                })?;
        }

        let cell = incident_conductor(cells, grid, vertex).ok_or_else(|| {
            MeshError::invalid_port(
                &port.name,
                format!("location {:?} does not touch a conductor", port.position),
            )
        })?;

        let tag = &mut cells[cell];
        match tag.port {
            None => tag.port = Some(p),
            Some(q) => {
                let other = &model.ports[q];
                if vertices[q] != vertex {
                    return Err(MeshError::invalid_port(
                        &port.name,
                        format!("resolves to the same cell {:?} as port '{}'", cell, other.name),
                    ));
                }
                if other.role != port.role {
                    return Err(MeshError::invalid_port(
                        &port.name,
                        format!(
                            "shares its location with port '{}' but has role {} instead of {}",
                            other.name, port.role, other.role
                        ),
                    ));
                }
                debug!("Port '{}' aliases port '{}'", port.name, other.name);
            }
        }
        vertices.push(vertex);
        port_cells.push(cell);
    }
    Ok(port_cells)
}

/// First conductor cell, in ascending (i, j, k) order, among the cells
/// sharing grid vertex `vertex`.
fn incident_conductor(
    cells: &Array3<CellTag>,
    grid: &Grid,
    vertex: [usize; 3],
) -> Option<[usize; 3]> {
    let (nx, ny, nz) = grid.shape();
    let span = |v: usize, n: usize| v.saturating_sub(1)..(v + 1).min(n);
    for i in span(vertex[0], nx) {
        for j in span(vertex[1], ny) {
            for k in span(vertex[2], nz) {
                if cells[[i, j, k]].class.is_conductor() {
                    return Some([i, j, k]);
                }
            }
        }
    }
    None
}

fn number_nodes(
    cells: &Array3<CellTag>,
    grid: &Grid,
    port_cells: &[[usize; 3]],
) -> (Array3<Option<usize>>, Vec<Node>) {
    let shape = grid.shape();
    let (nx, ny, nz) = shape;
    let mut node_of: Array3<Option<usize>> = Array3::from_elem(shape, None);
    let mut nodes: Vec<Node> = Vec::new();

    for (p, &cell) in port_cells.iter().enumerate() {
        match node_of[cell] {
            Some(n) => {
                if let NodeKind::Port { ports } = &mut nodes[n].kind {
                    ports.push(p);
                }
            }
            None => {
                let index = nodes.len();
                node_of[cell] = Some(index);
                nodes.push(Node {
                    index,
                    kind: NodeKind::Port { ports: vec![p] },
                    region: cells[cell].class.region().unwrap_or_default(),
                    anchor: cell,
                    cells: 1,
                });
            }
        }
    }

    let is_body_cell = |c: [usize; 3]| {
        let tag = &cells[c];
        tag.class.is_conductor() && tag.port.is_none()
    };

    let mut sets = DisjointSet::new(grid.cell_count());
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let cell = [i, j, k];
                if !is_body_cell(cell) {
                    continue;
                }
                for axis in Axis::ALL {
                    let a = axis.index();
                    let mut next = cell;
                    next[a] += 1;
                    if next[a] < [nx, ny, nz][a] && is_body_cell(next) {
                        sets.union(grid.linear_index(cell), grid.linear_index(next));
                    }
                }
            }
        }
    }

    let mut body_of_root: Vec<Option<usize>> = vec![None; grid.cell_count()];
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let cell = [i, j, k];
                if !is_body_cell(cell) {
                    continue;
                }
                let root = sets.find(grid.linear_index(cell));
                let index = match body_of_root[root] {
                    Some(n) => {
                        nodes[n].cells += 1;
                        n
                    }
                    None => {
                        let n = nodes.len();
                        body_of_root[root] = Some(n);
                        nodes.push(Node {
                            index: n,
                            kind: NodeKind::Body,
                            region: cells[cell].class.region().unwrap_or_default(),
                            anchor: cell,
                            cells: 1,
                        });
                        n
                    }
                };
                node_of[cell] = Some(index);
            }
        }
    }
    (node_of, nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{generate_grid, MeshOptions};
    use pexmesh_geometry::{Aabb, Port, PortRole};

    fn bar(x0: f64, x1: f64) -> Aabb {
        Aabb::new([x0, 0.0, 0.0], [x1, 1.0, 1.0])
    }

    fn mark(model: &GeometryModel) -> Result<MarkedMesh> {
        let grid = generate_grid(model, &MeshOptions::default())?;
        mark_conductors(model, &grid)
    }

    fn two_bars() -> GeometryModel {
        GeometryModel::new(1e-9)
            .with_region(MaterialRegion::dielectric("ox", bar(0.0, 3.0), 3.9))
            .with_region(MaterialRegion::conductor("c1", bar(0.0, 1.0), 5.8e7))
            .with_region(MaterialRegion::conductor("c2", bar(2.0, 3.0), 5.8e7))
    }

    #[test]
    fn test_classification_and_bodies() {
        let mesh = mark(&two_bars()).unwrap();
        assert_eq!(mesh.cells.dim(), (3, 1, 1));
        assert_eq!(mesh.tag([0, 0, 0]).class, CellClass::Conductor { region: 1 });
        assert_eq!(mesh.tag([1, 0, 0]).class, CellClass::Dielectric { region: 0 });
        assert_eq!(mesh.tag([2, 0, 0]).class, CellClass::Conductor { region: 2 });

        assert_eq!(mesh.node_count(), 2);
        assert_eq!(mesh.node_at([0, 0, 0]), Some(0));
        assert_eq!(mesh.node_at([1, 0, 0]), None);
        assert_eq!(mesh.node_at([2, 0, 0]), Some(1));
        assert_eq!(mesh.nodes[1].kind, NodeKind::Body);
        assert_eq!(mesh.nodes[1].label(&two_bars()), "c2@2_0_0");
    }

    #[test]
    fn test_overlapping_conductors_fail() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::conductor("c1", bar(0.0, 2.0), 5.8e7))
            .with_region(MaterialRegion::conductor("c2", bar(1.0, 3.0), 3.77e7));
        match mark(&model) {
            Err(MeshError::AmbiguousConductorOverlap { cell, first, second }) => {
                assert_eq!(cell, [1, 0, 0]);
                assert_eq!(first, "c1");
                assert_eq!(second, "c2");
            }
            other => panic!("expected overlap error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_thickness_region_is_rejected() {
        let sheet = Aabb::new([1.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let model = two_bars().with_region(MaterialRegion::conductor("sheet", sheet, 5.8e7));
        match mark(&model) {
            Err(MeshError::InvalidInput(msg)) => {
                assert!(msg.contains("'sheet'"));
                assert!(msg.contains("along x"));
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_same_name_overlap_is_one_body() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::conductor("net", bar(0.0, 2.0), 5.8e7))
            .with_region(MaterialRegion::conductor("net", bar(1.0, 3.0), 5.8e7));
        let mesh = mark(&model).unwrap();
        assert_eq!(mesh.tag([1, 0, 0]).class, CellClass::Conductor { region: 0 });
        assert_eq!(mesh.tag([2, 0, 0]).class, CellClass::Conductor { region: 1 });
        assert_eq!(mesh.node_count(), 1);
        assert_eq!(mesh.nodes[0].cells, 3);
    }

    #[test]
    fn test_touching_conductors_merge() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::conductor("via", bar(0.0, 1.0), 1.79e7))
            .with_region(MaterialRegion::conductor("m1", bar(1.0, 2.0), 5.8e7));
        let mesh = mark(&model).unwrap();
        assert_eq!(mesh.node_count(), 1);
        assert_eq!(mesh.nodes[0].region, 0);
        assert_eq!(mesh.nodes[0].cells, 2);
    }

    #[test]
    fn test_conductor_beats_dielectric_in_any_order() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::conductor("c", bar(0.0, 1.0), 5.8e7))
            .with_region(MaterialRegion::dielectric("ox", bar(0.0, 2.0), 3.9))
            .with_region(MaterialRegion::dielectric("nit", bar(1.5, 2.0), 7.5));
        let mesh = mark(&model).unwrap();
        assert_eq!(mesh.tag([0, 0, 0]).class, CellClass::Conductor { region: 0 });
        assert_eq!(mesh.tag([1, 0, 0]).class, CellClass::Dielectric { region: 1 });
        assert_eq!(mesh.tag([2, 0, 0]).class, CellClass::Dielectric { region: 2 });
    }

    #[test]
    fn test_uncovered_cells_are_air() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::dielectric("ox", bar(0.0, 1.0), 3.9))
            .with_region(MaterialRegion::conductor("c", bar(2.0, 3.0), 5.8e7));
        let mesh = mark(&model).unwrap();
        assert_eq!(mesh.tag([1, 0, 0]).class, CellClass::Air);
        let counts = mesh.class_counts();
        assert_eq!((counts.conductor, counts.dielectric, counts.air), (1, 1, 1));
    }

    #[test]
    fn test_port_nodes_come_first() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::dielectric("ox", bar(0.0, 4.0), 3.9))
            .with_region(MaterialRegion::conductor("c1", bar(0.0, 2.0), 5.8e7))
            .with_region(MaterialRegion::conductor("c2", bar(3.0, 4.0), 5.8e7))
            .with_port(Port::new("out", [4.0, 1.0, 1.0], PortRole::Output))
            .with_port(Port::new("in", [1.0, 0.0, 0.0], PortRole::Input));
        let mesh = mark(&model).unwrap();

        // x lines: 0 1 2 3 4
        assert_eq!(mesh.tag([3, 0, 0]).port, Some(0));
        assert_eq!(mesh.tag([0, 0, 0]).port, Some(1));
        assert_eq!(mesh.node_at([3, 0, 0]), Some(0));
        assert_eq!(mesh.node_at([0, 0, 0]), Some(1));
        assert_eq!(mesh.node_at([1, 0, 0]), Some(2));
        assert_eq!(mesh.node_count(), 3);
        assert_eq!(mesh.port_node(1), Some(1));
        assert_eq!(mesh.nodes[0].label(&model), "out");
        assert_eq!(mesh.class_counts().port, 2);
    }

    #[test]
    fn test_coincident_ports_share_a_node() {
        let model = two_bars()
            .with_port(Port::new("a", [0.0, 0.0, 0.0], PortRole::Input))
            .with_port(Port::new("b", [0.0, 0.0, 0.0], PortRole::Input));
        let mesh = mark(&model).unwrap();
        assert_eq!(mesh.nodes[0].kind, NodeKind::Port { ports: vec![0, 1] });
        assert_eq!(mesh.port_node(1), Some(0));
        assert_eq!(mesh.node_count(), 2);
    }

    #[test]
    fn test_port_off_conductor_is_invalid() {
        let model = two_bars().with_port(Port::new("float", [1.5, 0.0, 0.0], PortRole::Output));
        let err = mark(&model).unwrap_err();
        assert_eq!(err.kind(), "InvalidPort");
    }

    #[test]
    fn test_distinct_ports_on_one_cell_are_invalid() {
        let model = two_bars()
            .with_port(Port::new("a", [0.0, 0.0, 0.0], PortRole::Input))
            .with_port(Port::new("b", [1.0, 1.0, 1.0], PortRole::Input));
        match mark(&model) {
            Err(MeshError::InvalidPort { port, reason }) => {
                assert_eq!(port, "b");
                assert!(reason.contains("'a'"));
            }
            other => panic!("expected InvalidPort, got {other:?}"),
        }
    }
}
