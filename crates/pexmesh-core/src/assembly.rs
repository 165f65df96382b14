//! Stiffness assembly over a marked mesh.
//!
//! Every node cell looks along the positive direction of each axis:
//!
//! - a neighbouring cell of another node is a metal contact, coupled through
//!   the two half cells in series;
//! - otherwise the path is followed through dielectric and air cells,
//!   summing `width / property`, until it meets a node or the domain face.
//!
//! Each coupling `c` between nodes `a` and `b` stamps `+c` on both diagonals
//! and `-c` on both off-diagonals. Couplings to the outside world (port
//! source impedances, grounded domain faces) go to an extra reference node
//! that is eliminated afterwards; its column becomes the `external` term, so
//! every row sums to its external injection.
//!
//! The traversal is split into one work item per `i` slab and run through a
//! [`ComputeBackend`]. Duplicate entries are summed in sorted order, so the
//! result does not depend on the backend or on the visiting order.

use std::sync::{Mutex, PoisonError};

use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use pexmesh_compute::{ComputeBackend, Triplet};
use pexmesh_geometry::{Axis, GeometryModel, MaterialRegion};

use crate::coupling::CouplingLaw;
use crate::error::{MeshError, Result};
use crate::marker::MarkedMesh;
use crate::sparse::CsrMatrix;

/// Treatment of the outer faces of the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryCondition {
    /// Flux does not leave the domain.
    #[default]
    Open,
    /// Domain faces are held at the reference potential.
    Grounded,
}

/// An assembled system matrix with its external injection terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StiffnessMatrix {
    /// Name of the coupling law that produced the matrix.
    pub law: String,
    pub matrix: CsrMatrix,
    /// Coupling of each node to the external reference. Row `i` sums to
    /// `external[i]`.
    pub external: Vec<f64>,
}

impl StiffnessMatrix {
    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.matrix.get(row, col)
    }

    pub fn row_sum(&self, row: usize) -> f64 {
        self.matrix.row_sum(row)
    }

    pub fn triplets(&self) -> Vec<Triplet> {
        self.matrix.triplets()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        self.matrix.to_dense()
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        self.matrix.is_symmetric(tol)
    }

    /// Largest deviation of a row sum from its external term.
    pub fn conservation_residual(&self) -> f64 {
        (0..self.dim())
            .map(|r| (self.row_sum(r) - self.external[r]).abs())
            .fold(0.0, f64::max)
    }
}

/// Assemble the stiffness matrix of `mesh` under `law`.
pub fn assemble(
    mesh: &MarkedMesh,
    geometry: &GeometryModel,
    law: &dyn CouplingLaw,
    boundary: BoundaryCondition,
    backend: &dyn ComputeBackend,
) -> Result<StiffnessMatrix> {
    let n = mesh.node_count();
    let stamper = Stamper {
        mesh,
        regions: &geometry.regions,
        background: geometry.background_permittivity,
        law,
        boundary,
        reference: n,
    };

    let (nx, ny, nz) = mesh.grid.shape();
    let first_error: Mutex<Option<(usize, MeshError)>> = Mutex::new(None);

    let stamp_slab = |i: usize, out: &mut Vec<Triplet>| {
        for j in 0..ny {
            for k in 0..nz {
                let cell = [i, j, k];
                if let Err(err) = stamper.stamp_cell(cell, out) {
                    let position = mesh.grid.linear_index(cell);
                    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.as_ref().map_or(true, |(p, _)| position < *p) {
                        *slot = Some((position, err));
                    }
                    return;
                }
            }
        }
    };

    let mut stamps = backend.parallel_stamp(nx, &stamp_slab)?;
    if let Some((_, err)) = first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    debug!(
        "{}: {} stamp(s) from {} slab(s) on {}",
        law.name(),
        stamps.len(),
        nx,
        backend.device_info().name
    );

    for (p, port) in geometry.ports.iter().enumerate() {
        let admittance = law.port_admittance(port);
        if admittance == 0.0 {
            continue;
        }
        if !admittance.is_finite() {
            return Err(MeshError::invalid_port(
                &port.name,
                format!("admittance {admittance} is not finite"),
            ));
        }
        let node = mesh
            .port_node(p)
            .ok_or_else(|| MeshError::invalid_port(&port.name, "port has no terminal node"))?;
        stamp_reference(&mut stamps, node, n, admittance);
    }

    let (internal, external) = split_reference(stamps, n);
    let matrix = CsrMatrix::from_triplets(n, internal);
    info!(
        "Assembled {} matrix: {}x{}, {} non-zero(s)",
        law.name(),
        n,
        n,
        matrix.nnz()
    );

    Ok(StiffnessMatrix {
        law: law.name().to_string(),
        matrix,
        external,
    })
}

struct Stamper<'a> {
    mesh: &'a MarkedMesh,
    regions: &'a [MaterialRegion],
    background: f64,
    law: &'a dyn CouplingLaw,
    boundary: BoundaryCondition,
    reference: usize,
}

/// Where a path through the medium ends.
enum PathEnd {
    Node(usize),
    Face,
}

impl Stamper<'_> {
    fn stamp_cell(&self, cell: [usize; 3], out: &mut Vec<Triplet>) -> Result<()> {
        let Some(a) = self.mesh.node_at(cell) else {
            return Ok(());
        };
        for axis in Axis::ALL {
            self.stamp_forward(cell, a, axis, out)?;
            if self.boundary == BoundaryCondition::Grounded {
                self.stamp_backward(cell, a, axis, out)?;
            }
        }
        Ok(())
    }

    fn stamp_forward(
        &self,
        cell: [usize; 3],
        a: usize,
        axis: Axis,
        out: &mut Vec<Triplet>,
    ) -> Result<()> {
        let Some(next) = self.step(cell, axis, true) else {
            return Ok(());
        };
        let area = self.mesh.grid.face_area(cell, axis);

        if let Some(b) = self.mesh.node_at(next) {
            if b == a {
                return Ok(());
            }
            let (Some(sa), Some(sb)) = (self.contact(cell), self.contact(next)) else {
                return Ok(());
            };
            if sa <= 0.0 || sb <= 0.0 {
                return Ok(());
            }
            let (wa, wb) = (self.mesh.grid.width(cell, axis), self.mesh.grid.width(next, axis));
            let resistance = 0.5 * wa / sa + 0.5 * wb / sb;
            let c = checked(cell, axis, 0.5 * (wa + wb), area / resistance)?;
            stamp_pair(out, a, b, c);
            return Ok(());
        }

        match self.follow_path(next, axis, true) {
            Some((PathEnd::Node(b), _, _)) if b == a => {}
            Some((PathEnd::Node(b), resistance, distance)) => {
                let c = checked(cell, axis, distance, area / resistance)?;
                stamp_pair(out, a, b, c);
            }
            Some((PathEnd::Face, resistance, distance))
                if self.boundary == BoundaryCondition::Grounded =>
            {
                let c = checked(cell, axis, distance, area / resistance)?;
                stamp_reference(out, a, self.reference, c);
            }
            _ => {}
        }
        Ok(())
    }

    /// Ground coupling towards the lower face. Paths ending on a node are
    /// stamped by that node's forward pass.
    fn stamp_backward(
        &self,
        cell: [usize; 3],
        a: usize,
        axis: Axis,
        out: &mut Vec<Triplet>,
    ) -> Result<()> {
        let Some(prev) = self.step(cell, axis, false) else {
            return Ok(());
        };
        if self.mesh.node_at(prev).is_some() {
            return Ok(());
        }
        if let Some((PathEnd::Face, resistance, distance)) = self.follow_path(prev, axis, false) {
            let area = self.mesh.grid.face_area(cell, axis);
            let c = checked(cell, axis, distance, area / resistance)?;
            stamp_reference(out, a, self.reference, c);
        }
        Ok(())
    }

    /// Walk from `start` through non-node cells. Returns the end of the path
    /// with the accumulated `sum(width / property)` and `sum(width)`, or
    /// `None` if a cell with zero property blocks it.
    fn follow_path(
        &self,
        start: [usize; 3],
        axis: Axis,
        forward: bool,
    ) -> Option<(PathEnd, f64, f64)> {
        let mut resistance = 0.0;
        let mut distance = 0.0;
        let mut current = Some(start);
        while let Some(cell) = current {
            if let Some(b) = self.mesh.node_at(cell) {
                return Some((PathEnd::Node(b), resistance, distance));
            }
            let property = self
                .law
                .medium_property(&self.mesh.tag(cell).class, self.regions, self.background);
            if property.is_nan() || property <= 0.0 {
                return None;
            }
            let width = self.mesh.grid.width(cell, axis);
            resistance += width / property;
            distance += width;
            current = self.step(cell, axis, forward);
        }
        Some((PathEnd::Face, resistance, distance))
    }

    /// Neighbouring cell along `axis`, if inside the grid.
    fn step(&self, cell: [usize; 3], axis: Axis, forward: bool) -> Option<[usize; 3]> {
        let a = axis.index();
        let mut next = cell;
        if forward {
            next[a] += 1;
            (next[a] < self.mesh.grid.axis(axis).cells()).then_some(next)
        } else {
            next[a] = cell[a].checked_sub(1)?;
            Some(next)
        }
    }

    fn contact(&self, cell: [usize; 3]) -> Option<f64> {
        let region = self.mesh.tag(cell).class.region()?;
        self.law.contact_property(self.regions.get(region)?)
    }
}

fn checked(cell: [usize; 3], axis: Axis, distance: f64, coefficient: f64) -> Result<f64> {
    if distance > 0.0 && coefficient.is_finite() && coefficient >= 0.0 {
        Ok(coefficient)
    } else {
        Err(MeshError::DegenerateCoupling {
            cell,
            axis,
            distance,
            coefficient,
        })
    }
}

fn stamp_pair(out: &mut Vec<Triplet>, a: usize, b: usize, c: f64) {
    out.push(Triplet::new(a, a, c));
    out.push(Triplet::new(b, b, c));
    out.push(Triplet::new(a, b, -c));
    out.push(Triplet::new(b, a, -c));
}

fn stamp_reference(out: &mut Vec<Triplet>, a: usize, reference: usize, c: f64) {
    out.push(Triplet::new(a, a, c));
    out.push(Triplet::new(a, reference, -c));
}

/// Separate the reference column from the node block. External terms are
/// summed in sorted order per row.
fn split_reference(stamps: Vec<Triplet>, reference: usize) -> (Vec<Triplet>, Vec<f64>) {
    let (mut to_reference, internal): (Vec<Triplet>, Vec<Triplet>) =
        stamps.into_iter().partition(|t| t.col == reference);
    to_reference.sort_by(|a, b| a.row.cmp(&b.row).then(a.value.total_cmp(&b.value)));

    let mut external = vec![0.0; reference];
    for t in to_reference {
        external[t.row] -= t.value;
    }
    (internal, external)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling::{CapacitanceLaw, ConductanceLaw};
    use crate::marker::mark_conductors;
    use crate::mesh::{generate_grid, MeshOptions};
    use approx::assert_relative_eq;
    use pexmesh_compute::{ComputeError, CpuBackend, DeviceInfo, SerialBackend, StampFn};
    use pexmesh_geometry::{Aabb, Port, PortRole};

    fn bar(x0: f64, x1: f64) -> Aabb {
        Aabb::new([x0, 0.0, 0.0], [x1, 1.0, 1.0])
    }

    fn build(
        model: &GeometryModel,
        options: &MeshOptions,
        law: &dyn CouplingLaw,
        boundary: BoundaryCondition,
        backend: &dyn ComputeBackend,
    ) -> Result<StiffnessMatrix> {
        let grid = generate_grid(model, options)?;
        let mesh = mark_conductors(model, &grid)?;
        assemble(&mesh, model, law, boundary, backend)
    }

    fn two_plates(p: f64) -> GeometryModel {
        GeometryModel::new(1e-9)
            .with_region(MaterialRegion::conductor("a", bar(-1.0, 0.0), 5.8e7))
            .with_region(MaterialRegion::dielectric("gap", bar(0.0, 1.0), p))
            .with_region(MaterialRegion::conductor("b", bar(1.0, 2.0), 5.8e7))
    }

    /// Two wires under a nitride cap, with a port on each.
    fn interconnect() -> GeometryModel {
        GeometryModel::new(1e-9)
            .with_region(MaterialRegion::dielectric(
                "ox",
                Aabb::new([0.0, 0.0, 0.0], [10.0, 6.0, 4.0]),
                3.9,
            ))
            .with_region(MaterialRegion::dielectric(
                "cap",
                Aabb::new([0.0, 0.0, 3.0], [10.0, 6.0, 4.0]),
                7.5,
            ))
            .with_region(MaterialRegion::conductor(
                "m1",
                Aabb::new([1.0, 1.0, 1.0], [9.0, 2.0, 2.0]),
                5.8e7,
            ))
            .with_region(MaterialRegion::conductor(
                "m2",
                Aabb::new([1.0, 3.0, 1.0], [9.0, 4.0, 2.0]),
                3.77e7,
            ))
            .with_port(Port::new("in", [1.0, 1.0, 1.0], PortRole::Input))
            .with_port(Port::new("out", [9.0, 4.0, 2.0], PortRole::Output).with_impedance(75.0))
    }

    fn refined() -> MeshOptions {
        MeshOptions { max_step: Some(0.5) }
    }

    #[test]
    fn test_two_node_link() {
        let p = 2.5;
        let k = build(
            &two_plates(p),
            &MeshOptions::default(),
            &CapacitanceLaw::relative(),
            BoundaryCondition::Open,
            &SerialBackend,
        )
        .unwrap();
        assert_eq!(k.law, "capacitance");
        assert_eq!(k.dim(), 2);
        let dense = k.to_dense();
        assert_relative_eq!(dense[[0, 0]], p, max_relative = 1e-12);
        assert_relative_eq!(dense[[1, 1]], p, max_relative = 1e-12);
        assert_relative_eq!(dense[[0, 1]], -p, max_relative = 1e-12);
        assert_relative_eq!(dense[[1, 0]], -p, max_relative = 1e-12);
        assert_eq!(k.external, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dielectric_gap_blocks_conductance() {
        let k = build(
            &two_plates(3.9),
            &MeshOptions::default(),
            &ConductanceLaw,
            BoundaryCondition::Open,
            &SerialBackend,
        )
        .unwrap();
        assert_eq!(k.dim(), 2);
        assert_eq!(k.nnz(), 0);
    }

    #[test]
    fn test_grounded_faces_feed_external() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::dielectric("air", bar(0.0, 3.0), 1.0))
            .with_region(MaterialRegion::conductor("c", bar(1.0, 2.0), 5.8e7));
        let k = build(
            &model,
            &MeshOptions::default(),
            &CapacitanceLaw::relative(),
            BoundaryCondition::Grounded,
            &SerialBackend,
        )
        .unwrap();
        assert_eq!(k.dim(), 1);
        assert_relative_eq!(k.get(0, 0), 2.0);
        assert_relative_eq!(k.external[0], 2.0);
        assert_relative_eq!(k.row_sum(0), k.external[0]);
    }

    #[test]
    fn test_ports_terminate_on_source_impedance() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::conductor("line", bar(0.0, 2.0), 1.0))
            .with_port(Port::new("in", [0.0, 0.0, 0.0], PortRole::Input))
            .with_port(Port::new("out", [2.0, 1.0, 1.0], PortRole::Output));
        let k = build(
            &model,
            &MeshOptions { max_step: Some(1.0) },
            &ConductanceLaw,
            BoundaryCondition::Open,
            &SerialBackend,
        )
        .unwrap();
        assert_eq!(k.dim(), 2);
        assert_relative_eq!(k.get(0, 0), 1.02, max_relative = 1e-12);
        assert_relative_eq!(k.get(1, 1), 1.02, max_relative = 1e-12);
        assert_relative_eq!(k.get(0, 1), -1.0, max_relative = 1e-12);
        assert_relative_eq!(k.external[0], 0.02, max_relative = 1e-12);
        assert_relative_eq!(k.external[1], 0.02, max_relative = 1e-12);
        assert!(k.conservation_residual() < 1e-12);
    }

    #[test]
    fn test_symmetric_and_conservative() {
        let model = interconnect();
        for boundary in [BoundaryCondition::Open, BoundaryCondition::Grounded] {
            for law in [&ConductanceLaw as &dyn CouplingLaw, &CapacitanceLaw::relative()] {
                let k = build(&model, &refined(), law, boundary, &SerialBackend).unwrap();
                assert!(k.is_symmetric(0.0), "{} {:?}", law.name(), boundary);
                let scale = (0..k.dim()).map(|r| k.get(r, r).abs()).fold(0.0, f64::max);
                assert!(k.conservation_residual() <= 1e-9 * scale);
                if boundary == BoundaryCondition::Open && law.name() == "capacitance" {
                    assert!(k.external.iter().all(|&e| e == 0.0));
                }
            }
        }
    }

    #[test]
    fn test_backends_agree_bit_for_bit() {
        let model = interconnect();
        let cpu = CpuBackend::with_threads(4).unwrap();
        let serial = build(
            &model,
            &refined(),
            &CapacitanceLaw::absolute(),
            BoundaryCondition::Grounded,
            &SerialBackend,
        )
        .unwrap();
        let parallel = build(
            &model,
            &refined(),
            &CapacitanceLaw::absolute(),
            BoundaryCondition::Grounded,
            &cpu,
        )
        .unwrap();
        assert_eq!(serial, parallel);
    }

    /// Runs the items backwards and returns their stamps backwards.
    struct ReversedBackend;

    impl ComputeBackend for ReversedBackend {
        fn device_info(&self) -> DeviceInfo {
            SerialBackend.device_info()
        }

        fn parallel_stamp(
            &self,
            items: usize,
            stamp_fn: &StampFn<'_>,
        ) -> std::result::Result<Vec<Triplet>, ComputeError> {
            let mut out = Vec::new();
            for item in (0..items).rev() {
                let mut buf = Vec::new();
                stamp_fn(item, &mut buf);
                buf.reverse();
                out.extend(buf);
            }
            Ok(out)
        }
    }

    #[test]
    fn test_visiting_order_does_not_matter() {
        let grounded = |model: &GeometryModel, backend: &dyn ComputeBackend| {
            build(model, &refined(), &ConductanceLaw, BoundaryCondition::Grounded, backend).unwrap()
        };
        let model = interconnect();
        let forward = grounded(&model, &SerialBackend);
        let backward = grounded(&model, &ReversedBackend);
        assert_eq!(forward, backward);

        let mut reordered = model.clone();
        reordered.regions.swap(2, 3);
        let swapped = grounded(&reordered, &SerialBackend);
        assert_eq!(forward.matrix, swapped.matrix);
        assert_eq!(forward.external, swapped.external);
    }

    #[test]
    fn test_loop_back_to_same_node_is_skipped() {
        let model = GeometryModel::new(1e-9)
            .with_region(MaterialRegion::dielectric(
                "ox",
                Aabb::new([0.0; 3], [3.0, 2.0, 1.0]),
                3.9,
            ))
            .with_region(MaterialRegion::conductor(
                "u",
                Aabb::new([0.0; 3], [3.0, 1.0, 1.0]),
                5.8e7,
            ))
            .with_region(MaterialRegion::conductor(
                "u",
                Aabb::new([0.0; 3], [1.0, 2.0, 1.0]),
                5.8e7,
            ))
            .with_region(MaterialRegion::conductor(
                "u",
                Aabb::new([2.0, 0.0, 0.0], [3.0, 2.0, 1.0]),
                5.8e7,
            ));
        let k = build(
            &model,
            &MeshOptions::default(),
            &CapacitanceLaw::relative(),
            BoundaryCondition::Open,
            &SerialBackend,
        )
        .unwrap();
        assert_eq!(k.dim(), 1);
        assert_eq!(k.nnz(), 0);
    }

    #[test]
    fn test_overflowing_coefficient_is_degenerate() {
        let wide = |x0: f64, x1: f64| Aabb::new([x0, 0.0, 0.0], [x1, 1e200, 1e200]);
        let model = GeometryModel::new(0.0)
            .with_region(MaterialRegion::conductor("a", wide(0.0, 1.0), 5.8e7))
            .with_region(MaterialRegion::dielectric("gap", wide(1.0, 2.0), 3.9))
            .with_region(MaterialRegion::conductor("b", wide(2.0, 3.0), 5.8e7));
        let err = build(
            &model,
            &MeshOptions::default(),
            &CapacitanceLaw::relative(),
            BoundaryCondition::Open,
            &SerialBackend,
        )
        .unwrap_err();
        match err {
            MeshError::DegenerateCoupling { cell, axis, coefficient, .. } => {
                assert_eq!(cell, [0, 0, 0]);
                assert_eq!(axis, Axis::X);
                assert!(coefficient.is_infinite());
            }
            other => panic!("expected DegenerateCoupling, got {other:?}"),
        }
    }
}
