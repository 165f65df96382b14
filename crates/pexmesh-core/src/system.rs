//! The domain state of one extraction run and its stage sequencing.

use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use pexmesh_compute::ComputeBackend;
use pexmesh_geometry::GeometryModel;

use crate::assembly::{assemble, BoundaryCondition, StiffnessMatrix};
use crate::coupling::{CapacitanceLaw, ConductanceLaw, CouplingLaw};
use crate::error::Result;
use crate::marker::{mark_conductors, MarkedMesh, NodeKind};
use crate::mesh::{generate_grid, Grid, MeshOptions};

/// Settings for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub mesh: MeshOptions,
    pub boundary: BoundaryCondition,
    /// Build the conductivity-driven matrix.
    pub conductance: bool,
    /// Build the permittivity-driven matrix.
    pub capacitance: bool,
    pub capacitance_law: CapacitanceLaw,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mesh: MeshOptions::default(),
            boundary: BoundaryCondition::Open,
            conductance: true,
            capacitance: true,
            capacitance_law: CapacitanceLaw::absolute(),
        }
    }
}

/// Timing and size counters of one stage. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub elapsed_ms: f64,
    pub cells: usize,
    pub nodes: usize,
    pub nonzeros: usize,
}

/// Everything one run owns: geometry, marked mesh, assembled matrices.
#[derive(Debug, Clone)]
pub struct ExtractionSystem {
    pub geometry: GeometryModel,
    pub mesh: MarkedMesh,
    pub conductance: Option<StiffnessMatrix>,
    pub capacitance: Option<StiffnessMatrix>,
    pub reports: Vec<StageReport>,
}

impl ExtractionSystem {
    /// Run mesh generation, marking and every requested assembly.
    pub fn run(
        geometry: GeometryModel,
        config: &ExtractionConfig,
        backend: &dyn ComputeBackend,
    ) -> Result<Self> {
        let mut system = Self::prepare(geometry, config)?;
        let boundary = config.boundary;
        if config.conductance {
            system.conductance = Some(system.assemble_stage(&ConductanceLaw, boundary, backend)?);
        }
        if config.capacitance {
            let law = &config.capacitance_law;
            system.capacitance = Some(system.assemble_stage(law, boundary, backend)?);
        }
        Ok(system)
    }

    /// Mesh and mark only.
    pub fn prepare(geometry: GeometryModel, config: &ExtractionConfig) -> Result<Self> {
        let mut reports = Vec::new();

        let start = Instant::now();
        let grid = generate_grid(&geometry, &config.mesh)?;
        reports.push(report("mesh", start, grid.cell_count(), 0, 0));

        let start = Instant::now();
        let mesh = mark_conductors(&geometry, &grid)?;
        reports.push(report("mark", start, grid.cell_count(), mesh.node_count(), 0));

        for r in &reports {
            info!("Stage '{}' finished in {:.2} ms", r.stage, r.elapsed_ms);
        }

        Ok(Self {
            geometry,
            mesh,
            conductance: None,
            capacitance: None,
            reports,
        })
    }

    fn assemble_stage(
        &mut self,
        law: &dyn CouplingLaw,
        boundary: BoundaryCondition,
        backend: &dyn ComputeBackend,
    ) -> Result<StiffnessMatrix> {
        let start = Instant::now();
        let matrix = assemble(&self.mesh, &self.geometry, law, boundary, backend)?;
        let r = report(
            law.name(),
            start,
            self.mesh.grid.cell_count(),
            matrix.dim(),
            matrix.nnz(),
        );
        info!("Stage '{}' finished in {:.2} ms", r.stage, r.elapsed_ms);
        self.reports.push(r);
        Ok(matrix)
    }

    pub fn grid(&self) -> &Grid {
        &self.mesh.grid
    }

    /// Terminal node of every port, in port order.
    pub fn port_nodes(&self) -> Vec<Option<usize>> {
        (0..self.geometry.ports.len())
            .map(|p| self.mesh.port_node(p))
            .collect()
    }

    /// Serializable checkpoint of the run, without the per-cell tables.
    pub fn snapshot(&self) -> SystemSnapshot {
        let nodes = self
            .mesh
            .nodes
            .iter()
            .map(|n| NodeSummary {
                index: n.index,
                label: n.label(&self.geometry),
                kind: n.kind.clone(),
                region: self
                    .geometry
                    .regions
                    .get(n.region)
                    .map(|r| r.name.clone())
                    .unwrap_or_default(),
                cells: n.cells,
            })
            .collect();
        SystemSnapshot {
            geometry: self.geometry.clone(),
            grid: self.mesh.grid.clone(),
            nodes,
            conductance: self.conductance.clone(),
            capacitance: self.capacitance.clone(),
            reports: self.reports.clone(),
        }
    }
}

fn report(stage: &str, start: Instant, cells: usize, nodes: usize, nonzeros: usize) -> StageReport {
    StageReport {
        stage: stage.to_string(),
        elapsed_ms: start.elapsed().as_secs_f64() * 1e3,
        cells,
        nodes,
        nonzeros,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub index: usize,
    pub label: String,
    pub kind: NodeKind,
    pub region: String,
    pub cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub geometry: GeometryModel,
    pub grid: Grid,
    pub nodes: Vec<NodeSummary>,
    pub conductance: Option<StiffnessMatrix>,
    pub capacitance: Option<StiffnessMatrix>,
    pub reports: Vec<StageReport>,
}
