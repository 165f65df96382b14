//! Extraction runner: ties together the job file, materials and the stages.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};

use pexmesh_compute::{ComputeBackend, CpuBackend, SerialBackend};
use pexmesh_core::{CellClass, ExtractionSystem, MeshError, NodeKind, StiffnessMatrix};
use pexmesh_geometry::Axis;
use pexmesh_materials::MaterialLibrary;

use crate::config::{ComputeConfig, JobConfig};

/// Run every stage requested by the job.
pub fn run_extraction(job: &JobConfig) -> Result<ExtractionSystem> {
    let geometry = job.to_geometry(&MaterialLibrary::builtin())?;
    let config = job.extraction_config()?;
    println!(
        "Geometry: {} region(s), {} port(s)",
        geometry.regions.len(),
        geometry.ports.len()
    );

    let backend = create_backend(&job.compute)?;
    let system = ExtractionSystem::run(geometry, &config, backend.as_ref()).map_err(stage_error)?;
    print_summary(&system);
    Ok(system)
}

/// Mesh and mark only, to check a job before a full run.
pub fn validate_job(job: &JobConfig) -> Result<ExtractionSystem> {
    let geometry = job.to_geometry(&MaterialLibrary::builtin())?;
    let config = job.extraction_config()?;
    create_backend(&job.compute)?;
    let system = ExtractionSystem::prepare(geometry, &config).map_err(stage_error)?;
    print_summary(&system);
    Ok(system)
}

fn stage_error(err: MeshError) -> anyhow::Error {
    anyhow!("{}: {}", err.kind(), err)
}

fn print_summary(system: &ExtractionSystem) {
    let (nx, ny, nz) = system.grid().shape();
    let counts = system.mesh.class_counts();
    println!(
        "  Grid: {}x{}x{} cells ({} conductor, {} dielectric, {} air)",
        nx, ny, nz, counts.conductor, counts.dielectric, counts.air
    );
    println!("  Nodes: {}", system.mesh.node_count());
    for report in &system.reports {
        println!(
            "  [{}] {:.2} ms, {} node(s), {} non-zero(s)",
            report.stage, report.elapsed_ms, report.nodes, report.nonzeros
        );
    }
}

/// Create a compute backend from the `[compute]` section.
///
/// - `"serial"`: single-threaded reference backend.
/// - `"cpu"`: Rayon pool, optionally with a fixed thread count.
/// - `"auto"` (default): same as `"cpu"`.
pub fn create_backend(compute: &ComputeConfig) -> Result<Box<dyn ComputeBackend>> {
    let backend: Box<dyn ComputeBackend> = match compute.backend.as_str() {
        "serial" => Box::new(SerialBackend),
        "cpu" | "auto" => match compute.threads {
            Some(n) => Box::new(CpuBackend::with_threads(n)?),
            None => Box::new(CpuBackend::new()),
        },
        other => bail!("Unknown backend '{}'. Valid values: serial, cpu, auto", other),
    };
    let device = backend.device_info();
    debug!("Backend {:?} with {} thread(s)", device.backend_type, device.threads);
    println!("Backend: {}", device.name);
    Ok(backend)
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Write a stiffness matrix as (row, col, value) triplets with a metadata
/// header.
pub fn write_matrix_csv(matrix: &StiffnessMatrix, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "# pexmesh stiffness matrix: {}", matrix.law)?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# dim: {}", matrix.dim())?;
    writeln!(file, "# nonzeros: {}", matrix.nnz())?;
    writeln!(file, "#")?;
    writeln!(file, "row,col,value")?;
    for t in matrix.triplets() {
        writeln!(file, "{},{},{:e}", t.row, t.col, t.value)?;
    }
    file.flush()?;

    println!("Matrix ({}) written to: {}", matrix.law, path.display());
    Ok(())
}

/// Write the node table with the external terms of each matrix.
pub fn write_nodes_csv(system: &ExtractionSystem, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    let external =
        |m: &Option<StiffnessMatrix>, i: usize| m.as_ref().map_or(0.0, |m| m.external[i]);

    writeln!(file, "index,label,kind,cells,external_conductance,external_capacitance")?;
    for node in &system.mesh.nodes {
        let kind = match node.kind {
            NodeKind::Port { .. } => "port",
            NodeKind::Body => "body",
        };
        writeln!(
            file,
            "{},{},{},{},{:e},{:e}",
            node.index,
            node.label(&system.geometry),
            kind,
            node.cells,
            external(&system.conductance, node.index),
            external(&system.capacitance, node.index)
        )?;
    }
    file.flush()?;

    println!("Nodes written to: {}", path.display());
    Ok(())
}

/// Write every port with its direction code and terminal node.
pub fn write_ports_csv(system: &ExtractionSystem, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "name,direction,role,node,impedance_ohm")?;
    for (port, node) in system.geometry.ports.iter().zip(system.port_nodes()) {
        let node = node.ok_or_else(|| anyhow!("Port '{}' has no terminal node", port.name))?;
        writeln!(
            file,
            "{},{},{},{},{}",
            port.name,
            port.role.direction(),
            port.role,
            node,
            port.impedance
        )?;
    }
    file.flush()?;

    println!("Ports written to: {}", path.display());
    Ok(())
}

/// Write the three coordinate sets.
pub fn write_grid_csv(system: &ExtractionSystem, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "axis,index,coordinate_m")?;
    for axis in Axis::ALL {
        for (i, c) in system.grid().axis(axis).as_slice().iter().enumerate() {
            writeln!(file, "{},{},{:e}", axis, i, c)?;
        }
    }
    file.flush()?;

    println!("Grid written to: {}", path.display());
    Ok(())
}

/// Write the per-cell classification table.
pub fn write_classification_csv(system: &ExtractionSystem, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    let regions = &system.geometry.regions;
    let ports = &system.geometry.ports;

    writeln!(file, "i,j,k,class,region,port,node")?;
    for ((i, j, k), tag) in system.mesh.cells.indexed_iter() {
        let class = match tag.class {
            CellClass::Conductor { .. } => "conductor",
            CellClass::Dielectric { .. } => "dielectric",
            CellClass::Air => "air",
        };
        let region = tag.class.region().map_or("", |r| regions[r].name.as_str());
        let port = tag.port.map_or("", |p| ports[p].name.as_str());
        let node = system
            .mesh
            .node_at([i, j, k])
            .map(|n| n.to_string())
            .unwrap_or_default();
        writeln!(file, "{},{},{},{},{},{},{}", i, j, k, class, region, port, node)?;
    }
    file.flush()?;

    println!("Classification written to: {}", path.display());
    Ok(())
}

/// Write a JSON checkpoint of the run.
pub fn write_snapshot_json(system: &ExtractionSystem, path: &Path) -> Result<()> {
    let mut file = create_file(path)?;
    serde_json::to_writer_pretty(&mut file, &system.snapshot())
        .map_err(|e| anyhow!("JSON serialisation error: {}", e))?;
    file.flush()?;

    println!("Checkpoint (JSON) written to: {}", path.display());
    Ok(())
}

/// Write every output the job asks for into `out_dir`.
pub fn write_outputs(system: &ExtractionSystem, job: &JobConfig, out_dir: &Path) -> Result<()> {
    info!("Writing outputs to {}", out_dir.display());
    if job.output.save_matrices {
        if let Some(g) = &system.conductance {
            write_matrix_csv(g, &out_dir.join("conductance.csv"))?;
        }
        if let Some(c) = &system.capacitance {
            write_matrix_csv(c, &out_dir.join("capacitance.csv"))?;
        }
        write_nodes_csv(system, &out_dir.join("nodes.csv"))?;
        write_ports_csv(system, &out_dir.join("ports.csv"))?;
        write_grid_csv(system, &out_dir.join("grid.csv"))?;
    }
    if job.output.save_classification {
        write_classification_csv(system, &out_dir.join("classification.csv"))?;
    }
    if job.output.save_json {
        write_snapshot_json(system, &out_dir.join("system.json"))?;
    }
    Ok(())
}
