//! TOML configuration deserialisation for extraction jobs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use pexmesh_core::{BoundaryCondition, CapacitanceLaw, ExtractionConfig, MeshOptions};
use pexmesh_geometry::model::DEFAULT_MERGE_TOLERANCE;
use pexmesh_geometry::port::DEFAULT_PORT_IMPEDANCE;
use pexmesh_geometry::{Aabb, GeometryModel, MaterialRegion, Port, PortRole, Transform};
use pexmesh_materials::{MaterialLibrary, MaterialProvider};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(rename = "region")]
    pub regions: Vec<RegionConfig>,
    #[serde(rename = "port", default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
}

/// Meshing parameters. Lengths are in `length_unit`.
#[derive(Debug, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Largest allowed grid spacing (default: no refinement).
    #[serde(default)]
    pub max_step: Option<f64>,
    /// "open" or "grounded". Default: "open".
    #[serde(default)]
    pub boundary: BoundaryCondition,
    /// One of "m", "mm", "um", "nm". Default: "um".
    #[serde(default = "default_length_unit")]
    pub length_unit: String,
    #[serde(default = "default_background")]
    pub background_permittivity: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_step: None,
            boundary: BoundaryCondition::default(),
            length_unit: default_length_unit(),
            background_permittivity: default_background(),
        }
    }
}

fn default_tolerance() -> f64 {
    DEFAULT_MERGE_TOLERANCE
}
fn default_length_unit() -> String {
    "um".into()
}
fn default_background() -> f64 {
    1.0
}

/// Which matrices to assemble.
#[derive(Debug, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_true")]
    pub conductance: bool,
    #[serde(default = "default_true")]
    pub capacitance: bool,
    /// "absolute" (farads) or "relative" (units of ε0). Default: "absolute".
    #[serde(default = "default_permittivity_units")]
    pub permittivity_units: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            conductance: true,
            capacitance: true,
            permittivity_units: default_permittivity_units(),
        }
    }
}

fn default_permittivity_units() -> String {
    "absolute".into()
}

/// One `[[region]]` entry.
#[derive(Debug, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub min: [f64; 3],
    pub max: [f64; 3],
    /// Library material (e.g. "Cu", "SiO2"). Explicit values below override it.
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub conductivity: Option<f64>,
    #[serde(default)]
    pub permittivity: Option<f64>,
}

/// One `[[port]]` entry.
#[derive(Debug, Deserialize)]
pub struct PortConfig {
    pub name: String,
    pub position: [f64; 3],
    pub role: PortRole,
    #[serde(default = "default_impedance")]
    pub impedance: f64,
}

fn default_impedance() -> f64 {
    DEFAULT_PORT_IMPEDANCE
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to write matrices, nodes, ports and grid as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_matrices: bool,
    /// Whether to write a JSON checkpoint of the run (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to write the per-cell classification table (default: false).
    #[serde(default)]
    pub save_classification: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_matrices: true,
            save_json: false,
            save_classification: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Compute backend selection.
#[derive(Debug, Deserialize)]
pub struct ComputeConfig {
    /// "serial", "cpu" or "auto". Default: "auto".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Thread count for the CPU backend (default: all cores).
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            threads: None,
        }
    }
}

fn default_backend() -> String {
    "auto".into()
}

/// Metres per job length unit.
pub fn length_scale(unit: &str) -> Result<f64> {
    Ok(match unit {
        "m" => 1.0,
        "mm" => 1e-3,
        "um" => 1e-6,
        "nm" => 1e-9,
        other => bail!("Unknown length unit '{}'. Valid units: m, mm, um, nm", other),
    })
}

impl JobConfig {
    /// Build the geometry model in metres.
    pub fn to_geometry(&self, library: &MaterialLibrary) -> Result<GeometryModel> {
        let mut model = GeometryModel::new(self.mesh.tolerance);
        model.background_permittivity = self.mesh.background_permittivity;

        for region in &self.regions {
            let (mut conductivity, mut permittivity) = match &region.material {
                Some(name) => {
                    let material = library
                        .get(name)
                        .with_context(|| format!("Region '{}'", region.name))?;
                    (material.conductivity(), material.relative_permittivity())
                }
                None => (0.0, 1.0),
            };
            let explicit = region.conductivity.is_some() || region.permittivity.is_some();
            if region.material.is_none() && !explicit {
                bail!(
                    "Region '{}' needs a 'material' or explicit 'conductivity'/'permittivity'",
                    region.name
                );
            }
            conductivity = region.conductivity.unwrap_or(conductivity);
            permittivity = region.permittivity.unwrap_or(permittivity);
            model.regions.push(MaterialRegion::new(
                region.name.clone(),
                Aabb::new(region.min, region.max),
                conductivity,
                permittivity,
            ));
        }

        for port in &self.ports {
            let entry = Port::new(port.name.clone(), port.position, port.role);
            model.ports.push(entry.with_impedance(port.impedance));
        }

        let scale = length_scale(&self.mesh.length_unit)?;
        Ok(model.transformed(&Transform::uniform_scale(scale)))
    }

    /// Stage settings, with lengths converted to metres.
    pub fn extraction_config(&self) -> Result<ExtractionConfig> {
        let scale = length_scale(&self.mesh.length_unit)?;
        let capacitance_law = match self.assembly.permittivity_units.as_str() {
            "absolute" => CapacitanceLaw::absolute(),
            "relative" => CapacitanceLaw::relative(),
            other => bail!(
                "Unknown permittivity units '{}'. Valid values: absolute, relative",
                other
            ),
        };
        Ok(ExtractionConfig {
            mesh: MeshOptions {
                max_step: self.mesh.max_step.map(|s| s * scale),
            },
            boundary: self.mesh.boundary,
            conductance: self.assembly.conductance,
            capacitance: self.assembly.capacitance,
            capacitance_law,
        })
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<JobConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
[mesh]
length_unit = "um"
max_step = 0.5
boundary = "grounded"

[[region]]
name = "ild"
min = [0.0, 0.0, 0.0]
max = [4.0, 2.0, 2.0]
material = "SiO2"

[[region]]
name = "m1"
min = [1.0, 0.0, 0.5]
max = [3.0, 0.5, 1.0]
material = "Cu"

[[region]]
name = "poly"
min = [0.0, 1.5, 0.0]
max = [1.0, 2.0, 0.5]
conductivity = 1.0e5

[[port]]
name = "in"
position = [1.0, 0.0, 0.5]
role = "input"
impedance = 25.0
"#;

    #[test]
    fn test_parse_and_convert() {
        let job = parse_config(JOB).unwrap();
        assert_eq!(job.mesh.boundary, BoundaryCondition::Grounded);
        assert!(job.output.save_matrices);
        assert_eq!(job.compute.backend, "auto");

        let model = job.to_geometry(&MaterialLibrary::builtin()).unwrap();
        assert_eq!(model.regions.len(), 3);
        assert_eq!(model.regions[1].conductivity, 5.8e7);
        assert_eq!(model.regions[0].permittivity, 3.9);
        assert_eq!(model.regions[2].conductivity, 1.0e5);
        assert_eq!(model.regions[2].permittivity, 1.0);
        assert!((model.regions[0].bounds.max[0] - 4e-6).abs() < 1e-18);
        assert_eq!(model.ports[0].role, PortRole::Input);
        assert_eq!(model.ports[0].impedance, 25.0);

        let config = job.extraction_config().unwrap();
        assert!((config.mesh.max_step.unwrap() - 0.5e-6).abs() < 1e-18);
        assert_eq!(config.boundary, BoundaryCondition::Grounded);
        assert!(config.conductance && config.capacitance);
    }

    #[test]
    fn test_unknown_material_and_unit() {
        let bad_material = JOB.replace("\"Cu\"", "\"Unobtainium\"");
        let job = parse_config(&bad_material).unwrap();
        let err = job.to_geometry(&MaterialLibrary::builtin()).unwrap_err();
        assert!(format!("{err:#}").contains("Unobtainium"));

        let bad_unit = JOB.replace("length_unit = \"um\"", "length_unit = \"furlong\"");
        let job = parse_config(&bad_unit).unwrap();
        assert!(job.extraction_config().is_err());
    }

    #[test]
    fn test_region_without_properties_is_rejected() {
        let job = parse_config(
            r#"
[[region]]
name = "mystery"
min = [0.0, 0.0, 0.0]
max = [1.0, 1.0, 1.0]
"#,
        )
        .unwrap();
        assert!(job.to_geometry(&MaterialLibrary::builtin()).is_err());
        assert!(job.ports.is_empty());
    }
}
