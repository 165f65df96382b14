//! Mesh generation: coordinate unification into a rectilinear grid.
//!
//! Every region boundary and every port location contributes one candidate
//! grid line per axis. Candidates are sorted and swept once; values within the
//! merge tolerance of the current line collapse onto it. The result is three
//! strictly increasing [`CoordinateSet`]s whose tensor product defines the
//! non-uniform grid.
//!
//! The sweep runs over an ordered `Vec`, never a hashed container, so the
//! produced coordinates (and everything assembled from them) are reproducible
//! bit for bit.

use std::ops::Range;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use pexmesh_geometry::{Aabb, Axis, GeometryModel};

use crate::error::{MeshError, Result};

/// Upper bound on the number of cells in one grid.
pub const MAX_CELLS: usize = 1 << 26;

/// Sorted, de-duplicated grid-line positions along one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSet {
    values: Vec<f64>,
    /// Indices of the lines that came out of the merge, as opposed to lines
    /// inserted by refinement.
    anchors: Vec<usize>,
}

impl CoordinateSet {
    /// Merge arbitrary candidate coordinates into a coordinate set.
    ///
    /// Each output line is the smallest member of its cluster; a candidate
    /// joins the current cluster if it lies within `tolerance` of that
    /// member. Consecutive output values therefore differ by more than
    /// `tolerance`.
    pub fn merge(candidates: impl IntoIterator<Item = f64>, tolerance: f64) -> Self {
        let mut sorted: Vec<f64> = candidates.into_iter().collect();
        sorted.sort_by(f64::total_cmp);

        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        for v in sorted {
            match values.last() {
                Some(&anchor) if v - anchor <= tolerance => {}
                _ => values.push(v),
            }
        }
        let anchors = (0..values.len()).collect();
        Self { values, anchors }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Number of grid lines.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of cells between the grid lines.
    pub fn cells(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    /// Width of cell `i`.
    pub fn width(&self, i: usize) -> f64 {
        self.values[i + 1] - self.values[i]
    }

    /// Midpoint of cell `i`.
    pub fn centre(&self, i: usize) -> f64 {
        0.5 * (self.values[i] + self.values[i + 1])
    }

    /// Index of the merged line that `value` belongs to, if it lies within
    /// `tolerance` of one.
    ///
    /// A merged candidate always sits at or above the smallest member of its
    /// cluster, so the closest merged line at or below `value` is tried
    /// first. Lines inserted by refinement never capture a value.
    pub fn snap(&self, value: f64, tolerance: f64) -> Option<usize> {
        let idx = self.anchors.partition_point(|&a| self.values[a] <= value);
        let below = idx.checked_sub(1).map(|b| self.anchors[b]);
        let above = self.anchors.get(idx).copied();
        [below, above]
            .into_iter()
            .flatten()
            .find(|&line| (self.values[line] - value).abs() <= tolerance)
    }

    /// Cells covered by the interval `[lo, hi]`, whose end points must both
    /// lie on grid lines. An interval thinner than one cell covers nothing.
    pub fn cell_range(&self, lo: f64, hi: f64, tolerance: f64) -> Option<Range<usize>> {
        let start = self.snap(lo, tolerance)?;
        let end = self.snap(hi, tolerance)?;
        Some(start..end.max(start))
    }

    /// Number of parts the gap after line `i` is split into by `refine`.
    fn parts(&self, i: usize, max_step: f64) -> usize {
        let gap = self.width(i);
        if gap > max_step {
            (gap / max_step).ceil() as usize
        } else {
            1
        }
    }

    /// Line count after `refine(max_step)`, or `None` on overflow.
    fn refined_len(&self, max_step: f64) -> Option<usize> {
        (0..self.cells()).try_fold(1usize, |n, i| n.checked_add(self.parts(i, max_step)))
    }

    /// Subdivide every gap wider than `max_step` into equal parts.
    fn refine(&self, max_step: f64) -> Self {
        let mut values = Vec::with_capacity(self.values.len());
        let mut anchors = Vec::with_capacity(self.anchors.len());
        for i in 0..self.cells() {
            let lo = self.values[i];
            let gap = self.width(i);
            if self.anchors.binary_search(&i).is_ok() {
                anchors.push(values.len());
            }
            values.push(lo);
            let parts = self.parts(i, max_step);
            for p in 1..parts {
                values.push(lo + gap * p as f64 / parts as f64);
            }
        }
        if let Some(&last) = self.values.last() {
            if self.anchors.last() == Some(&(self.values.len() - 1)) {
                anchors.push(values.len());
            }
            values.push(last);
        }
        Self { values, anchors }
    }
}

/// The non-uniform rectilinear grid: one coordinate set per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub x: CoordinateSet,
    pub y: CoordinateSet,
    pub z: CoordinateSet,
    /// Tolerance the coordinates were merged with.
    pub tolerance: f64,
}

impl Grid {
    pub fn axis(&self, axis: Axis) -> &CoordinateSet {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    /// Number of cells along each axis.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.x.cells(), self.y.cells(), self.z.cells())
    }

    pub fn cell_count(&self) -> usize {
        let (nx, ny, nz) = self.shape();
        nx * ny * nz
    }

    /// Cell count, or `None` if it does not fit in `usize`.
    pub fn checked_cell_count(&self) -> Option<usize> {
        let (nx, ny, nz) = self.shape();
        nx.checked_mul(ny)?.checked_mul(nz)
    }

    /// Position of a cell in ascending (i, j, k) order.
    pub fn linear_index(&self, cell: [usize; 3]) -> usize {
        let (_, ny, nz) = self.shape();
        (cell[0] * ny + cell[1]) * nz + cell[2]
    }

    /// Physical extent of a cell.
    pub fn cell_bounds(&self, cell: [usize; 3]) -> Aabb {
        let min = [
            self.x.as_slice()[cell[0]],
            self.y.as_slice()[cell[1]],
            self.z.as_slice()[cell[2]],
        ];
        let max = [
            self.x.as_slice()[cell[0] + 1],
            self.y.as_slice()[cell[1] + 1],
            self.z.as_slice()[cell[2] + 1],
        ];
        Aabb::new(min, max)
    }

    /// Width of a cell along `axis`.
    pub fn width(&self, cell: [usize; 3], axis: Axis) -> f64 {
        self.axis(axis).width(cell[axis.index()])
    }

    /// Area of the cell face normal to `axis`.
    pub fn face_area(&self, cell: [usize; 3], axis: Axis) -> f64 {
        let (a, b) = axis.others();
        self.width(cell, a) * self.width(cell, b)
    }
}

/// Options for the mesh generator beyond what the geometry itself carries.
#[derive(Debug, Clone, Default)]
pub struct MeshOptions {
    /// Upper bound on the grid spacing. Wider gaps are subdivided uniformly.
    pub max_step: Option<f64>,
}

/// Build the grid for a geometry model.
///
/// Validates the model, checks the ports against the domain and each other,
/// then unifies the coordinates along each axis.
pub fn generate_grid(model: &GeometryModel, options: &MeshOptions) -> Result<Grid> {
    model.validate()?;
    let tolerance = model.tolerance;

    if let Some(step) = options.max_step {
        if !step.is_finite() || step <= tolerance {
            return Err(MeshError::InvalidInput(format!(
                "max_step {step} must be finite and larger than the merge tolerance {tolerance}"
            )));
        }
    }

    let domain = model.domain().ok_or(MeshError::DegenerateDomain {
        axis: Axis::X,
        count: 0,
    })?;
    validate_ports(model, &domain)?;

    let grid = Grid {
        x: unify_axis(model, Axis::X, options)?,
        y: unify_axis(model, Axis::Y, options)?,
        z: unify_axis(model, Axis::Z, options)?,
        tolerance,
    };
    if !matches!(grid.checked_cell_count(), Some(n) if n <= MAX_CELLS) {
        let (nx, ny, nz) = grid.shape();
        return Err(MeshError::InvalidInput(format!(
            "grid of {nx}x{ny}x{nz} cells exceeds the limit of {MAX_CELLS} cells"
        )));
    }

    let (nx, ny, nz) = grid.shape();
    info!(
        "Mesh generated: {}x{}x{} cells ({} total)",
        nx,
        ny,
        nz,
        grid.cell_count()
    );
    Ok(grid)
}

/// Coordinate set for one axis: region bounds plus port locations, merged
/// and optionally refined.
fn unify_axis(model: &GeometryModel, axis: Axis, options: &MeshOptions) -> Result<CoordinateSet> {
    let a = axis.index();
    let tolerance = model.tolerance;
    let candidates: Vec<f64> = model
        .regions
        .iter()
        .flat_map(|r| [r.bounds.min[a], r.bounds.max[a]])
        .chain(model.ports.iter().map(|p| p.position[a]))
        .collect();
    let raw_count = candidates.len();
    let merged_close = count_close_pairs(&candidates, tolerance);

    let mut set = CoordinateSet::merge(candidates, tolerance);
    if set.len() < 2 {
        return Err(MeshError::DegenerateDomain {
            axis,
            count: set.len(),
        });
    }
    if merged_close > 0 {
        warn!(
            "{} coordinate pair(s) along {} merged under tolerance {:e}",
            merged_close, axis, tolerance
        );
    }
    if let Some(step) = options.max_step {
        if !matches!(set.refined_len(step), Some(n) if n <= MAX_CELLS + 1) {
            return Err(MeshError::InvalidInput(format!(
                "max_step {step:e} would place more than {} grid lines along {}",
                MAX_CELLS + 1,
                axis
            )));
        }
        set = set.refine(step);
    }
    debug!("Axis {}: {} candidates -> {} grid lines", axis, raw_count, set.len());
    Ok(set)
}

/// Number of distinct-but-close candidate pairs, used only to warn about
/// representation noise in the input.
fn count_close_pairs(candidates: &[f64], tolerance: f64) -> usize {
    let mut values = candidates.to_vec();
    values.sort_by(f64::total_cmp);
    values
        .windows(2)
        .filter(|w| w[1] != w[0] && w[1] - w[0] <= tolerance)
        .count()
}

fn validate_ports(model: &GeometryModel, domain: &Aabb) -> Result<()> {
    let tolerance = model.tolerance;
    for (i, port) in model.ports.iter().enumerate() {
        if port.position.iter().any(|c| !c.is_finite()) {
            return Err(MeshError::invalid_port(&port.name, "non-finite coordinate"));
        }
        if !port.impedance.is_finite() || port.impedance <= 0.0 {
            return Err(MeshError::invalid_port(
                &port.name,
                format!("source impedance must be positive, got {}", port.impedance),
            ));
        }
        if !domain.contains(&port.position, tolerance) {
            return Err(MeshError::invalid_port(
                &port.name,
                format!(
                    "location {:?} lies outside the domain {:?}..{:?}",
                    port.position, domain.min, domain.max
                ),
            ));
        }
        for other in &model.ports[..i] {
            if other.name == port.name {
                return Err(MeshError::invalid_port(&port.name, "duplicate port name"));
            }
            let coincident =
                (0..3).all(|a| (other.position[a] - port.position[a]).abs() <= tolerance);
            if coincident && other.role != port.role {
                return Err(MeshError::invalid_port(
                    &port.name,
                    format!(
                        "shares its location with port '{}' but has role {} instead of {}",
                        other.name, port.role, other.role
                    ),
                ));
            }
        }
    }
    Ok(())
}
