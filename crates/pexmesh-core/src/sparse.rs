//! Compressed sparse row storage for the assembled system.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use pexmesh_compute::Triplet;

/// Square real matrix in CSR layout. Column indices within a row are
/// strictly increasing and explicit zeros produced by cancellation are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    dim: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build a `dim x dim` matrix, summing duplicate entries.
    ///
    /// Triplets are sorted by (row, col, value) before summation, so the
    /// result is bit-identical for any permutation of the input.
    pub fn from_triplets(dim: usize, mut triplets: Vec<Triplet>) -> Self {
        triplets.sort_by(|a, b| {
            a.row
                .cmp(&b.row)
                .then(a.col.cmp(&b.col))
                .then(a.value.total_cmp(&b.value))
        });

        let mut row_ptr = vec![0usize; dim + 1];
        let mut col_idx: Vec<usize> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        let mut last: Option<(usize, usize)> = None;

        for t in triplets {
            debug_assert!(t.row < dim && t.col < dim);
            if last == Some((t.row, t.col)) {
                if let Some(v) = values.last_mut() {
                    *v += t.value;
                }
                continue;
            }
            col_idx.push(t.col);
            values.push(t.value);
            row_ptr[t.row + 1] += 1;
            last = Some((t.row, t.col));
        }
        for r in 0..dim {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            dim,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored (column, value) pairs of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[span.clone()]
            .iter()
            .copied()
            .zip(self.values[span].iter().copied())
    }

    /// Entry at (`row`, `col`), zero if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let span = self.row_ptr[row]..self.row_ptr[row + 1];
        match self.col_idx[span.clone()].binary_search(&col) {
            Ok(pos) => self.values[span.start + pos],
            Err(_) => 0.0,
        }
    }

    pub fn row_sum(&self, row: usize) -> f64 {
        self.row(row).map(|(_, v)| v).sum()
    }

    /// Stored entries in row-major order.
    pub fn triplets(&self) -> Vec<Triplet> {
        (0..self.dim)
            .flat_map(|r| self.row(r).map(move |(c, v)| Triplet::new(r, c, v)))
            .collect()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.dim, self.dim));
        for t in self.triplets() {
            dense[[t.row, t.col]] = t.value;
        }
        dense
    }

    /// Check `|a_ij - a_ji| <= tol * max(|a_ij|, |a_ji|)` for every stored
    /// entry.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.dim).all(|r| {
            self.row(r).all(|(c, v)| {
                let w = self.get(c, r);
                (v - w).abs() <= tol * v.abs().max(w.abs())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn laplacian_triplets() -> Vec<Triplet> {
        vec![
            Triplet::new(0, 0, 2.0),
            Triplet::new(0, 1, -1.0),
            Triplet::new(1, 0, -1.0),
            Triplet::new(1, 1, 1.0),
            Triplet::new(1, 1, 1.0),
            Triplet::new(1, 2, -1.0),
            Triplet::new(2, 1, -1.0),
            Triplet::new(2, 2, 1.0),
        ]
    }

    #[test]
    fn test_duplicates_are_summed() {
        let m = CsrMatrix::from_triplets(3, laplacian_triplets());
        assert_eq!(m.dim(), 3);
        assert_eq!(m.nnz(), 7);
        assert_eq!(m.get(1, 1), 2.0);
        assert_eq!(m.get(0, 2), 0.0);
        assert_eq!(m.row(1).map(|(c, _)| c).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_relative_eq!(m.row_sum(0), 1.0);
        assert_relative_eq!(m.row_sum(1), 0.0);
        assert!(m.is_symmetric(0.0));
    }

    #[test]
    fn test_permutation_is_bit_identical() {
        let values = [0.1, 0.2, 0.3, 1e-17, 7.0, -3.3];
        let forward: Vec<Triplet> = values.iter().map(|&v| Triplet::new(0, 0, v)).collect();
        let mut backward = forward.clone();
        backward.reverse();
        let a = CsrMatrix::from_triplets(1, forward);
        let b = CsrMatrix::from_triplets(1, backward);
        assert_eq!(a.get(0, 0).to_bits(), b.get(0, 0).to_bits());
    }

    #[test]
    fn test_empty_rows_and_dense() {
        let m = CsrMatrix::from_triplets(3, vec![Triplet::new(2, 0, 4.0)]);
        assert_eq!(m.row(0).count(), 0);
        assert_eq!(m.row(1).count(), 0);
        let d = m.to_dense();
        assert_eq!(d[[2, 0]], 4.0);
        assert_eq!(d[[0, 2]], 0.0);
        assert!(!m.is_symmetric(1e-12));
        assert_eq!(m.triplets(), vec![Triplet::new(2, 0, 4.0)]);
    }
}
