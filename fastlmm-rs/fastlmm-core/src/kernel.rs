//! Similarity kernels over individuals.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use fastlmm_linalg::dense::DenseMatrix;

/// A square iid x iid kernel.
#[derive(Debug, Clone)]
pub struct KernelData {
    pub sample_ids: Vec<String>,
    pub matrix: DenseMatrix,
}

impl KernelData {
    pub fn new(sample_ids: Vec<String>, matrix: DenseMatrix) -> Result<Self> {
        let n = sample_ids.len();
        if matrix.nrows() != n || matrix.ncols() != n {
            bail!(
                "Kernel is {}x{} but has {} IIDs",
                matrix.nrows(),
                matrix.ncols(),
                n
            );
        }
        Ok(Self { sample_ids, matrix })
    }

    /// K = G G' for an already standardized iid x sid matrix.
    pub fn from_snps(sample_ids: &[String], g: &DenseMatrix) -> Result<Self> {
        if g.nrows() != sample_ids.len() {
            bail!(
                "SNP matrix has {} rows but {} IIDs were given",
                g.nrows(),
                sample_ids.len()
            );
        }
        Ok(Self {
            sample_ids: sample_ids.to_vec(),
            matrix: g.gram_rows(),
        })
    }

    pub fn identity(sample_ids: &[String]) -> Self {
        Self {
            sample_ids: sample_ids.to_vec(),
            matrix: DenseMatrix::identity(sample_ids.len()),
        }
    }

    pub fn iid_count(&self) -> usize {
        self.sample_ids.len()
    }

    /// The factor that makes the diagonal sum to the iid count: n / trace(K).
    /// Factor that scales the trace to the number of individuals. The trace
    /// must be positive and finite.
    pub fn diag_k_to_n_factor(&self) -> Result<f64> {
        let trace = self.matrix.trace();
        if !(trace.is_finite() && trace > 0.0) {
            bail!("Kernel trace must be positive and finite, got {}", trace);
        }
        Ok(self.iid_count() as f64 / trace)
    }

    pub fn scale(&mut self, factor: f64) {
        self.matrix.scale_in_place(factor);
    }

    /// Rows and columns for `ids`, in that order.
    pub fn subset(&self, ids: &[String]) -> Result<Self> {
        let idx = positions(&self.sample_ids, ids)?;
        Ok(Self {
            sample_ids: ids.to_vec(),
            matrix: self.matrix.select_rows(&idx).select_cols(&idx),
        })
    }
}

/// A rectangular kernel between two sets of individuals, e.g. train x test.
#[derive(Debug, Clone)]
pub struct CrossKernel {
    pub row_ids: Vec<String>,
    pub col_ids: Vec<String>,
    pub matrix: DenseMatrix,
}

impl CrossKernel {
    pub fn new(row_ids: Vec<String>, col_ids: Vec<String>, matrix: DenseMatrix) -> Result<Self> {
        if matrix.nrows() != row_ids.len() || matrix.ncols() != col_ids.len() {
            bail!(
                "Cross kernel is {}x{} but has {}x{} IIDs",
                matrix.nrows(),
                matrix.ncols(),
                row_ids.len(),
                col_ids.len()
            );
        }
        Ok(Self {
            row_ids,
            col_ids,
            matrix,
        })
    }

    /// 1 where a row IID equals a column IID, else 0.
    pub fn identity(row_ids: &[String], col_ids: &[String]) -> Self {
        let matrix = DenseMatrix::from_columns(
            row_ids.len(),
            &col_ids
                .iter()
                .map(|c| row_ids.iter().map(|r| if r == c { 1.0 } else { 0.0 }).collect())
                .collect::<Vec<Vec<f64>>>(),
        );
        Self {
            row_ids: row_ids.to_vec(),
            col_ids: col_ids.to_vec(),
            matrix,
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.matrix.scale_in_place(factor);
    }

    /// Reorder and select rows and columns.
    pub fn subset(&self, row_ids: &[String], col_ids: &[String]) -> Result<Self> {
        let rows = positions(&self.row_ids, row_ids)?;
        let cols = positions(&self.col_ids, col_ids)?;
        Ok(Self {
            row_ids: row_ids.to_vec(),
            col_ids: col_ids.to_vec(),
            matrix: self.matrix.select_rows(&rows).select_cols(&cols),
        })
    }
}

/// Index of each wanted ID in `have`.
pub(crate) fn positions(have: &[String], wanted: &[String]) -> Result<Vec<usize>> {
    let lookup: HashMap<&str, usize> = have
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    wanted
        .iter()
        .map(|id| {
            lookup
                .get(id.as_str())
                .copied()
                .ok_or_else(|| anyhow!("IID '{}' not found", id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_snps_and_factor() {
        let g = DenseMatrix::from_row_major(2, 2, &[1.0, 1.0, -1.0, 1.0]);
        let k = KernelData::from_snps(&ids(&["a", "b"]), &g).unwrap();
        assert_eq!(k.matrix.get(0, 0), 2.0);
        assert_eq!(k.matrix.get(0, 1), 0.0);
        assert!((k.diag_k_to_n_factor().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_factor_rejects_zero_trace() {
        let k = KernelData::new(ids(&["a", "b"]), DenseMatrix::zeros(2, 2)).unwrap();
        assert!(k.diag_k_to_n_factor().is_err());
    }

    #[test]
    fn test_subset_reorders() {
        let m = DenseMatrix::from_row_major(3, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0]);
        let k = KernelData::new(ids(&["a", "b", "c"]), m).unwrap();
        let s = k.subset(&ids(&["c", "a"])).unwrap();
        assert_eq!(s.matrix.get(0, 0), 6.0);
        assert_eq!(s.matrix.get(0, 1), 3.0);
        assert_eq!(s.matrix.get(1, 1), 1.0);
        assert!(k.subset(&ids(&["z"])).is_err());
    }

    #[test]
    fn test_identity_cross() {
        let x = CrossKernel::identity(&ids(&["a", "b", "c"]), &ids(&["c", "d"]));
        assert_eq!(x.matrix.nrows(), 3);
        assert_eq!(x.matrix.get(2, 0), 1.0);
        assert_eq!(x.matrix.get(0, 0), 0.0);
        assert_eq!(x.matrix.col(1), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_new_rejects_bad_shape() {
        assert!(KernelData::new(ids(&["a"]), DenseMatrix::zeros(2, 2)).is_err());
        assert!(CrossKernel::new(ids(&["a"]), ids(&["b"]), DenseMatrix::zeros(1, 2)).is_err());
    }
}
