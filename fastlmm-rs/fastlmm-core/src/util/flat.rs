//! Serializable dense matrices.

use fastlmm_linalg::dense::DenseMatrix;
use serde::{Deserialize, Serialize};

/// A matrix stored as a flat column-major vector for bincode/JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMatrix {
    pub nrows: usize,
    pub ncols: usize,
    pub data: Vec<f64>,
}

impl FlatMatrix {
    pub fn to_dense(&self) -> DenseMatrix {
        DenseMatrix::from_col_major(self.nrows, self.ncols, self.data.clone())
    }

    /// True when the stored length matches the shape.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.nrows * self.ncols
    }
}

impl From<&DenseMatrix> for FlatMatrix {
    fn from(m: &DenseMatrix) -> Self {
        Self {
            nrows: m.nrows(),
            ncols: m.ncols(),
            data: m.to_col_major(),
        }
    }
}
