//! Column standardizers for SNP and covariate matrices.
//!
//! Rows are individuals and columns are features. Missing values (NaN)
//! are filled with 0 after standardizing, which is the column mean.

pub mod beta;
pub mod unit;

use anyhow::Result;
use fastlmm_linalg::dense::DenseMatrix;

pub use beta::Beta;
pub use unit::{ColumnStats, Unit, UnitTrained};

/// Rewrites a matrix column by column in place.
pub trait Standardizer {
    fn standardize(&self, x: &mut DenseMatrix) -> Result<()>;
}

/// Mean and count of the non-missing values in a column.
pub(crate) fn observed_mean(col: &[f64]) -> (f64, usize) {
    let (sum, n) = col.iter().fold((0.0, 0usize), |(s, n), &v| {
        if v.is_nan() {
            (s, n)
        } else {
            (s + v, n + 1)
        }
    });
    if n == 0 {
        (0.0, 0)
    } else {
        (sum / n as f64, n)
    }
}
