//! Unit standardization: zero mean, unit variance per column.

use anyhow::{bail, Result};
use fastlmm_linalg::dense::DenseMatrix;
use serde::{Deserialize, Serialize};

use super::{observed_mean, Standardizer};

/// Per-column statistics learned by [`Unit::train`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    /// Population standard deviation. Infinite for constant columns so
    /// that they standardize to 0.
    pub std: f64,
}

impl ColumnStats {
    fn of(col: &[f64]) -> Self {
        let (mean, n) = observed_mean(col);
        if n == 0 {
            return Self {
                mean: 0.0,
                std: f64::INFINITY,
            };
        }
        let ss: f64 = col
            .iter()
            .filter(|v| !v.is_nan())
            .map(|v| (v - mean).powi(2))
            .sum();
        let std = (ss / n as f64).sqrt();
        Self {
            mean,
            std: if std > 0.0 { std } else { f64::INFINITY },
        }
    }

    #[inline]
    fn apply(&self, v: f64) -> f64 {
        if v.is_nan() {
            0.0
        } else {
            (v - self.mean) / self.std
        }
    }
}

/// Standardize each column with its own mean and standard deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit;

impl Unit {
    /// Standardize `x` in place and return the statistics used.
    pub fn train(&self, x: &mut DenseMatrix) -> UnitTrained {
        let stats: Vec<ColumnStats> = (0..x.ncols()).map(|j| ColumnStats::of(&x.col(j))).collect();
        let trained = UnitTrained { stats };
        trained.apply_columns(x);
        trained
    }
}

impl Standardizer for Unit {
    fn standardize(&self, x: &mut DenseMatrix) -> Result<()> {
        self.train(x);
        Ok(())
    }
}

/// Stored column statistics, applied to new data (e.g. a test set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTrained {
    pub stats: Vec<ColumnStats>,
}

impl UnitTrained {
    /// Apply the stored statistics in place. The column count must match.
    pub fn apply(&self, x: &mut DenseMatrix) -> Result<()> {
        if x.ncols() != self.stats.len() {
            bail!(
                "Standardizer was trained on {} columns, data has {}",
                self.stats.len(),
                x.ncols()
            );
        }
        self.apply_columns(x);
        Ok(())
    }

    fn apply_columns(&self, x: &mut DenseMatrix) {
        for (j, s) in self.stats.iter().enumerate() {
            for i in 0..x.nrows() {
                let v = x.get(i, j);
                x.set(i, j, s.apply(v));
            }
        }
    }
}

impl Standardizer for UnitTrained {
    fn standardize(&self, x: &mut DenseMatrix) -> Result<()> {
        self.apply(x)
    }
}
