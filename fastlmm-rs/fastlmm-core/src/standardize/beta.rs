//! Beta weighting of centered SNPs.
//!
//! Each column is centered and multiplied by the Beta(a, b) density at its
//! minor allele frequency, which up-weights rare variants for the default
//! a = 1, b = 25.

use anyhow::Result;
use fastlmm_linalg::dense::DenseMatrix;
use statrs::function::beta::ln_beta;

use super::{observed_mean, Standardizer};

const MAF_CLAMP: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct Beta {
    pub a: f64,
    pub b: f64,
}

impl Default for Beta {
    fn default() -> Self {
        Self { a: 1.0, b: 25.0 }
    }
}

impl Beta {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Beta(a, b) density at `maf`, computed in log space.
    pub fn weight(&self, maf: f64) -> f64 {
        let maf = maf.clamp(MAF_CLAMP, 1.0 - MAF_CLAMP);
        ((self.a - 1.0) * maf.ln() + (self.b - 1.0) * (1.0 - maf).ln() - ln_beta(self.a, self.b))
            .exp()
    }
}

impl Standardizer for Beta {
    fn standardize(&self, x: &mut DenseMatrix) -> Result<()> {
        for j in 0..x.ncols() {
            let col = x.col(j);
            let (mean, _) = observed_mean(&col);
            let maf = (mean / 2.0).min(1.0 - mean / 2.0);
            let w = self.weight(maf);
            for (i, v) in col.iter().enumerate() {
                x.set(i, j, if v.is_nan() { 0.0 } else { (v - mean) * w });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_matches_closed_form() {
        // Beta(1, 25) pdf is 25 (1 - x)^24
        let beta = Beta::default();
        for &maf in &[0.01, 0.1, 0.3] {
            let expected = 25.0 * (1.0f64 - maf).powi(24);
            assert!((beta.weight(maf) - expected).abs() < 1e-9 * expected.max(1.0));
        }
    }

    #[test]
    fn test_rare_weighted_above_common() {
        // Column 0: maf 0.125; column 1: maf 0.5
        let mut x = DenseMatrix::from_row_major(4, 2, &[1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0]);
        Beta::default().standardize(&mut x).unwrap();
        let rare = x.col(0).iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let common = x.col(1).iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(rare > common);
    }

    #[test]
    fn test_missing_filled_with_zero() {
        let mut x = DenseMatrix::from_row_major(3, 1, &[0.0, f64::NAN, 2.0]);
        Beta::default().standardize(&mut x).unwrap();
        assert_eq!(x.get(1, 0), 0.0);
        assert!((x.get(0, 0) + x.get(2, 0)).abs() < 1e-12);
    }
}
