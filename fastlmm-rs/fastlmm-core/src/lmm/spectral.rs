//! The kernel at a fixed variance ratio.

use fastlmm_linalg::dense::DenseMatrix;

use crate::eigen::{EigenData, Rotation};
use crate::error::LmmError;

/// Eigenvalues shifted by delta, where delta = sigma2_e / sigma2_g.
///
/// Built from either h2 or log delta; the other two parameters follow.
#[derive(Debug, Clone)]
pub struct SpectralKernel {
    pub h2: f64,
    pub delta: f64,
    pub log_delta: f64,
    /// S + delta, one per eigenvalue.
    pub sd: Vec<f64>,
    /// log det of (K + delta I), including the iid - eid directions outside
    /// the eigenbasis when low rank.
    pub logdet: f64,
    pub iid_count: usize,
    pub is_low_rank: bool,
}

impl SpectralKernel {
    pub fn from_h2(eigen: &EigenData, h2: f64) -> Result<Self, LmmError> {
        if !(h2 > 0.0 && h2 < 1.0) {
            return Err(LmmError::InvalidH2(h2));
        }
        let delta = 1.0 / h2 - 1.0;
        Ok(Self::build(eigen, h2, delta, delta.ln()))
    }

    pub fn from_log_delta(eigen: &EigenData, log_delta: f64) -> Result<Self, LmmError> {
        if !log_delta.is_finite() {
            return Err(LmmError::InvalidLogDelta(log_delta));
        }
        let delta = log_delta.exp();
        Ok(Self::build(eigen, 1.0 / (delta + 1.0), delta, log_delta))
    }

    fn build(eigen: &EigenData, h2: f64, delta: f64, log_delta: f64) -> Self {
        let sd: Vec<f64> = eigen.values.iter().map(|s| s + delta).collect();
        let mut logdet: f64 = sd.iter().map(|v| v.ln()).sum();
        if eigen.is_low_rank() {
            logdet += (eigen.iid_count() - eigen.eid_count()) as f64 * log_delta;
        }
        Self {
            h2,
            delta,
            log_delta,
            sd,
            logdet,
            iid_count: eigen.iid_count(),
            is_low_rank: eigen.is_low_rank(),
        }
    }

    /// Rows of `a.rotated` divided by S + delta.
    pub fn scale_rotated(&self, a: &Rotation) -> DenseMatrix {
        let r = &a.rotated;
        assert_eq!(r.nrows(), self.sd.len());
        let mut out = r.clone();
        for j in 0..r.ncols() {
            for (i, sd) in self.sd.iter().enumerate() {
                out.set(i, j, r.get(i, j) / sd);
            }
        }
        out
    }
}
