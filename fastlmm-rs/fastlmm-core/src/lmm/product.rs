//! Kernel-weighted products a' (K + delta I)^-1 b of rotated matrices.
//!
//! With a and b rotated into the eigenbasis:
//!   aKb = (a_r / Sd)' b_r + a_d' b_d / delta
//! where the second term only exists for low-rank eigen data. The scaled
//! left factor a_r / Sd ("aK") can be computed once and reused against
//! several right-hand sides.

use fastlmm_linalg::dense::DenseMatrix;

use super::spectral::SpectralKernel;
use crate::eigen::Rotation;

#[derive(Debug, Clone)]
pub struct KernelProduct {
    akb: DenseMatrix,
    ak: Option<DenseMatrix>,
}

impl KernelProduct {
    pub fn new(a: &Rotation, k: &SpectralKernel, b: &Rotation) -> Self {
        let ak = k.scale_rotated(a);
        let akb = Self::combine(&ak, a, k, b);
        Self { akb, ak: Some(ak) }
    }

    /// Like [`KernelProduct::new`] with a precomputed `k.scale_rotated(a)`.
    pub fn with_ak(ak: &DenseMatrix, a: &Rotation, k: &SpectralKernel, b: &Rotation) -> Self {
        let akb = Self::combine(ak, a, k, b);
        Self {
            akb,
            ak: Some(ak.clone()),
        }
    }

    fn combine(ak: &DenseMatrix, a: &Rotation, k: &SpectralKernel, b: &Rotation) -> DenseMatrix {
        let mut akb = ak.t_mat_mul(&b.rotated);
        if k.is_low_rank {
            if let (Some(ad), Some(bd)) = (&a.double, &b.double) {
                akb = akb.add(&ad.t_mat_mul(bd).scale(1.0 / k.delta));
            }
        }
        akb
    }

    /// A rows x cols product filled with NaN, to be assembled block-wise.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            akb: DenseMatrix::full(rows, cols, f64::NAN),
            ak: None,
        }
    }

    pub fn value(&self) -> &DenseMatrix {
        &self.akb
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.akb.get(i, j)
    }

    pub fn nrows(&self) -> usize {
        self.akb.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.akb.ncols()
    }

    /// The scaled left factor, present only on directly computed products.
    pub fn ak(&self) -> Option<&DenseMatrix> {
        self.ak.as_ref()
    }

    /// Copy `block` in with its top-left corner at (row0, col0).
    pub fn set_block(&mut self, row0: usize, col0: usize, block: &KernelProduct) {
        self.akb.set_block(row0, col0, &block.akb);
    }

    /// Columns [start, end).
    pub fn cols(&self, start: usize, end: usize) -> KernelProduct {
        Self::derived(self.akb.col_range(start, end))
    }

    /// Rows [start, end).
    pub fn rows(&self, start: usize, end: usize) -> KernelProduct {
        let idx: Vec<usize> = (start..end).collect();
        Self::derived(self.akb.select_rows(&idx))
    }

    pub fn transpose(&self) -> KernelProduct {
        Self::derived(self.akb.transpose())
    }

    fn derived(akb: DenseMatrix) -> Self {
        Self { akb, ak: None }
    }
}
