//! Eigendecomposition of a kernel and rotation into its eigenbasis.
//!
//! `EigenData` holds the eigenvectors U (iid x eid) and eigenvalues S of a
//! kernel K = U diag(S) U'. When built from fewer SNPs than individuals the
//! decomposition is low rank (eid < iid) and rotations also keep the part
//! of a matrix orthogonal to U.
//!
//! File format: bincode-serialized [`SavedEigen`] carrying magic bytes
//! (FLEI) and a version number.

use std::path::Path;

use anyhow::{bail, Context, Result};
use fastlmm_linalg::decomposition::{SymmetricEigen, ThinSvd};
use fastlmm_linalg::dense::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::kernel::{positions, KernelData};
use crate::standardize::{Standardizer, Unit};
use crate::util::flat::FlatMatrix;

/// Eigenvalues below this are reported as a warning.
const NEGATIVE_EIGENVALUE_WARN: f64 = -0.1;

#[derive(Debug, Clone)]
pub struct EigenData {
    pub sample_ids: Vec<String>,
    pub values: Vec<f64>,
    /// iid x eid.
    pub vectors: DenseMatrix,
}

/// A matrix A expressed in the eigenbasis.
#[derive(Debug, Clone)]
pub struct Rotation {
    /// U'A (eid x cols).
    pub rotated: DenseMatrix,
    /// A - UU'A (iid x cols), only for low-rank eigen data.
    pub double: Option<DenseMatrix>,
}

impl Rotation {
    pub fn ncols(&self) -> usize {
        self.rotated.ncols()
    }

    /// The rotation of column `j` alone.
    pub fn column(&self, j: usize) -> Rotation {
        self.columns(j, j + 1)
    }

    /// The rotation of columns [start, end).
    pub fn columns(&self, start: usize, end: usize) -> Rotation {
        Rotation {
            rotated: self.rotated.col_range(start, end),
            double: self.double.as_ref().map(|d| d.col_range(start, end)),
        }
    }
}

impl EigenData {
    pub fn new(sample_ids: Vec<String>, values: Vec<f64>, vectors: DenseMatrix) -> Result<Self> {
        if vectors.nrows() != sample_ids.len() || vectors.ncols() != values.len() {
            bail!(
                "Eigenvectors are {}x{} but there are {} IIDs and {} eigenvalues",
                vectors.nrows(),
                vectors.ncols(),
                sample_ids.len(),
                values.len()
            );
        }
        Ok(Self {
            sample_ids,
            values,
            vectors,
        })
    }

    /// Thin SVD of an iid x sid matrix used as-is: K = G G'.
    pub fn from_genotypes(sample_ids: &[String], g: &DenseMatrix) -> Result<Self> {
        if g.nrows() != sample_ids.len() {
            bail!(
                "SNP matrix has {} rows but {} IIDs were given",
                g.nrows(),
                sample_ids.len()
            );
        }
        let svd = ThinSvd::new(g)?;
        let values = svd.s.iter().map(|s| s * s).collect();
        Self::new(sample_ids.to_vec(), values, svd.u)
    }

    pub fn iid_count(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn eid_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_low_rank(&self) -> bool {
        self.eid_count() < self.iid_count()
    }

    /// Express an iid x k matrix in the eigenbasis.
    pub fn rotate(&self, a: &DenseMatrix) -> Rotation {
        assert_eq!(a.nrows(), self.iid_count());
        let rotated = self.vectors.t_mat_mul(a);
        let double = if self.is_low_rank() {
            Some(a.sub(&self.vectors.mat_mul(&rotated)))
        } else {
            None
        };
        Rotation { rotated, double }
    }

    /// Rows of the eigenvectors for `ids`, in that order.
    pub fn subset(&self, ids: &[String]) -> Result<Self> {
        let idx = positions(&self.sample_ids, ids)?;
        Ok(Self {
            sample_ids: ids.to_vec(),
            values: self.values.clone(),
            vectors: self.vectors.select_rows(&idx),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let saved = SavedEigen {
            magic: SavedEigen::MAGIC,
            version: SavedEigen::VERSION,
            sample_ids: self.sample_ids.clone(),
            values: self.values.clone(),
            vectors: FlatMatrix::from(&self.vectors),
        };
        let encoded = bincode::serialize(&saved)?;
        std::fs::write(path, encoded)
            .with_context(|| format!("Failed to write eigen file: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read eigen file: {}", path.display()))?;
        let saved: SavedEigen = bincode::deserialize(&data)
            .with_context(|| format!("Invalid eigen file: {}", path.display()))?;
        if saved.magic != SavedEigen::MAGIC {
            bail!(
                "Invalid eigen file: expected magic bytes {:?}, got {:?}",
                SavedEigen::MAGIC,
                saved.magic
            );
        }
        if !saved.vectors.is_consistent() {
            bail!("Invalid eigen file: eigenvector data has the wrong length");
        }
        Self::new(saved.sample_ids, saved.values, saved.vectors.to_dense())
    }
}

/// On-disk form of [`EigenData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEigen {
    pub magic: [u8; 4],
    pub version: u32,
    pub sample_ids: Vec<String>,
    pub values: Vec<f64>,
    pub vectors: FlatMatrix,
}

impl SavedEigen {
    pub const MAGIC: [u8; 4] = *b"FLEI";
    pub const VERSION: u32 = 1;
}

/// Full eigendecomposition of a square kernel.
pub fn eigen_from_kernel(k: &KernelData) -> Result<EigenData> {
    debug!("Eigendecomposing {0}x{0} kernel", k.iid_count());
    let eig = SymmetricEigen::new(&k.matrix)?;
    if eig.values.iter().any(|&v| v < NEGATIVE_EIGENVALUE_WARN) {
        warn!("kernel contains a negative Eigenvalue");
    }
    EigenData::new(k.sample_ids.clone(), eig.values, eig.vectors)
}

/// Unit-standardize an iid x sid SNP matrix and decompose K = G G' through
/// its thin SVD. Low rank when there are fewer SNPs than individuals.
pub fn eigen_from_snps(sample_ids: &[String], g: &DenseMatrix) -> Result<EigenData> {
    eigen_from_snps_with(sample_ids, g, &Unit)
}

/// As [`eigen_from_snps`] with any standardizer.
pub fn eigen_from_snps_with<S: Standardizer + ?Sized>(
    sample_ids: &[String],
    g: &DenseMatrix,
    standardizer: &S,
) -> Result<EigenData> {
    let mut g = g.clone();
    standardizer.standardize(&mut g)?;
    let eigen = EigenData::from_genotypes(sample_ids, &g)?;
    info!(
        "Eigen data from {} SNPs: {} individuals, {} eigenvalues{}",
        g.ncols(),
        eigen.iid_count(),
        eigen.eid_count(),
        if eigen.is_low_rank() { " (low rank)" } else { "" }
    );
    Ok(eigen)
}
