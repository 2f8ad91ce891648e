//! fastlmm-linalg: Linear algebra wrappers for fastlmm-rs
//!
//! Provides the dense matrix type and the eigen-based decompositions
//! (symmetric eigendecomposition, thin SVD, truncated pseudo-inverse,
//! least squares) used by the spectral mixed-model code.

pub mod decomposition;
pub mod dense;

pub use decomposition::{LinalgError, SymmetricEigen, ThinSvd, TruncatedEigen};
pub use dense::DenseMatrix;
