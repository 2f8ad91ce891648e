//! fastlmm-core: Linear mixed models for fastlmm-rs
//!
//! Implements the spectral mixed-model machinery: kernels and their
//! eigendecomposition, likelihood evaluation and h2 search, single-SNP
//! association tests, and trained models for phenotype prediction.

pub mod association;
pub mod eigen;
pub mod error;
pub mod kernel;
pub mod lmm;
pub mod model;
pub mod standardize;
pub mod util;

pub use error::LmmError;
