//! fastlmm-geno: Genotype, phenotype and kernel I/O for fastlmm-rs
//!
//! Provides the GenotypeReader trait with a PLINK bed/bim/fam
//! implementation, phenotype/covariate tables, kernel text files and
//! sample-ID intersection.

pub mod kernel_io;
pub mod phenotype;
pub mod plink;
pub mod sample;
pub mod traits;

pub use phenotype::PhenoTable;
pub use traits::{GenotypeReader, MarkerData, MarkerInfo};
