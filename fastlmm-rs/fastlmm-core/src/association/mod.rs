//! Association testing against a fixed kernel.

pub mod single_snp;

pub use single_snp::{single_snp_eigen, write_results, SingleSnpConfig, SnpResult};
