//! Input loading shared by the subcommands.

use std::path::Path;

use anyhow::{bail, Result};
use clap::ValueEnum;
use tracing::info;

use fastlmm_core::eigen::{eigen_from_kernel, eigen_from_snps_with, EigenData};
use fastlmm_core::kernel::KernelData;
use fastlmm_core::model::SnpMatrix;
use fastlmm_core::standardize::{Beta, Standardizer, Unit};
use fastlmm_geno::kernel_io;
use fastlmm_geno::phenotype::{self, PhenoTable};
use fastlmm_geno::plink::PlinkReader;
use fastlmm_geno::traits::GenotypeReader;

/// How SNPs are standardized before forming a kernel.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StandardizerKind {
    /// Zero mean, unit variance
    Unit,
    /// Centered and weighted by the Beta(1, 25) density of the MAF
    Beta,
}

impl StandardizerKind {
    pub fn build(self) -> Box<dyn Standardizer> {
        match self {
            StandardizerKind::Unit => Box::new(Unit),
            StandardizerKind::Beta => Box::new(Beta::default()),
        }
    }
}

/// Read every SNP of a PLINK fileset into memory.
pub fn read_snp_matrix(prefix: &str, count_a2: bool) -> Result<SnpMatrix> {
    let mut plink = PlinkReader::with_count_a1(prefix, !count_a2)?;
    info!(
        "Loaded {} markers x {} samples from {}",
        plink.n_markers(),
        plink.n_samples(),
        prefix
    );
    let (values, markers) = plink.read_all()?;
    Ok(SnpMatrix {
        sample_ids: plink.sample_ids().to_vec(),
        sids: markers.into_iter().map(|m| m.id).collect(),
        values,
    })
}

pub fn read_kernel_file(path: &str) -> Result<KernelData> {
    let (matrix, ids) = kernel_io::read_kernel(Path::new(path))?;
    info!("Loaded {0}x{0} kernel from {1}", ids.len(), path);
    KernelData::new(ids, matrix)
}

/// Phenotype table, narrowed to one column when `col` is given.
pub fn read_table(path: &str, col: Option<&str>) -> Result<PhenoTable> {
    let table = phenotype::read_pheno(Path::new(path))?;
    info!(
        "Loaded {} columns for {} samples from {}",
        table.n_cols(),
        table.n_samples(),
        path
    );
    match col {
        Some(name) => table.select(name),
        None => Ok(table),
    }
}

/// Eigen data from exactly one of a SNP fileset, a kernel file or a saved
/// eigen file.
pub fn load_eigen(
    kernel_bed: Option<&str>,
    kernel_file: Option<&str>,
    eigen_file: Option<&str>,
    standardizer: StandardizerKind,
    count_a2: bool,
) -> Result<EigenData> {
    match (kernel_bed, kernel_file, eigen_file) {
        (Some(bed), None, None) => {
            let snps = read_snp_matrix(bed, count_a2)?;
            eigen_from_snps_with(&snps.sample_ids, &snps.values, standardizer.build().as_ref())
        }
        (None, Some(file), None) => eigen_from_kernel(&read_kernel_file(file)?),
        (None, None, Some(file)) => {
            let eigen = EigenData::load(Path::new(file))?;
            info!(
                "Loaded eigen data for {} samples ({} eigenvalues) from {}",
                eigen.iid_count(),
                eigen.eid_count(),
                file
            );
            Ok(eigen)
        }
        (None, None, None) => bail!("One of --kernel-bed, --kernel-file or --eigen-file is required"),
        _ => bail!("Only one of --kernel-bed, --kernel-file or --eigen-file may be given"),
    }
}
