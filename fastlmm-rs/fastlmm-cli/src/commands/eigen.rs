//! Eigendecompose a kernel once for reuse by `single-snp --eigen-file`.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::common::{load_eigen, StandardizerKind};

#[derive(Args)]
pub struct EigenArgs {
    /// PLINK prefix of the SNPs that form the kernel
    #[arg(long, conflicts_with = "kernel_file")]
    kernel_bed: Option<String>,

    /// Kernel text file
    #[arg(long)]
    kernel_file: Option<String>,

    /// Standardizer for --kernel-bed SNPs
    #[arg(long, value_enum, default_value_t = StandardizerKind::Unit)]
    standardizer: StandardizerKind,

    /// Count allele 2 instead of allele 1
    #[arg(long, default_value = "false")]
    count_a2: bool,

    /// Output eigen file
    #[arg(long)]
    output_file: String,
}

pub fn run(args: EigenArgs) -> Result<()> {
    info!("=== FastLMM: Eigendecomposition ===");

    let eigen = load_eigen(
        args.kernel_bed.as_deref(),
        args.kernel_file.as_deref(),
        None,
        args.standardizer,
        args.count_a2,
    )?;
    eigen.save(Path::new(&args.output_file))?;
    info!("Eigen data saved to {}", args.output_file);

    println!(
        "Samples: {}\nEigenvalues: {}{}",
        eigen.iid_count(),
        eigen.eid_count(),
        if eigen.is_low_rank() { " (low rank)" } else { "" }
    );
    Ok(())
}
