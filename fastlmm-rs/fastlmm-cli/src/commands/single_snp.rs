//! Single-SNP association tests against a fixed kernel.
//!
//! fastlmm single-snp --bed-file ... --pheno-file ... --kernel-bed ... --output-file ...

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use fastlmm_core::association::{single_snp_eigen, SingleSnpConfig};
use fastlmm_geno::plink::PlinkReader;
use fastlmm_geno::traits::GenotypeReader;

use super::common::{load_eigen, read_table, StandardizerKind};

#[derive(Args)]
pub struct SingleSnpArgs {
    /// PLINK prefix (bed/bim/fam) of the SNPs to test
    #[arg(long)]
    bed_file: String,

    /// Phenotype file path
    #[arg(long)]
    pheno_file: String,

    /// Phenotype column name (required when the file has several)
    #[arg(long)]
    pheno_col: Option<String>,

    /// Covariate file path
    #[arg(long)]
    covar_file: Option<String>,

    /// PLINK prefix of the SNPs that form the kernel
    #[arg(long, conflicts_with_all = ["kernel_file", "eigen_file"])]
    kernel_bed: Option<String>,

    /// Kernel text file
    #[arg(long, conflicts_with = "eigen_file")]
    kernel_file: Option<String>,

    /// Eigen data written by `fastlmm eigen`
    #[arg(long)]
    eigen_file: Option<String>,

    /// Standardizer for --kernel-bed SNPs
    #[arg(long, value_enum, default_value_t = StandardizerKind::Unit)]
    standardizer: StandardizerKind,

    /// Fixed log delta for the null model instead of searching h2
    #[arg(long, allow_hyphen_values = true)]
    log_delta: Option<f64>,

    /// Search h2 with ML instead of REML
    #[arg(long, default_value = "false")]
    no_reml_fit: bool,

    /// Compare null and alternative with REML likelihoods
    #[arg(long, default_value = "false")]
    test_via_reml: bool,

    /// SNPs read and tested per batch
    #[arg(long, default_value = "1000")]
    batch_size: usize,

    /// Count allele 2 instead of allele 1
    #[arg(long, default_value = "false")]
    count_a2: bool,

    /// Tab-separated results file
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Number of top hits to print
    #[arg(long, default_value = "10")]
    top: usize,
}

pub fn run(args: SingleSnpArgs) -> Result<()> {
    info!("=== FastLMM: Single-SNP Association ===");
    info!("Test SNPs: {}", args.bed_file);
    info!("Phenotype file: {}", args.pheno_file);

    let mut test_snps = PlinkReader::with_count_a1(&args.bed_file, !args.count_a2)?;
    info!(
        "Loaded {} markers x {} samples from PLINK files",
        test_snps.n_markers(),
        test_snps.n_samples()
    );

    let pheno = read_table(&args.pheno_file, args.pheno_col.as_deref())?;
    let covar = args
        .covar_file
        .as_deref()
        .map(|path| read_table(path, None))
        .transpose()?;

    let eigen = load_eigen(
        args.kernel_bed.as_deref(),
        args.kernel_file.as_deref(),
        args.eigen_file.as_deref(),
        args.standardizer,
        args.count_a2,
    )?;

    let config = SingleSnpConfig {
        log_delta: args.log_delta,
        fit_log_delta_via_reml: !args.no_reml_fit,
        test_via_reml: args.test_via_reml,
        batch_size: args.batch_size,
        output_file: args.output_file.clone(),
    };
    let results = single_snp_eigen(&mut test_snps, &pheno, &eigen, covar.as_ref(), &config)?;

    if let Some(path) = &args.output_file {
        info!("Results written to {}", path.display());
    }

    println!("SNP\tChr\tChrPos\tPValue\tSnpWeight");
    for r in results.iter().take(args.top) {
        println!(
            "{}\t{}\t{}\t{:.6e}\t{:.6}",
            r.snp, r.chrom, r.chr_pos, r.p_value, r.snp_weight
        );
    }
    Ok(())
}
