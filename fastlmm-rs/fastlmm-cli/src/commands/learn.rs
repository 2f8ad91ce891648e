//! Train a prediction model.
//!
//! fastlmm learn --pheno-file ... --kernel-bed ... --covar-file ... --model-file ...

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use fastlmm_core::model::serialization;
use fastlmm_core::model::{
    FastLmmModel, LinearRegressionModel, SavedModel, TrainKernel, TrainedModel,
};

use super::common::{read_kernel_file, read_snp_matrix, read_table};

#[derive(Args)]
pub struct LearnArgs {
    /// Phenotype file path
    #[arg(long)]
    pheno_file: String,

    /// Phenotype column name (required when the file has several)
    #[arg(long)]
    pheno_col: Option<String>,

    /// Covariate file path
    #[arg(long)]
    covar_file: Option<String>,

    /// PLINK prefix of the training SNPs that form the kernel
    #[arg(long, conflicts_with = "kernel_file")]
    kernel_bed: Option<String>,

    /// Training kernel text file
    #[arg(long)]
    kernel_file: Option<String>,

    /// Fixed heritability in (0, 1) instead of searching
    #[arg(long)]
    h2: Option<f64>,

    /// Fit covariates only, with no kernel
    #[arg(long, default_value = "false", conflicts_with_all = ["kernel_bed", "kernel_file", "h2"])]
    linear_regression: bool,

    /// Count allele 2 instead of allele 1
    #[arg(long, default_value = "false")]
    count_a2: bool,

    /// Output model file
    #[arg(long)]
    model_file: String,

    /// Also save JSON sidecar for debugging
    #[arg(long, default_value = "false")]
    save_json: bool,
}

pub fn run(args: LearnArgs) -> Result<()> {
    info!("=== FastLMM: Learn ===");
    info!("Phenotype file: {}", args.pheno_file);

    let pheno = read_table(&args.pheno_file, args.pheno_col.as_deref())?;
    let covar = args
        .covar_file
        .as_deref()
        .map(|path| read_table(path, None))
        .transpose()?;

    let model: SavedModel = if args.linear_regression {
        LinearRegressionModel::learn(covar.as_ref(), &pheno)?.into()
    } else {
        let kernel = if let Some(bed) = &args.kernel_bed {
            TrainKernel::Snps(read_snp_matrix(bed, args.count_a2)?)
        } else if let Some(file) = &args.kernel_file {
            TrainKernel::Kernel(read_kernel_file(file)?)
        } else {
            info!("No kernel given, using the identity");
            TrainKernel::Identity
        };
        FastLmmModel::learn(kernel, covar.as_ref(), &pheno, args.h2)?.into()
    };
    info!("Trained model for '{}'", model.pheno_name());

    let model_path = Path::new(&args.model_file);
    serialization::save_model(&model, model_path)?;
    info!("Model saved to {}", model_path.display());

    if args.save_json {
        let json_path = format!("{}.json", args.model_file);
        serialization::save_model_json(&model, Path::new(&json_path))?;
        info!("JSON sidecar saved to {}", json_path);
    }

    println!("{}", serialization::model_summary(&model));
    Ok(())
}
