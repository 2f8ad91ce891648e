//! Predict phenotypes for new individuals from a saved model.
//!
//! fastlmm predict --model-file ... --test-bed ... --covar-file ... --output-file ...

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use fastlmm_core::kernel::CrossKernel;
use fastlmm_core::model::serialization;
use fastlmm_core::model::{TestKernel, TrainedModel};
use fastlmm_geno::{kernel_io, phenotype};

use super::common::{read_kernel_file, read_snp_matrix, read_table};

#[derive(Args)]
pub struct PredictArgs {
    /// Model file written by `fastlmm learn`
    #[arg(long)]
    model_file: String,

    /// PLINK prefix of the test SNPs (same SNPs as training)
    #[arg(long, conflicts_with_all = ["train_test_kernel", "test_test_kernel"])]
    test_bed: Option<String>,

    /// Kernel file with training individuals as rows and test individuals as columns
    #[arg(long, requires = "test_test_kernel")]
    train_test_kernel: Option<String>,

    /// Kernel file among the test individuals
    #[arg(long, requires = "train_test_kernel")]
    test_test_kernel: Option<String>,

    /// Test covariate file path
    #[arg(long)]
    covar_file: Option<String>,

    /// Count allele 2 instead of allele 1
    #[arg(long, default_value = "false")]
    count_a2: bool,

    /// Output file for predicted phenotypes
    #[arg(long)]
    output_file: String,

    /// Output kernel file for the predictive covariance
    #[arg(long)]
    covariance_file: Option<String>,
}

pub fn run(args: PredictArgs) -> Result<()> {
    info!("=== FastLMM: Predict ===");

    let model = serialization::load_model(Path::new(&args.model_file))?;
    info!("Loaded model for '{}' from {}", model.pheno_name(), args.model_file);

    let covar = args
        .covar_file
        .as_deref()
        .map(|path| read_table(path, None))
        .transpose()?;

    let test_kernel = match (&args.test_bed, &args.train_test_kernel, &args.test_test_kernel) {
        (Some(bed), _, _) => TestKernel::Snps(read_snp_matrix(bed, args.count_a2)?),
        (None, Some(train_test), Some(test_test)) => {
            let (matrix, row_ids, col_ids) = kernel_io::read_cross_kernel(Path::new(train_test))?;
            TestKernel::Kernel {
                train_test: CrossKernel::new(row_ids, col_ids, matrix)?,
                test_test: read_kernel_file(test_test)?,
            }
        }
        _ => TestKernel::Identity,
    };

    let prediction = model.predict(test_kernel, covar.as_ref())?;
    phenotype::write_pheno(Path::new(&args.output_file), &prediction.to_table()?)?;
    info!(
        "Predictions for {} individuals written to {}",
        prediction.sample_ids.len(),
        args.output_file
    );

    if let Some(path) = &args.covariance_file {
        kernel_io::write_kernel(Path::new(path), &prediction.covariance, &prediction.sample_ids)?;
        info!("Covariance written to {}", path);
    }
    Ok(())
}
