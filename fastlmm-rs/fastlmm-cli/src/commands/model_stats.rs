//! Print a saved model's summary and goodness of fit.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use fastlmm_core::model::serialization;
use fastlmm_core::model::TrainedModel;

#[derive(Args)]
pub struct ModelStatsArgs {
    /// Model file written by `fastlmm learn`
    #[arg(long)]
    model_file: String,
}

pub fn run(args: ModelStatsArgs) -> Result<()> {
    let model = serialization::load_model(Path::new(&args.model_file))?;
    let stats = model.stats();

    println!("{}", serialization::model_summary(&model));
    println!();
    println!("r2\t{:.6}", stats.r2);
    println!("sigma2total\t{:.6}", stats.sigma2total);
    println!("sigma2g\t{:.6}", stats.sigma2g);
    println!("sigma2e\t{:.6}", stats.sigma2e);
    println!("h2\t{:.6}", stats.h2);
    println!("e2\t{:.6}", stats.e2);
    Ok(())
}
