//! fastlmm-rs: Linear mixed models for genome-wide association and
//! phenotype prediction.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fastlmm",
    version,
    about = "FastLMM-RS: Factored spectrally transformed linear mixed models",
    long_about = "A Rust implementation of FaST-LMM for genome-wide association studies.\n\
                   Tests SNPs one at a time against a genetic kernel and trains\n\
                   mixed models that predict phenotypes of new individuals."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test each SNP for association against a fixed kernel
    SingleSnp(commands::single_snp::SingleSnpArgs),

    /// Eigendecompose a kernel and save it for reuse
    Eigen(commands::eigen::EigenArgs),

    /// Train a prediction model
    Learn(commands::learn::LearnArgs),

    /// Predict phenotypes of new individuals
    Predict(commands::predict::PredictArgs),

    /// Show a saved model's summary and fit statistics
    ModelStats(commands::model_stats::ModelStatsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Set up thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("FastLMM-RS v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::SingleSnp(args) => commands::single_snp::run(args),
        Commands::Eigen(args) => commands::eigen::run(args),
        Commands::Learn(args) => commands::learn::run(args),
        Commands::Predict(args) => commands::predict::run(args),
        Commands::ModelStats(args) => commands::model_stats::run(args),
    }
}
