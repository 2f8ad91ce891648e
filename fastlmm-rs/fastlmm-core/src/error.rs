//! Typed failures of the mixed-model code.

use fastlmm_linalg::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LmmError {
    #[error("h2 must lie strictly between 0 and 1, got {0}")]
    InvalidH2(f64),

    #[error("log_delta must be finite, got {0}")]
    InvalidLogDelta(f64),

    #[error("Expected exactly one phenotype column, got {0}")]
    PhenotypeCount(usize),

    #[error(
        "Sample '{iid}' has {missing} of {total} phenotype values missing; \
         values must be all missing or all present"
    )]
    PartialMissingPhenotype {
        iid: String,
        missing: usize,
        total: usize,
    },

    #[error("Covariate '{column}' is missing for sample '{iid}'")]
    MissingCovariate { iid: String, column: String },

    #[error(
        "Eigen data covers {expected} samples but only {got} of them are present \
         in the SNPs, phenotype and covariates"
    )]
    IidMismatch { expected: usize, got: usize },

    #[error("Negative log likelihood is not finite ({0}), possibly due to constant covariates")]
    NonFiniteLikelihood(f64),

    #[error("{what} sids differ between train and test")]
    SidMismatch { what: &'static str },

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
