//! Trained prediction models.
//!
//! - `fastlmm_model`: mixed model with a genetic kernel
//! - `linear_regression`: covariates only
//! - `serialization`: binary model files with a JSON sidecar

pub mod fastlmm_model;
pub mod linear_regression;
pub mod serialization;

use anyhow::{bail, Result};
use fastlmm_geno::phenotype::PhenoTable;
use fastlmm_linalg::dense::DenseMatrix;
use serde::{Deserialize, Serialize};

use crate::error::LmmError;
use crate::kernel::{CrossKernel, KernelData};
use crate::standardize::{Unit, UnitTrained};

pub use fastlmm_model::FastLmmModel;
pub use linear_regression::LinearRegressionModel;
pub use serialization::SavedModel;

/// Base name of the all-ones column appended to covariates.
pub const ALWAYS1: &str = "always1";

/// An iid x sid SNP matrix with its identifiers.
#[derive(Debug, Clone)]
pub struct SnpMatrix {
    pub sample_ids: Vec<String>,
    pub sids: Vec<String>,
    /// Allele counts, NaN for missing.
    pub values: DenseMatrix,
}

/// Where the training kernel comes from.
#[derive(Debug, Clone)]
pub enum TrainKernel {
    /// K = G G' from unit-standardized SNPs.
    Snps(SnpMatrix),
    Kernel(KernelData),
    /// K = I over the phenotype's individuals.
    Identity,
}

/// Where the test kernels come from.
#[derive(Debug, Clone)]
pub enum TestKernel {
    /// SNPs with the same sids as at training time.
    Snps(SnpMatrix),
    Kernel {
        /// Rows are training individuals, columns test individuals.
        train_test: CrossKernel,
        test_test: KernelData,
    },
    /// 1 where a test IID equals a training IID.
    Identity,
}

/// Predicted phenotype mean and covariance for the test individuals.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub sample_ids: Vec<String>,
    pub pheno_name: String,
    pub values: Vec<f64>,
    /// test x test.
    pub covariance: DenseMatrix,
}

impl Prediction {
    pub fn to_table(&self) -> Result<PhenoTable> {
        PhenoTable::new(
            self.sample_ids.clone(),
            vec![self.pheno_name.clone()],
            DenseMatrix::from_vec(&self.values),
        )
    }
}

/// Goodness of fit on the training data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub r2: f64,
    pub sigma2total: f64,
    pub sigma2g: f64,
    pub sigma2e: f64,
    pub h2: f64,
    pub e2: f64,
}

pub trait TrainedModel {
    fn predict(&self, test_kernel: TestKernel, covar: Option<&PhenoTable>) -> Result<Prediction>;
    fn stats(&self) -> ModelStats;
    fn pheno_name(&self) -> &str;
}

/// Column names plus a unique all-ones column name.
pub fn covariate_sids(names: &[String]) -> Vec<String> {
    let mut always1 = ALWAYS1.to_string();
    while names.contains(&always1) {
        always1.push('_');
    }
    let mut sids = names.to_vec();
    sids.push(always1);
    sids
}

/// Checks a training phenotype and drops individuals whose value is missing.
pub(crate) fn single_phenotype(pheno: &PhenoTable) -> Result<PhenoTable> {
    if pheno.n_cols() != 1 {
        return Err(LmmError::PhenotypeCount(pheno.n_cols()).into());
    }
    let keep: Vec<usize> = (0..pheno.n_samples())
        .filter(|&i| !pheno.values.get(i, 0).is_nan())
        .collect();
    if keep.is_empty() {
        bail!("Phenotype '{}' has no non-missing values", pheno.names[0]);
    }
    Ok(pheno.take_rows(&keep))
}

/// Unit-train training covariates (filling missing values) and append the
/// all-ones column.
pub(crate) fn train_covariates(covar: &PhenoTable) -> (DenseMatrix, UnitTrained, Vec<String>) {
    let mut values = covar.values.clone();
    let trained = Unit.train(&mut values);
    (
        values.with_constant_col(1.0),
        trained,
        covariate_sids(&covar.names),
    )
}

/// Standardize test covariates with the training statistics and append the
/// all-ones column. The resulting sids must match training.
pub(crate) fn test_covariates(
    covar: &PhenoTable,
    trained: &UnitTrained,
    train_sids: &[String],
) -> Result<DenseMatrix> {
    if covariate_sids(&covar.names) != train_sids {
        return Err(LmmError::SidMismatch { what: "Covariate" }.into());
    }
    let mut values = covar.values.clone();
    trained.apply(&mut values)?;
    Ok(values.with_constant_col(1.0))
}

/// Sum of squared deviations from the mean.
pub(crate) fn total_sum_of_squares(y: &[f64]) -> f64 {
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    y.iter().map(|v| (v - mean).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covariate_sids_unique_always1() {
        let names = vec!["age".to_string(), "always1".to_string(), "always1_".to_string()];
        let sids = covariate_sids(&names);
        assert_eq!(sids.last().unwrap(), "always1__");
        assert_eq!(covariate_sids(&[]), vec!["always1"]);
    }

    #[test]
    fn test_single_phenotype_drops_missing() {
        let t = PhenoTable::new(
            vec!["a".into(), "b".into()],
            vec!["y".into()],
            DenseMatrix::from_vec(&[f64::NAN, 1.0]),
        )
        .unwrap();
        let kept = single_phenotype(&t).unwrap();
        assert_eq!(kept.sample_ids, vec!["b"]);

        let two = PhenoTable::new(vec!["a".into()], vec!["y".into(), "z".into()], DenseMatrix::zeros(1, 2))
            .unwrap();
        assert!(single_phenotype(&two).is_err());
    }

    #[test]
    fn test_test_covariates_checks_names() {
        let train = PhenoTable::new(
            vec!["a".into(), "b".into()],
            vec!["age".into()],
            DenseMatrix::from_vec(&[30.0, 50.0]),
        )
        .unwrap();
        let (x, trained, sids) = train_covariates(&train);
        assert_eq!(x.ncols(), 2);
        assert_eq!(x.col(1), vec![1.0, 1.0]);

        let test = PhenoTable::new(vec!["c".into()], vec!["age".into()], DenseMatrix::from_vec(&[40.0]))
            .unwrap();
        let xt = test_covariates(&test, &trained, &sids).unwrap();
        assert!(xt.get(0, 0).abs() < 1e-12);

        let renamed = PhenoTable::new(vec!["c".into()], vec!["height".into()], DenseMatrix::from_vec(&[1.0]))
            .unwrap();
        assert!(test_covariates(&renamed, &trained, &sids).is_err());
    }
}
