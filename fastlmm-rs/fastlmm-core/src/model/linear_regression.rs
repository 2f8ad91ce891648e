//! Ordinary least squares on covariates, with the same interface as
//! [`super::FastLmmModel`].

use anyhow::{bail, Result};
use fastlmm_geno::phenotype::PhenoTable;
use fastlmm_geno::sample::intersect_samples;
use fastlmm_linalg::decomposition::least_squares;
use fastlmm_linalg::dense::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    single_phenotype, test_covariates, total_sum_of_squares, train_covariates, ModelStats,
    Prediction, TestKernel, TrainedModel,
};
use crate::standardize::UnitTrained;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    pub beta: Vec<f64>,
    pub ssres: f64,
    pub sstot: f64,
    pub iid_count: usize,
    pub covar_stats: UnitTrained,
    pub covar_sids: Vec<String>,
    pub pheno_name: String,
}

impl LinearRegressionModel {
    pub fn learn(covar: Option<&PhenoTable>, pheno: &PhenoTable) -> Result<Self> {
        let pheno = single_phenotype(pheno)?;
        let covar = covar
            .cloned()
            .unwrap_or_else(|| PhenoTable::empty(&pheno.sample_ids));
        let inter = intersect_samples(&[&covar.sample_ids, &pheno.sample_ids]);
        if inter.ids.is_empty() {
            bail!("No individuals are shared by the covariates and phenotype");
        }

        let y = pheno.take_rows(&inter.indices[1]).values.col(0);
        let (x, covar_stats, covar_sids) = train_covariates(&covar.take_rows(&inter.indices[0]));
        let fit = least_squares(&x, &y)?;
        info!(
            "Linear regression on {} individuals, {} covariates (rank {})",
            y.len(),
            x.ncols(),
            fit.rank
        );

        Ok(Self {
            beta: fit.coef,
            ssres: fit.ssres,
            sstot: total_sum_of_squares(&y),
            iid_count: y.len(),
            covar_stats,
            covar_sids,
            pheno_name: pheno.names[0].clone(),
        })
    }
}

impl TrainedModel for LinearRegressionModel {
    fn predict(&self, test_kernel: TestKernel, covar: Option<&PhenoTable>) -> Result<Prediction> {
        if !matches!(test_kernel, TestKernel::Identity) {
            bail!("A linear regression model takes no test kernel");
        }
        let Some(covar) = covar else {
            bail!("A linear regression model needs test covariates");
        };
        let x = test_covariates(covar, &self.covar_stats, &self.covar_sids)?;
        let n = covar.n_samples();
        Ok(Prediction {
            sample_ids: covar.sample_ids.clone(),
            pheno_name: self.pheno_name.clone(),
            values: x.mat_vec(&self.beta),
            covariance: DenseMatrix::identity(n).scale(self.ssres / self.iid_count as f64),
        })
    }

    fn stats(&self) -> ModelStats {
        let sigma2total = self.ssres / self.iid_count as f64;
        ModelStats {
            r2: 1.0 - self.ssres / self.sstot,
            sigma2total,
            sigma2g: 0.0,
            sigma2e: sigma2total,
            h2: 0.0,
            e2: 1.0,
        }
    }

    fn pheno_name(&self) -> &str {
        &self.pheno_name
    }
}
