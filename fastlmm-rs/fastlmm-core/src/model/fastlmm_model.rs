//! Mixed-model predictor: covariates as fixed effects plus one genetic
//! kernel as a random effect.
//!
//! Training learns beta, h2 and sigma2 on the spectral form of the kernel.
//! Prediction is the Gaussian process posterior mean and covariance for
//! new individuals given their kernel against the training individuals.

use anyhow::{bail, Context, Result};
use fastlmm_geno::phenotype::PhenoTable;
use fastlmm_geno::sample::{intersect_samples, reorder_rows};
use fastlmm_linalg::dense::DenseMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    single_phenotype, test_covariates, total_sum_of_squares, train_covariates, ModelStats,
    Prediction, TestKernel, TrainKernel, TrainedModel,
};
use crate::eigen::{eigen_from_kernel, EigenData};
use crate::error::LmmError;
use crate::kernel::{CrossKernel, KernelData};
use crate::lmm::{find_h2, loglikelihood_ml, H2SearchConfig, KernelProduct, SpectralKernel};
use crate::standardize::{Unit, UnitTrained};
use crate::util::flat::FlatMatrix;

/// Lower bound of the h2 search when learning a model.
const LEARN_MIN_H2: f64 = 1e-5;

/// Kernel scale factors closer than this to 1 are not applied.
const FACTOR_EPS: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastLmmModel {
    pub beta: Vec<f64>,
    pub h2: f64,
    pub sigma2: f64,
    pub eigen_values: Vec<f64>,
    /// iid x eid.
    pub eigen_vectors: FlatMatrix,
    /// Standardized and scaled training SNPs, when the kernel came from SNPs.
    pub genotypes: Option<FlatMatrix>,
    pub y: Vec<f64>,
    /// Standardized covariates with the all-ones column (iid x p).
    pub x: FlatMatrix,
    /// Multiplier that makes the kernel diagonal sum to the iid count.
    pub factor: f64,
    pub snp_stats: Option<UnitTrained>,
    pub covar_stats: UnitTrained,
    pub train_ids: Vec<String>,
    pub snp_sids: Option<Vec<String>>,
    pub covar_sids: Vec<String>,
    pub pheno_name: String,
}

impl FastLmmModel {
    /// Fit the model. `h2` is searched by maximum likelihood when absent.
    pub fn learn(
        train_kernel: TrainKernel,
        covar: Option<&PhenoTable>,
        pheno: &PhenoTable,
        h2: Option<f64>,
    ) -> Result<Self> {
        let pheno = single_phenotype(pheno)?;
        let covar = covar
            .cloned()
            .unwrap_or_else(|| PhenoTable::empty(&pheno.sample_ids));

        let kernel_ids = match &train_kernel {
            TrainKernel::Snps(snps) => snps.sample_ids.clone(),
            TrainKernel::Kernel(k) => k.sample_ids.clone(),
            TrainKernel::Identity => pheno.sample_ids.clone(),
        };
        let inter = intersect_samples(&[&kernel_ids, &covar.sample_ids, &pheno.sample_ids]);
        if inter.ids.is_empty() {
            bail!("No individuals are shared by the kernel, covariates and phenotype");
        }
        let ids = inter.ids.clone();
        let n = ids.len();
        info!("Learning FastLMM model on {} individuals", n);

        let y = pheno.take_rows(&inter.indices[2]).values.col(0);
        let (x, covar_stats, covar_sids) = train_covariates(&covar.take_rows(&inter.indices[1]));

        let (eigen, factor, genotypes, snp_stats, snp_sids) = match train_kernel {
            TrainKernel::Snps(snps) => {
                let mut g = reorder_rows(&snps.values, &inter.indices[0]);
                let stats = Unit.train(&mut g);
                let ss = g.sum_of_squares();
                let factor = if g.ncols() == 0 || ss == 0.0 {
                    1.0
                } else {
                    n as f64 / ss
                };
                g.scale_in_place(factor.sqrt());
                let eigen = EigenData::from_genotypes(&ids, &g)?;
                debug!(
                    "SNP kernel from {} SNPs, factor {}, {} eigenvalues",
                    g.ncols(),
                    factor,
                    eigen.eid_count()
                );
                (eigen, factor, Some(FlatMatrix::from(&g)), Some(stats), Some(snps.sids))
            }
            TrainKernel::Kernel(k) => {
                let mut k = k.subset(&ids)?;
                let factor = k.diag_k_to_n_factor()?;
                if (factor - 1.0).abs() > FACTOR_EPS {
                    k.scale(factor);
                }
                (eigen_from_kernel(&k)?, factor, None, None, None)
            }
            TrainKernel::Identity => {
                let k = KernelData::identity(&ids);
                (eigen_from_kernel(&k)?, 1.0, None, None, None)
            }
        };

        let y_mat = DenseMatrix::from_vec(&y);
        let x_r = eigen.rotate(&x);
        let y_r = eigen.rotate(&y_mat);

        let h2 = match h2 {
            Some(h2) => {
                if !(h2 > 0.0 && h2 < 1.0) {
                    return Err(LmmError::InvalidH2(h2).into());
                }
                h2
            }
            None => {
                let config = H2SearchConfig {
                    min_h2: LEARN_MIN_H2,
                    ..H2SearchConfig::default()
                };
                find_h2(&eigen, &x, &x_r, &y_r, false, &config)?.h2
            }
        };

        let k = SpectralKernel::from_h2(&eigen, h2)?;
        let yky = KernelProduct::new(&y_r, &k, &y_r);
        let xkx = KernelProduct::new(&x_r, &k, &x_r);
        let xky = KernelProduct::new(&x_r, &k, &y_r);
        let beta = loglikelihood_ml(&yky, &xkx, &xky, &k)?.beta;

        let fitted = x.mat_vec(&beta);
        let sigma2 = fitted
            .iter()
            .zip(&y)
            .map(|(f, yi)| (f - yi).powi(2))
            .sum::<f64>()
            / n as f64;
        info!("h2 = {:.6}, sigma2 = {:.6}", h2, sigma2);

        Ok(Self {
            beta,
            h2,
            sigma2,
            eigen_values: eigen.values,
            eigen_vectors: FlatMatrix::from(&eigen.vectors),
            genotypes,
            y,
            x: FlatMatrix::from(&x),
            factor,
            snp_stats,
            covar_stats,
            train_ids: ids,
            snp_sids,
            covar_sids,
            pheno_name: pheno.names[0].clone(),
        })
    }

    fn eigen(&self) -> Result<EigenData> {
        if !self.eigen_vectors.is_consistent() {
            bail!("Model eigenvectors have the wrong length");
        }
        EigenData::new(
            self.train_ids.clone(),
            self.eigen_values.clone(),
            self.eigen_vectors.to_dense(),
        )
    }

    /// Residuals y - X beta on the training data.
    fn residuals(&self) -> Vec<f64> {
        let fitted = self.x.to_dense().mat_vec(&self.beta);
        self.y.iter().zip(&fitted).map(|(y, f)| y - f).collect()
    }

    /// Test-by-train and test-by-test kernels for `ids`, on the training scale.
    fn test_kernels(&self, kernel: &TestKernel, ids: &[String]) -> Result<(DenseMatrix, DenseMatrix)> {
        match kernel {
            TestKernel::Snps(snps) => {
                let (Some(stats), Some(train_g), Some(sids)) =
                    (&self.snp_stats, &self.genotypes, &self.snp_sids)
                else {
                    bail!("Model was not trained on SNPs, so it cannot predict from test SNPs");
                };
                if &snps.sids != sids {
                    return Err(LmmError::SidMismatch { what: "SNP" }.into());
                }
                let rows = crate::kernel::positions(&snps.sample_ids, ids)?;
                let mut g = reorder_rows(&snps.values, &rows);
                stats.apply(&mut g)?;
                g.scale_in_place(self.factor.sqrt());
                let k_star = g.mat_mul(&train_g.to_dense().transpose());
                Ok((k_star, g.gram_rows()))
            }
            TestKernel::Kernel {
                train_test,
                test_test,
            } => {
                let cross = train_test
                    .subset(&self.train_ids, ids)
                    .context("Train-test kernel must cover every training individual")?;
                let test = test_test.subset(ids)?;
                Ok((
                    cross.matrix.transpose().scale(self.factor),
                    test.matrix.scale(self.factor),
                ))
            }
            TestKernel::Identity => {
                let cross = CrossKernel::identity(&self.train_ids, ids);
                Ok((
                    cross.matrix.transpose().scale(self.factor),
                    DenseMatrix::identity(ids.len()).scale(self.factor),
                ))
            }
        }
    }
}

/// Apply V^-1 = (varg K + vare I)^-1 to the columns of `r` through the
/// eigendecomposition of K.
fn apply_v_inverse(eigen: &EigenData, r: &DenseMatrix, varg: f64, vare: f64) -> DenseMatrix {
    let rot = eigen.rotate(r);
    let mut scaled = rot.rotated.clone();
    for j in 0..scaled.ncols() {
        for (i, s) in eigen.values.iter().enumerate() {
            scaled.set(i, j, rot.rotated.get(i, j) / (varg * s + vare));
        }
    }
    let inside = eigen.vectors.mat_mul(&scaled);
    match rot.double {
        Some(double) => inside.add(&double.scale(1.0 / vare)),
        None => inside,
    }
}

impl TrainedModel for FastLmmModel {
    fn predict(&self, test_kernel: TestKernel, covar: Option<&PhenoTable>) -> Result<Prediction> {
        let kernel_ids: Option<Vec<String>> = match &test_kernel {
            TestKernel::Snps(snps) => Some(snps.sample_ids.clone()),
            TestKernel::Kernel {
                train_test,
                test_test,
            } => {
                let inter = intersect_samples(&[&train_test.col_ids, &test_test.sample_ids]);
                Some(inter.ids)
            }
            TestKernel::Identity => None,
        };
        let ids = match (&kernel_ids, covar) {
            (Some(k), Some(c)) => intersect_samples(&[k, &c.sample_ids]).ids,
            (Some(k), None) => k.clone(),
            (None, Some(c)) => c.sample_ids.clone(),
            (None, None) => bail!("Prediction needs a test kernel or test covariates"),
        };
        if ids.is_empty() {
            bail!("No test individuals are shared by the test kernel and covariates");
        }
        info!("Predicting {} individuals", ids.len());

        let covar = match covar {
            Some(c) => c.subset(&ids)?,
            None => PhenoTable::empty(&ids),
        };
        let x_star = test_covariates(&covar, &self.covar_stats, &self.covar_sids)?;
        let (k_star, k_star_star) = self.test_kernels(&test_kernel, &ids)?;

        let eigen = self.eigen()?;
        let varg = self.h2 * self.sigma2;
        let vare = (1.0 - self.h2) * self.sigma2;

        let resid = DenseMatrix::from_vec(&self.residuals());
        let v_inv_resid = apply_v_inverse(&eigen, &resid, varg, vare);
        let fixed = x_star.mat_vec(&self.beta);
        let random = k_star.mat_mul(&v_inv_resid).col(0);
        let values: Vec<f64> = fixed
            .iter()
            .zip(&random)
            .map(|(f, r)| f + varg * r)
            .collect();

        let v_inv_kt = apply_v_inverse(&eigen, &k_star.transpose(), varg, vare);
        let explained = k_star.mat_mul(&v_inv_kt).scale(varg * varg);
        let covariance = k_star_star
            .scale(varg)
            .add(&DenseMatrix::identity(ids.len()).scale(vare))
            .sub(&explained);

        Ok(Prediction {
            sample_ids: ids,
            pheno_name: self.pheno_name.clone(),
            values,
            covariance,
        })
    }

    fn stats(&self) -> ModelStats {
        let resid = self.residuals();
        let ssres: f64 = resid.iter().map(|r| r * r).sum();
        let sstot = total_sum_of_squares(&self.y);
        let sigma2total = ssres / resid.len() as f64;
        ModelStats {
            r2: 1.0 - ssres / sstot,
            sigma2total,
            sigma2g: sigma2total * self.h2,
            sigma2e: sigma2total * (1.0 - self.h2),
            h2: self.h2,
            e2: 1.0 - self.h2,
        }
    }

    fn pheno_name(&self) -> &str {
        &self.pheno_name
    }
}
