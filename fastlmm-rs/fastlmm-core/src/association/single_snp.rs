//! Single-SNP likelihood ratio tests with a precomputed eigendecomposition.
//!
//! The null model (covariates + bias) is fitted once. Each test SNP is
//! added as one extra fixed effect and compared to the null with a
//! 1-df chi-square likelihood ratio test. SNPs are read in batches; within
//! a batch the per-SNP fits run in parallel.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fastlmm_geno::phenotype::PhenoTable;
use fastlmm_geno::sample::intersect_samples;
use fastlmm_geno::traits::GenotypeReader;
use fastlmm_linalg::dense::DenseMatrix;
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, info};

use crate::eigen::{EigenData, Rotation};
use crate::error::LmmError;
use crate::lmm::{
    find_h2, loglikelihood_ml, loglikelihood_reml, H2SearchConfig, KernelProduct, SpectralKernel,
};
use crate::standardize::Unit;

/// Name of the all-ones column appended to the covariates.
pub const BIAS_COLUMN: &str = "bias";

#[derive(Debug, Clone)]
pub struct SingleSnpConfig {
    /// Fixed log delta for the null model. When absent, h2 is searched.
    pub log_delta: Option<f64>,
    /// Search h2 with REML (otherwise ML).
    pub fit_log_delta_via_reml: bool,
    /// Compare null and alternative with REML likelihoods (otherwise ML).
    pub test_via_reml: bool,
    /// SNPs read and rotated at a time.
    pub batch_size: usize,
    /// Tab-separated results are written here when set.
    pub output_file: Option<PathBuf>,
}

impl Default for SingleSnpConfig {
    fn default() -> Self {
        Self {
            log_delta: None,
            fit_log_delta_via_reml: true,
            test_via_reml: false,
            batch_size: 1000,
            output_file: None,
        }
    }
}

/// One tested SNP.
#[derive(Debug, Clone)]
pub struct SnpResult {
    /// Position of the SNP in the test file.
    pub sid_index: usize,
    pub snp: String,
    pub chrom: String,
    pub gen_dist: f64,
    pub chr_pos: u64,
    pub p_value: f64,
    pub snp_weight: f64,
    /// NaN when testing via REML.
    pub snp_weight_se: f64,
    pub mixing: f64,
    pub null_h2: f64,
}

/// Test every SNP in `test_snps` for association with the single phenotype
/// in `pheno`, with the kernel given by `eigen`.
///
/// Results are sorted by p-value (ascending, NaN last).
pub fn single_snp_eigen<R: GenotypeReader + ?Sized>(
    test_snps: &mut R,
    pheno: &PhenoTable,
    eigen: &EigenData,
    covar: Option<&PhenoTable>,
    config: &SingleSnpConfig,
) -> Result<Vec<SnpResult>> {
    if let Some(path) = &config.output_file {
        create_parent_dir(path)?;
    }

    let pheno = drop_missing_phenotypes(pheno)?;
    if pheno.n_cols() != 1 {
        return Err(LmmError::PhenotypeCount(pheno.n_cols()).into());
    }
    let empty_covar;
    let covar = match covar {
        Some(c) => c,
        None => {
            empty_covar = PhenoTable::empty(&pheno.sample_ids);
            &empty_covar
        }
    };

    // Everything is aligned to the test SNPs' IID order.
    let snp_ids = test_snps.sample_ids().to_vec();
    let isect = intersect_samples(&[&snp_ids, &pheno.sample_ids, &eigen.sample_ids, &covar.sample_ids]);
    debug!("# of iids now {}", isect.ids.len());
    if isect.ids.len() != eigen.iid_count() {
        return Err(LmmError::IidMismatch {
            expected: eigen.iid_count(),
            got: isect.ids.len(),
        }
        .into());
    }
    test_snps.set_sample_subset(&isect.ids)?;
    let pheno = pheno.take_rows(&isect.indices[1]);
    let eigen = eigen.subset(&isect.ids)?;
    let covar = covar.take_rows(&isect.indices[3]);
    check_no_missing_covariates(&covar)?;

    let x = covar.values.with_constant_col(1.0);
    let cc = x.ncols();
    let covar_r = eigen.rotate(&x);
    let y_r = eigen.rotate(&pheno.values);
    info!(
        "Testing {} SNPs on {} individuals with {} covariates (incl. {})",
        test_snps.n_markers(),
        isect.ids.len(),
        cc,
        BIAS_COLUMN
    );

    let k = match config.log_delta {
        Some(log_delta) => SpectralKernel::from_log_delta(&eigen, log_delta)?,
        None => {
            let search = H2SearchConfig::default();
            let best = find_h2(&eigen, &x, &covar_r, &y_r, config.fit_log_delta_via_reml, &search)?;
            SpectralKernel::from_h2(&eigen, best.h2)?
        }
    };
    info!("Null model h2 = {:.6}, log delta = {:.6}", k.h2, k.log_delta);

    let covar_ak = k.scale_rotated(&covar_r);
    let yky = KernelProduct::new(&y_r, &k, &y_r);
    let covar_k_covar = KernelProduct::with_ak(&covar_ak, &covar_r, &k, &covar_r);
    let covar_k_y = KernelProduct::with_ak(&covar_ak, &covar_r, &k, &y_r);

    let ll_null = if config.test_via_reml {
        loglikelihood_reml(&x, &yky, &covar_k_covar, &covar_k_y, &k)?.ll
    } else {
        loglikelihood_ml(&yky, &covar_k_covar, &covar_k_y, &k)?.ll
    };
    debug!("Null log likelihood {}", ll_null);

    let null = NullModel {
        k: &k,
        x: &x,
        yky: &yky,
        covar_k_covar: &covar_k_covar,
        covar_k_y: &covar_k_y,
        ll_null,
        test_via_reml: config.test_via_reml,
    };
    let chi2 = ChiSquared::new(1.0)?;

    let sid_count = test_snps.n_markers();
    let batch_size = config.batch_size.max(1);
    let mut results = Vec::with_capacity(sid_count);
    for start in (0..sid_count).step_by(batch_size) {
        let end = (start + batch_size).min(sid_count);
        let (mut snps, infos) = test_snps.read_block(start, end)?;
        Unit.train(&mut snps);
        let alt_r = eigen.rotate(&snps);
        let alt_ak = k.scale_rotated(&alt_r);
        let covar_k_alt = KernelProduct::with_ak(&covar_ak, &covar_r, &k, &alt_r);
        let alt_k_y = KernelProduct::with_ak(&alt_ak, &alt_r, &k, &y_r);

        let batch = Batch {
            snps: &snps,
            alt_r: &alt_r,
            alt_ak: &alt_ak,
            covar_k_alt: &covar_k_alt,
            alt_k_y: &alt_k_y,
        };
        let fits: Vec<(f64, f64, f64)> = (0..end - start)
            .into_par_iter()
            .map(|i| null.test_snp(&batch, i, cc))
            .collect::<Result<Vec<_>, LmmError>>()?;

        for (i, ((stat, weight, se), info)) in fits.into_iter().zip(infos).enumerate() {
            results.push(SnpResult {
                sid_index: start + i,
                snp: info.id,
                chrom: info.chrom,
                gen_dist: info.gen_dist,
                chr_pos: info.pos,
                p_value: p_value(&chi2, stat, start + i),
                snp_weight: weight,
                snp_weight_se: se,
                mixing: 0.0,
                null_h2: k.h2,
            });
        }
        debug!("Tested SNPs {}..{}", start, end);
    }

    sort_by_p_value(&mut results);

    if let Some(path) = &config.output_file {
        write_results(path, &results)?;
        info!("Wrote {} results to {}", results.len(), path.display());
    }
    Ok(results)
}

/// Null-model quantities shared by every SNP test.
struct NullModel<'a> {
    k: &'a SpectralKernel,
    x: &'a DenseMatrix,
    yky: &'a KernelProduct,
    covar_k_covar: &'a KernelProduct,
    covar_k_y: &'a KernelProduct,
    ll_null: f64,
    test_via_reml: bool,
}

/// One batch of standardized SNPs and their products.
struct Batch<'a> {
    snps: &'a DenseMatrix,
    alt_r: &'a Rotation,
    alt_ak: &'a DenseMatrix,
    covar_k_alt: &'a KernelProduct,
    alt_k_y: &'a KernelProduct,
}

impl NullModel<'_> {
    /// Fit covariates + SNP `i` of the batch. Returns (ll_alt - ll_null,
    /// SNP weight, SNP weight standard error).
    ///
    /// A SNP with no variance (monomorphic or all missing), or whose
    /// alternative likelihood is not finite, gives NaN for all three.
    fn test_snp(&self, batch: &Batch<'_>, i: usize, cc: usize) -> Result<(f64, f64, f64), LmmError> {
        const UNTESTABLE: (f64, f64, f64) = (f64::NAN, f64::NAN, f64::NAN);
        if batch.snps.col(i).iter().all(|&v| v == 0.0) {
            return Ok(UNTESTABLE);
        }
        let alt_i = batch.alt_r.column(i);

        let mut xkx = KernelProduct::empty(cc + 1, cc + 1);
        xkx.set_block(0, 0, self.covar_k_covar);
        let upper_right = batch.covar_k_alt.cols(i, i + 1);
        xkx.set_block(0, cc, &upper_right);
        xkx.set_block(cc, 0, &upper_right.transpose());
        let ak_i = batch.alt_ak.col_range(i, i + 1);
        xkx.set_block(cc, cc, &KernelProduct::with_ak(&ak_i, &alt_i, self.k, &alt_i));

        let mut xky = KernelProduct::empty(cc + 1, 1);
        xky.set_block(0, 0, self.covar_k_y);
        xky.set_block(cc, 0, &batch.alt_k_y.rows(i, i + 1));

        let fit = if self.test_via_reml {
            let x = self.x.hstack(&batch.snps.col_range(i, i + 1));
            loglikelihood_reml(&x, self.yky, &xkx, &xky, self.k)
                .map(|fit| (fit.ll, fit.beta[cc], f64::NAN))
        } else {
            loglikelihood_ml(self.yky, &xkx, &xky, self.k)
                .map(|fit| (fit.ll, fit.beta[cc], fit.variance_beta[cc].sqrt()))
        };
        match fit {
            Ok((ll_alt, weight, se)) => Ok((ll_alt - self.ll_null, weight, se)),
            Err(LmmError::NonFiniteLikelihood(_)) => Ok(UNTESTABLE),
            Err(e) => Err(e),
        }
    }
}

/// Chi-square(1) p-value of the likelihood ratio `2 * stat`. A negative
/// statistic means the alternative fit came out below the null.
fn p_value(chi2: &ChiSquared, stat: f64, sid_index: usize) -> f64 {
    if stat.is_nan() {
        return f64::NAN;
    }
    if stat < 0.0 {
        debug!("SNP {}: alternative log likelihood below null by {:e}", sid_index, -stat);
        return 1.0;
    }
    chi2.sf(2.0 * stat)
}

/// Drop individuals whose phenotype values are all missing. An individual
/// with only some values missing is an error.
fn drop_missing_phenotypes(pheno: &PhenoTable) -> Result<PhenoTable, LmmError> {
    let total = pheno.n_cols();
    let mut keep = Vec::with_capacity(pheno.n_samples());
    for i in 0..pheno.n_samples() {
        let missing = (0..total).filter(|&j| pheno.values.get(i, j).is_nan()).count();
        if missing == 0 {
            keep.push(i);
        } else if missing < total {
            return Err(LmmError::PartialMissingPhenotype {
                iid: pheno.sample_ids[i].clone(),
                missing,
                total,
            });
        }
    }
    if keep.len() < pheno.n_samples() {
        info!(
            "Dropped {} individuals with a missing phenotype",
            pheno.n_samples() - keep.len()
        );
    }
    Ok(pheno.take_rows(&keep))
}

fn check_no_missing_covariates(covar: &PhenoTable) -> Result<(), LmmError> {
    for j in 0..covar.n_cols() {
        for i in 0..covar.n_samples() {
            if covar.values.get(i, j).is_nan() {
                return Err(LmmError::MissingCovariate {
                    iid: covar.sample_ids[i].clone(),
                    column: covar.names[j].clone(),
                });
            }
        }
    }
    Ok(())
}

/// Stable ascending sort on p-value with NaN last.
fn sort_by_p_value(results: &mut [SnpResult]) {
    results.sort_by(|a, b| {
        a.p_value
            .is_nan()
            .cmp(&b.p_value.is_nan())
            .then(a.p_value.partial_cmp(&b.p_value).unwrap_or(std::cmp::Ordering::Equal))
    });
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write results as a tab-separated table with a header row.
pub fn write_results(path: &Path, results: &[SnpResult]) -> Result<()> {
    create_parent_dir(path)?;
    let mut f = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    writeln!(
        f,
        "sid_index\tSNP\tChr\tGenDist\tChrPos\tPValue\tSnpWeight\tSnpWeightSE\tMixing\tNullh2"
    )?;
    for r in results {
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{:e}\t{}\t{}\t{}\t{}",
            r.sid_index,
            r.snp,
            r.chrom,
            r.gen_dist,
            r.chr_pos,
            r.p_value,
            r.snp_weight,
            r.snp_weight_se,
            r.mixing,
            r.null_h2
        )?;
    }
    f.flush()?;
    Ok(())
}
