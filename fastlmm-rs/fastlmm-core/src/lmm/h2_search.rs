//! Search for the heritability h2 that maximizes the (restricted) likelihood.

use fastlmm_linalg::dense::DenseMatrix;
use tracing::{debug, info};

use super::likelihood::{loglikelihood_ml, loglikelihood_reml};
use super::product::KernelProduct;
use super::spectral::SpectralKernel;
use crate::eigen::{EigenData, Rotation};
use crate::error::LmmError;
use crate::util::mingrid::minimize_1d;

/// Configuration for the h2 search.
#[derive(Debug, Clone)]
pub struct H2SearchConfig {
    /// Number of grid intervals before Brent refinement.
    pub n_grid: usize,
    pub min_h2: f64,
    pub max_h2: f64,
}

impl Default for H2SearchConfig {
    fn default() -> Self {
        Self {
            n_grid: 10,
            min_h2: 1e-5,
            max_h2: 0.99999,
        }
    }
}

/// The best h2 seen and its negative log likelihood.
#[derive(Debug, Clone, Copy)]
pub struct H2Result {
    pub h2: f64,
    pub nll: f64,
}

/// Minimize the negative log likelihood over h2.
///
/// `x` is the unrotated design (used by REML only); `x_r` and `y_r` are its
/// rotation and the phenotype's.
pub fn find_h2(
    eigen: &EigenData,
    x: &DenseMatrix,
    x_r: &Rotation,
    y_r: &Rotation,
    reml: bool,
    config: &H2SearchConfig,
) -> Result<H2Result, LmmError> {
    info!("Searching for h2 ({})", if reml { "REML" } else { "ML" });

    let objective = |h2: f64| -> Result<f64, LmmError> {
        let k = SpectralKernel::from_h2(eigen, h2)?;
        let yky = KernelProduct::new(y_r, &k, y_r);
        let xkx = KernelProduct::new(x_r, &k, x_r);
        let xky = match xkx.ak() {
            Some(ak) => KernelProduct::with_ak(ak, x_r, &k, y_r),
            None => KernelProduct::new(x_r, &k, y_r),
        };
        let ll = if reml {
            loglikelihood_reml(x, &yky, &xkx, &xky, &k)?.ll
        } else {
            loglikelihood_ml(&yky, &xkx, &xky, &k)?.ll
        };
        debug!("search\t{}\t{}", h2, -ll);
        Ok(-ll)
    };

    let (h2, nll) = minimize_1d(objective, config.n_grid, config.min_h2, config.max_h2)?;
    info!("h2 = {:.6} (nLL = {:.6})", h2, nll);
    Ok(H2Result { h2, nll })
}
