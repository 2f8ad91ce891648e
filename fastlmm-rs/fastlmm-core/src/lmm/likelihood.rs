//! Profile log likelihoods of the spectral LMM.
//!
//! Both take the kernel-weighted products yKy, XKX and XKy (see
//! [`KernelProduct`]) and profile out beta and sigma2. Directions of XKX
//! with eigenvalue <= 1e-10 are dropped, so collinear covariates give a
//! minimum-norm beta instead of failing.

use std::f64::consts::PI;

use fastlmm_linalg::decomposition::{pinv_solve_symmetric, SymmetricEigen};
use fastlmm_linalg::dense::DenseMatrix;

use super::product::KernelProduct;
use super::spectral::SpectralKernel;
use crate::error::LmmError;

/// Eigenvalues of XKX at or below this are treated as zero.
pub const XKX_EIGEN_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct MlFit {
    /// Log likelihood (the negative of nLL).
    pub ll: f64,
    pub beta: Vec<f64>,
    /// Variance of each beta.
    pub variance_beta: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RemlFit {
    pub ll: f64,
    pub beta: Vec<f64>,
}

struct Profiled {
    beta: Vec<f64>,
    r2: f64,
    values: Vec<f64>,
    vectors: DenseMatrix,
}

fn profile(yky: &KernelProduct, xkx: &KernelProduct, xky: &KernelProduct) -> Result<Profiled, LmmError> {
    let yky = yky.get(0, 0);
    let xky = xky.value().col(0);
    let sol = pinv_solve_symmetric(xkx.value(), &xky, XKX_EIGEN_TOL)?;
    let r2 = yky - DenseMatrix::dot(&xky, &sol.x);
    Ok(Profiled {
        beta: sol.x,
        r2,
        values: sol.values,
        vectors: sol.vectors,
    })
}

/// Maximum likelihood with beta and sigma2 profiled out.
pub fn loglikelihood_ml(
    yky: &KernelProduct,
    xkx: &KernelProduct,
    xky: &KernelProduct,
    k: &SpectralKernel,
) -> Result<MlFit, LmmError> {
    let p = profile(yky, xkx, xky)?;
    let n = k.iid_count as f64;
    let sigma2 = p.r2 / n;
    let nll = 0.5 * (k.logdet + n * ((2.0 * PI * sigma2).ln() + 1.0));
    if !nll.is_finite() {
        return Err(LmmError::NonFiniteLikelihood(nll));
    }

    let variance_beta = (0..p.vectors.nrows())
        .map(|i| {
            let s: f64 = p
                .values
                .iter()
                .enumerate()
                .map(|(j, sj)| p.vectors.get(i, j).powi(2) / sj)
                .sum();
            k.h2 * sigma2 * s
        })
        .collect();

    Ok(MlFit {
        ll: -nll,
        beta: p.beta,
        variance_beta,
    })
}

/// Restricted maximum likelihood. `x` is the unrotated iid x p design.
pub fn loglikelihood_reml(
    x: &DenseMatrix,
    yky: &KernelProduct,
    xkx: &KernelProduct,
    xky: &KernelProduct,
    k: &SpectralKernel,
) -> Result<RemlFit, LmmError> {
    let p = profile(yky, xkx, xky)?;
    let n = x.nrows() as f64;
    let dof = n - x.ncols() as f64;

    let logdet_xx: f64 = SymmetricEigen::new(&x.t_mat_mul(x))?
        .values
        .iter()
        .map(|v| v.ln())
        .sum();
    let logdet_xkx: f64 = p.values.iter().map(|v| v.ln()).sum();
    let sigma2 = p.r2 / dof;
    let nll =
        0.5 * (k.logdet + logdet_xkx - logdet_xx + dof * ((2.0 * PI * sigma2).ln() + 1.0));
    if !nll.is_finite() {
        return Err(LmmError::NonFiniteLikelihood(nll));
    }
    Ok(RemlFit {
        ll: -nll,
        beta: p.beta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eigen::{eigen_from_kernel, eigen_from_snps, EigenData};
    use crate::kernel::KernelData;
    use crate::standardize::Unit;
    use rand::{Rng, SeedableRng};

    struct Data {
        ids: Vec<String>,
        g: DenseMatrix,
        x: DenseMatrix,
        y: DenseMatrix,
    }

    fn data(n: usize, m: usize, seed: u64) -> Data {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let g: Vec<f64> = (0..n * m).map(|_| rng.gen_range(0..3) as f64).collect();
        let cov: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let y: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() * 2.0).collect();
        Data {
            ids: (0..n).map(|i| format!("s{i}")).collect(),
            g: DenseMatrix::from_col_major(n, m, g),
            x: DenseMatrix::from_vec(&cov).with_constant_col(1.0),
            y: DenseMatrix::from_vec(&y),
        }
    }

    fn products(
        eigen: &EigenData,
        k: &SpectralKernel,
        x: &DenseMatrix,
        y: &DenseMatrix,
    ) -> (KernelProduct, KernelProduct, KernelProduct) {
        let xr = eigen.rotate(x);
        let yr = eigen.rotate(y);
        let xkx = KernelProduct::new(&xr, k, &xr);
        let xky = KernelProduct::with_ak(xkx.ak().unwrap(), &xr, k, &yr);
        (KernelProduct::new(&yr, k, &yr), xkx, xky)
    }

    /// Dense multivariate normal log density with V = sigma2 (K + delta I)
    /// at the profiled sigma2 and GLS beta.
    fn dense_ml(kmat: &DenseMatrix, delta: f64, x: &DenseMatrix, y: &[f64]) -> f64 {
        let n = y.len();
        let v = kmat.add(&DenseMatrix::identity(n).scale(delta));
        let inv = fastlmm_linalg::TruncatedEigen::new(&v, 1e-12).unwrap();
        let cols: Vec<Vec<f64>> = (0..x.ncols()).map(|j| inv.solve(&x.col(j))).collect();
        let vix = DenseMatrix::from_columns(n, &cols);
        let xvx = x.t_mat_mul(&vix);
        let xvy = vix.transpose().mat_vec(y);
        let beta = fastlmm_linalg::TruncatedEigen::new(&xvx, 1e-12).unwrap().solve(&xvy);
        let fitted = x.mat_vec(&beta);
        let r: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();
        let r2 = DenseMatrix::dot(&r, &inv.solve(&r));
        let sigma2 = r2 / n as f64;
        -0.5 * (inv.log_det() + n as f64 * ((2.0 * PI * sigma2).ln() + 1.0))
    }

    #[test]
    fn test_ml_matches_dense_formula() {
        let d = data(10, 30, 1);
        let mut g = d.g.clone();
        Unit.train(&mut g);
        let kd = KernelData::from_snps(&d.ids, &g).unwrap();
        let eigen = eigen_from_kernel(&kd).unwrap();
        let k = SpectralKernel::from_h2(&eigen, 0.4).unwrap();
        let (yky, xkx, xky) = products(&eigen, &k, &d.x, &d.y);
        let fit = loglikelihood_ml(&yky, &xkx, &xky, &k).unwrap();
        let expected = dense_ml(&kd.matrix, k.delta, &d.x, &d.y.col(0));
        assert!((fit.ll - expected).abs() < 1e-7, "{} vs {}", fit.ll, expected);
        assert_eq!(fit.beta.len(), 2);
        assert!(fit.variance_beta.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_low_rank_matches_full_rank() {
        // Few SNPs: the thin SVD and the full kernel eigendecomposition
        // describe the same K and must give the same likelihood.
        let d = data(12, 4, 2);
        let low = eigen_from_snps(&d.ids, &d.g).unwrap();
        assert!(low.is_low_rank());
        let mut g = d.g.clone();
        Unit.train(&mut g);
        let full = eigen_from_kernel(&KernelData::from_snps(&d.ids, &g).unwrap()).unwrap();
        assert!(!full.is_low_rank());

        for &h2 in &[0.1, 0.5, 0.9] {
            let kl = SpectralKernel::from_h2(&low, h2).unwrap();
            let kf = SpectralKernel::from_h2(&full, h2).unwrap();
            let (a, b, c) = products(&low, &kl, &d.x, &d.y);
            let ml_low = loglikelihood_ml(&a, &b, &c, &kl).unwrap();
            let reml_low = loglikelihood_reml(&d.x, &a, &b, &c, &kl).unwrap();
            let (a, b, c) = products(&full, &kf, &d.x, &d.y);
            let ml_full = loglikelihood_ml(&a, &b, &c, &kf).unwrap();
            let reml_full = loglikelihood_reml(&d.x, &a, &b, &c, &kf).unwrap();
            assert!((ml_low.ll - ml_full.ll).abs() < 1e-6);
            assert!((reml_low.ll - reml_full.ll).abs() < 1e-6);
            for (bl, bf) in ml_low.beta.iter().zip(&ml_full.beta) {
                assert!((bl - bf).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_collinear_covariates_still_fit() {
        let d = data(8, 3, 3);
        let eigen = eigen_from_snps(&d.ids, &d.g).unwrap();
        let k = SpectralKernel::from_h2(&eigen, 0.5).unwrap();
        // Duplicate the bias column
        let x = d.x.with_constant_col(1.0);
        let (yky, xkx, xky) = products(&eigen, &k, &x, &d.y);
        let fit = loglikelihood_ml(&yky, &xkx, &xky, &k).unwrap();
        assert!(fit.ll.is_finite());
        assert!((fit.beta[1] - fit.beta[2]).abs() < 1e-8);
    }

    #[test]
    fn test_reml_rejects_constant_covariate() {
        let d = data(8, 3, 4);
        let eigen = eigen_from_snps(&d.ids, &d.g).unwrap();
        let k = SpectralKernel::from_h2(&eigen, 0.5).unwrap();
        // An all-zero covariate makes X'X singular
        let x = DenseMatrix::zeros(8, 1).with_constant_col(1.0);
        let (yky, xkx, xky) = products(&eigen, &k, &x, &d.y);
        assert!(matches!(
            loglikelihood_reml(&x, &yky, &xkx, &xky, &k),
            Err(LmmError::NonFiniteLikelihood(_))
        ));
    }
}
