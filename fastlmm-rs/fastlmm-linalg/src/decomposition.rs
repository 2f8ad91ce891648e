#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and solvers.
//!
//! Everything the spectral mixed model needs is built on one primitive,
//! the symmetric eigendecomposition from faer. Thin SVDs go through the
//! smaller Gram matrix, and rank-deficient solves drop tiny eigenvalues
//! rather than failing.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix is not symmetric (max |A - A'| = {asymmetry:.2e})")]
    NotSymmetric { asymmetry: f64 },

    #[error("Eigendecomposition produced non-finite values")]
    EigenFailed,
}

/// Tolerance above which a matrix is rejected as asymmetric.
const SYMMETRY_TOL: f64 = 1e-6;

/// Eigendecomposition of a symmetric matrix: A = V diag(values) V'.
///
/// Eigenvalues are sorted ascending; column j of `vectors` belongs to
/// `values[j]`.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub values: Vec<f64>,
    pub vectors: DenseMatrix,
}

impl SymmetricEigen {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let asymmetry = a.asymmetry();
        if asymmetry > SYMMETRY_TOL * (1.0 + a.diag().iter().fold(0.0f64, |m, d| m.max(d.abs())))
        {
            return Err(LinalgError::NotSymmetric { asymmetry });
        }
        if n == 0 {
            return Ok(Self {
                values: Vec::new(),
                vectors: DenseMatrix::zeros(0, 0),
            });
        }

        let evd = a.as_faer().selfadjoint_eigendecomposition(faer::Side::Lower);
        let s = evd.s();
        let u = evd.u();
        let raw: Vec<f64> = (0..n).map(|i| s.column_vector().read(i)).collect();
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::EigenFailed);
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| raw[i].total_cmp(&raw[j]));

        let values = order.iter().map(|&i| raw[i]).collect();
        let mut vectors = DenseMatrix::zeros(n, n);
        for (dst, &src) in order.iter().enumerate() {
            for i in 0..n {
                vectors.set(i, dst, u.read(i, src));
            }
        }
        Ok(Self { values, vectors })
    }

    /// Keep only the eigenpairs whose eigenvalue is strictly above `tol`.
    pub fn truncate(&self, tol: f64) -> Self {
        let keep: Vec<usize> = (0..self.values.len())
            .filter(|&j| self.values[j] > tol)
            .collect();
        Self {
            values: keep.iter().map(|&j| self.values[j]).collect(),
            vectors: self.vectors.select_cols(&keep),
        }
    }
}

/// Thin singular value decomposition A = U diag(s) V', keeping only U and s.
///
/// Components with a non-positive singular value are dropped, so `u` may
/// have fewer than min(n, m) columns. Singular values are descending.
#[derive(Debug, Clone)]
pub struct ThinSvd {
    pub u: DenseMatrix,
    pub s: Vec<f64>,
}

impl ThinSvd {
    /// Compute the thin SVD of an n x m matrix through the eigendecomposition
    /// of whichever Gram matrix (A'A or AA') is smaller.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        let m = a.ncols();

        let (u, s) = if m <= n {
            let gram = a.t_mat_mul(a);
            let eig = SymmetricEigen::new(&gram)?;
            let tol = relative_tol(&eig.values);
            let mut cols = Vec::new();
            let mut s = Vec::new();
            for j in (0..eig.values.len()).rev() {
                let lambda = eig.values[j];
                if lambda <= tol {
                    continue;
                }
                let sigma = lambda.sqrt();
                let v = eig.vectors.col(j);
                let av = a.mat_vec(&v);
                cols.push(av.iter().map(|x| x / sigma).collect::<Vec<f64>>());
                s.push(sigma);
            }
            (DenseMatrix::from_columns(n, &cols), s)
        } else {
            let gram = a.gram_rows();
            let eig = SymmetricEigen::new(&gram)?;
            let tol = relative_tol(&eig.values);
            let mut cols = Vec::new();
            let mut s = Vec::new();
            for j in (0..eig.values.len()).rev() {
                let lambda = eig.values[j];
                if lambda <= tol {
                    continue;
                }
                cols.push(eig.vectors.col(j));
                s.push(lambda.sqrt());
            }
            (DenseMatrix::from_columns(n, &cols), s)
        };

        Ok(Self { u, s })
    }
}

fn relative_tol(values: &[f64]) -> f64 {
    let max = values.iter().fold(0.0f64, |m, v| m.max(*v));
    max * 1e-12
}

/// Eigendecomposition of a symmetric PSD matrix with the near-null space
/// removed. Used as a pseudo-inverse.
#[derive(Debug, Clone)]
pub struct TruncatedEigen {
    pub values: Vec<f64>,
    pub vectors: DenseMatrix,
}

impl TruncatedEigen {
    /// Decompose `a` and drop eigen-directions with eigenvalue <= `tol`.
    pub fn new(a: &DenseMatrix, tol: f64) -> Result<Self, LinalgError> {
        let eig = SymmetricEigen::new(a)?.truncate(tol);
        Ok(Self {
            values: eig.values,
            vectors: eig.vectors,
        })
    }

    /// Number of kept eigen-directions.
    pub fn rank(&self) -> usize {
        self.values.len()
    }

    /// x = V diag(1/values) V' b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.vectors.nrows();
        assert_eq!(b.len(), n);
        let mut x = vec![0.0; n];
        for j in 0..self.values.len() {
            let v = self.vectors.col(j);
            let coef = DenseMatrix::dot(&v, b) / self.values[j];
            for i in 0..n {
                x[i] += coef * v[i];
            }
        }
        x
    }

    /// Diagonal of the pseudo-inverse: sum_j V_ij^2 / values_j.
    pub fn inverse_diag(&self) -> Vec<f64> {
        let n = self.vectors.nrows();
        let mut d = vec![0.0; n];
        for j in 0..self.values.len() {
            for i in 0..n {
                let v = self.vectors.get(i, j);
                d[i] += v * v / self.values[j];
            }
        }
        d
    }

    /// Sum of the log of the kept eigenvalues.
    pub fn log_det(&self) -> f64 {
        self.values.iter().map(|v| v.ln()).sum()
    }
}

/// Solution of `a x = b` for symmetric PSD `a` with the near-null space removed.
#[derive(Debug, Clone)]
pub struct PinvSolution {
    pub x: Vec<f64>,
    /// Kept eigenvalues.
    pub values: Vec<f64>,
    /// Kept eigenvectors, one per column.
    pub vectors: DenseMatrix,
}

/// Solve `a x = b`, dropping eigen-directions of `a` with eigenvalue <= `tol`.
pub fn pinv_solve_symmetric(
    a: &DenseMatrix,
    b: &[f64],
    tol: f64,
) -> Result<PinvSolution, LinalgError> {
    if a.nrows() != b.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: a.nrows(),
            got: b.len(),
        });
    }
    let eig = TruncatedEigen::new(a, tol)?;
    let x = eig.solve(b);
    Ok(PinvSolution {
        x,
        values: eig.values,
        vectors: eig.vectors,
    })
}

/// Solution of min ||X b - y||^2.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    pub coef: Vec<f64>,
    /// Residual sum of squares.
    pub ssres: f64,
    /// Numerical rank of X.
    pub rank: usize,
}

/// Minimum-norm least squares through the pseudo-inverse of X'X.
pub fn least_squares(x: &DenseMatrix, y: &[f64]) -> Result<LeastSquares, LinalgError> {
    if x.nrows() != y.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    let xtx = x.t_mat_mul(x);
    let xty = x.transpose().mat_vec(y);
    let max = xtx.diag().iter().fold(0.0f64, |m, v| m.max(*v));
    let sol = pinv_solve_symmetric(&xtx, &xty, max * 1e-10)?;
    let coef = sol.x;
    let fitted = x.mat_vec(&coef);
    let ssres = y
        .iter()
        .zip(fitted.iter())
        .map(|(yi, fi)| (yi - fi).powi(2))
        .sum();
    Ok(LeastSquares {
        coef,
        ssres,
        rank: sol.values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn random_matrix(n: usize, m: usize, seed: u64) -> DenseMatrix {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let data: Vec<f64> = (0..n * m).map(|_| rng.gen::<f64>() - 0.5).collect();
        DenseMatrix::from_col_major(n, m, data)
    }

    #[test]
    fn test_eigen_known_values() {
        let a = DenseMatrix::from_row_major(2, 2, &[3.0, 1.0, 1.0, 3.0]);
        let eig = SymmetricEigen::new(&a).unwrap();
        assert!((eig.values[0] - 2.0).abs() < 1e-10);
        assert!((eig.values[1] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_eigen_reconstructs() {
        let g = random_matrix(5, 3, 7);
        let a = g.gram_rows().add(&DenseMatrix::identity(5));
        let eig = SymmetricEigen::new(&a).unwrap();
        let rebuilt = eig
            .vectors
            .mat_mul(&DenseMatrix::from_diag(&eig.values))
            .mat_mul(&eig.vectors.transpose());
        for i in 0..5 {
            for j in 0..5 {
                assert!((rebuilt.get(i, j) - a.get(i, j)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_eigen_rejects_asymmetric() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 2.0, 0.0, 1.0]);
        assert!(matches!(
            SymmetricEigen::new(&a),
            Err(LinalgError::NotSymmetric { .. })
        ));
    }

    #[test]
    fn test_thin_svd_tall_and_wide_agree() {
        for &(n, m) in &[(6usize, 3usize), (3, 6)] {
            let a = random_matrix(n, m, 11);
            let svd = ThinSvd::new(&a).unwrap();
            assert_eq!(svd.s.len(), n.min(m));
            // U diag(s^2) U' must equal A A'
            let aat = a.gram_rows();
            let s2: Vec<f64> = svd.s.iter().map(|s| s * s).collect();
            let rebuilt = svd
                .u
                .mat_mul(&DenseMatrix::from_diag(&s2))
                .mat_mul(&svd.u.transpose());
            for i in 0..n {
                for j in 0..n {
                    assert!((rebuilt.get(i, j) - aat.get(i, j)).abs() < 1e-9);
                }
            }
            for w in svd.s.windows(2) {
                assert!(w[0] >= w[1]);
            }
        }
    }

    #[test]
    fn test_thin_svd_drops_null_components() {
        // Two identical columns: rank 1
        let a = DenseMatrix::from_row_major(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let svd = ThinSvd::new(&a).unwrap();
        assert_eq!(svd.s.len(), 1);
        assert!((svd.s[0] - (28.0f64).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_truncated_solve_and_inverse_diag() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let pinv = TruncatedEigen::new(&a, 1e-10).unwrap();
        let x = pinv.solve(&[1.0, 2.0]);
        let ax = a.mat_vec(&x);
        assert!((ax[0] - 1.0).abs() < 1e-10);
        assert!((ax[1] - 2.0).abs() < 1e-10);
        // inverse of [[4,2],[2,3]] is [[3,-2],[-2,4]] / 8
        let d = pinv.inverse_diag();
        assert!((d[0] - 3.0 / 8.0).abs() < 1e-10);
        assert!((d[1] - 0.5).abs() < 1e-10);
        assert!((pinv.log_det() - 8.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_pinv_solve_drops_null_direction() {
        // [[1,1],[1,1]] has eigenvalues 0 and 2
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let sol = pinv_solve_symmetric(&a, &[2.0, 2.0], 1e-10).unwrap();
        assert_eq!(sol.values.len(), 1);
        assert!((sol.values[0] - 2.0).abs() < 1e-10);
        assert!((sol.x[0] - 1.0).abs() < 1e-10);
        assert!((sol.x[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_least_squares_line() {
        // y = 2x + 1 exactly
        let x = DenseMatrix::from_row_major(4, 2, &[0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0]);
        let y = vec![1.0, 3.0, 5.0, 7.0];
        let fit = least_squares(&x, &y).unwrap();
        assert_eq!(fit.rank, 2);
        assert!((fit.coef[0] - 2.0).abs() < 1e-9);
        assert!((fit.coef[1] - 1.0).abs() < 1e-9);
        assert!(fit.ssres < 1e-16);
    }

    #[test]
    fn test_least_squares_rank_deficient() {
        // First column is all zeros (a standardized constant covariate)
        let x = DenseMatrix::from_row_major(3, 2, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let fit = least_squares(&x, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(fit.rank, 1);
        assert!(fit.coef[0].abs() < 1e-12);
        assert!((fit.coef[1] - 2.0).abs() < 1e-9);
        assert!((fit.ssres - 2.0).abs() < 1e-9);
    }
}
