#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major Mat<f64> with the handful of operations the
//! mixed-model code leans on: products, transposes, row/column selection
//! and horizontal concatenation of design matrices.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
///
/// Rows are individuals (iids) and columns are features (sids) wherever
/// the matrix holds genotype, phenotype or covariate data.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a new dense matrix filled with a constant value.
    pub fn full(nrows: usize, ncols: usize, value: f64) -> Self {
        Self {
            inner: Mat::from_fn(nrows, ncols, |_, _| value),
        }
    }

    /// Create a dense matrix from a flat vec (column-major order).
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i]);
        Self { inner }
    }

    /// Create a dense matrix from a flat slice in row-major order.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Create a matrix whose columns are the given vectors.
    pub fn from_columns(nrows: usize, columns: &[Vec<f64>]) -> Self {
        for c in columns {
            assert_eq!(c.len(), nrows);
        }
        let inner = Mat::from_fn(nrows, columns.len(), |i, j| columns[j][i]);
        Self { inner }
    }

    /// Create an identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        let inner = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
        Self { inner }
    }

    /// Create a single-column matrix from a slice.
    pub fn from_vec(data: &[f64]) -> Self {
        let n = data.len();
        let inner = Mat::from_fn(n, 1, |i, _| data[i]);
        Self { inner }
    }

    /// Create a diagonal matrix from a vector.
    pub fn from_diag(diag: &[f64]) -> Self {
        let n = diag.len();
        let inner = Mat::from_fn(n, n, |i, j| if i == j { diag[i] } else { 0.0 });
        Self { inner }
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Get a reference to the underlying faer matrix.
    pub fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Matrix-matrix product: self * other.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        let result = &self.inner * &other.inner;
        DenseMatrix { inner: result }
    }

    /// self' * other without materializing the transpose.
    pub fn t_mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        let result = self.inner.transpose() * other.inner.as_ref();
        DenseMatrix { inner: result }
    }

    /// self * self'.
    pub fn gram_rows(&self) -> DenseMatrix {
        let result = self.inner.as_ref() * self.inner.transpose();
        DenseMatrix { inner: result }
    }

    pub fn transpose(&self) -> DenseMatrix {
        let inner = self.inner.transpose().to_owned();
        DenseMatrix { inner }
    }

    /// Extract column as a Vec<f64>.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Extract row as a Vec<f64>.
    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.inner.read(i, j)).collect()
    }

    /// Copy `block` into self with its top-left corner at (row0, col0).
    pub fn set_block(&mut self, row0: usize, col0: usize, block: &DenseMatrix) {
        assert!(row0 + block.nrows() <= self.nrows());
        assert!(col0 + block.ncols() <= self.ncols());
        for j in 0..block.ncols() {
            for i in 0..block.nrows() {
                self.inner.write(row0 + i, col0 + j, block.get(i, j));
            }
        }
    }

    /// Rows picked by index, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> DenseMatrix {
        let inner = Mat::from_fn(rows.len(), self.ncols(), |i, j| self.inner.read(rows[i], j));
        DenseMatrix { inner }
    }

    /// Columns picked by index, in the given order.
    pub fn select_cols(&self, cols: &[usize]) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), cols.len(), |i, j| self.inner.read(i, cols[j]));
        DenseMatrix { inner }
    }

    /// Contiguous column range [start, end).
    pub fn col_range(&self, start: usize, end: usize) -> DenseMatrix {
        assert!(start <= end && end <= self.ncols());
        let inner = Mat::from_fn(self.nrows(), end - start, |i, j| {
            self.inner.read(i, start + j)
        });
        DenseMatrix { inner }
    }

    /// Horizontal concatenation [self | other].
    pub fn hstack(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        let p = self.ncols();
        let inner = Mat::from_fn(self.nrows(), p + other.ncols(), |i, j| {
            if j < p {
                self.inner.read(i, j)
            } else {
                other.inner.read(i, j - p)
            }
        });
        DenseMatrix { inner }
    }

    /// Append a column filled with `value`.
    pub fn with_constant_col(&self, value: f64) -> DenseMatrix {
        self.hstack(&DenseMatrix::full(self.nrows(), 1, value))
    }

    /// Element-wise addition: self + other.
    pub fn add(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) + other.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Element-wise subtraction: self - other.
    pub fn sub(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) - other.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) * s
        });
        DenseMatrix { inner }
    }

    /// In-place scalar multiplication.
    pub fn scale_in_place(&mut self, s: f64) {
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j);
                self.inner.write(i, j, v * s);
            }
        }
    }

    /// Diagonal of a square matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.inner.read(i, i)).collect()
    }

    pub fn trace(&self) -> f64 {
        self.diag().iter().sum()
    }

    /// Sum of squares of every entry.
    pub fn sum_of_squares(&self) -> f64 {
        let mut sum = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j);
                sum += v * v;
            }
        }
        sum
    }

    /// Largest absolute difference between `self` and its transpose.
    pub fn asymmetry(&self) -> f64 {
        let n = self.nrows();
        let mut worst: f64 = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                worst = worst.max((self.inner.read(i, j) - self.inner.read(j, i)).abs());
            }
        }
        worst
    }

    /// Dot product of two slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// Flat copy in column-major order.
    pub fn to_col_major(&self) -> Vec<f64> {
        let mut data = Vec::with_capacity(self.nrows() * self.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                data.push(self.inner.read(i, j));
            }
        }
        data
    }

    /// True if any entry is NaN.
    pub fn has_nan(&self) -> bool {
        (0..self.ncols()).any(|j| (0..self.nrows()).any(|i| self.inner.read(i, j).is_nan()))
    }
}

impl std::fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                write!(f, "{:.6}", self.inner.read(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
