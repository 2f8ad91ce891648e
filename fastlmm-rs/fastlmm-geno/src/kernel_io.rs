//! Kernel (similarity matrix) text files.
//!
//! Format: a header line `var` followed by the IIDs, then one line per
//! IID holding that row of the matrix:
//! ```text
//! var  S1   S2   S3
//! S1   1.0  0.2  0.0
//! S2   0.2  1.0  0.1
//! S3   0.0  0.1  1.0
//! ```
//! Rows may appear in any order; they are rearranged to match the header.
//!
//! Cross kernels (train x test) use the same layout with the test IIDs in
//! the header and one line per train IID.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fastlmm_linalg::DenseMatrix;

/// Read a kernel file. Returns (matrix, iids) with rows and columns in
/// header order.
pub fn read_kernel(path: &Path) -> Result<(DenseMatrix, Vec<String>)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read kernel file: {}", path.display()))?;
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty kernel file: {}", path.display()))?;
    let mut fields = header.split_whitespace();
    if fields.next() != Some("var") {
        bail!("Kernel file {} must start with 'var'", path.display());
    }
    let ids: Vec<String> = fields.map(String::from).collect();
    let n = ids.len();
    let col_of: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

    let mut matrix = DenseMatrix::zeros(n, n);
    let mut seen = vec![false; n];
    for (line_num, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != n + 1 {
            bail!(
                "Kernel line {} has {} values, expected {}",
                line_num + 2,
                fields.len().saturating_sub(1),
                n
            );
        }
        let row = *col_of
            .get(fields[0])
            .ok_or_else(|| anyhow::anyhow!("Row IID '{}' not in kernel header", fields[0]))?;
        if seen[row] {
            bail!("Duplicate kernel row for '{}'", fields[0]);
        }
        seen[row] = true;
        for (j, f) in fields[1..].iter().enumerate() {
            let v: f64 = f
                .parse()
                .with_context(|| format!("Bad kernel value '{}' on line {}", f, line_num + 2))?;
            matrix.set(row, j, v);
        }
    }

    if let Some(missing) = seen.iter().position(|s| !s) {
        bail!("Kernel file has no row for '{}'", ids[missing]);
    }
    let scale = matrix.diag().iter().fold(1.0f64, |m, d| m.max(d.abs()));
    let asymmetry = matrix.asymmetry();
    if asymmetry > SYMMETRY_TOL * scale {
        bail!(
            "Kernel in {} is not symmetric (max |K - K'| = {:.2e})",
            path.display(),
            asymmetry
        );
    }
    Ok((matrix, ids))
}

const SYMMETRY_TOL: f64 = 1e-6;

/// Read a cross kernel. Returns (matrix, row_ids, col_ids) with rows in
/// file order and columns in header order.
pub fn read_cross_kernel(path: &Path) -> Result<(DenseMatrix, Vec<String>, Vec<String>)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read kernel file: {}", path.display()))?;
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty kernel file: {}", path.display()))?;
    let mut fields = header.split_whitespace();
    if fields.next() != Some("var") {
        bail!("Kernel file {} must start with 'var'", path.display());
    }
    let col_ids: Vec<String> = fields.map(String::from).collect();
    let m = col_ids.len();

    let mut row_ids = Vec::new();
    let mut values = Vec::new();
    for (line_num, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != m + 1 {
            bail!(
                "Kernel line {} has {} values, expected {}",
                line_num + 2,
                fields.len().saturating_sub(1),
                m
            );
        }
        row_ids.push(fields[0].to_string());
        for f in &fields[1..] {
            let v: f64 = f
                .parse()
                .with_context(|| format!("Bad kernel value '{}' on line {}", f, line_num + 2))?;
            values.push(v);
        }
    }
    let matrix = DenseMatrix::from_row_major(row_ids.len(), m, &values);
    Ok((matrix, row_ids, col_ids))
}

/// Write a square kernel with its IIDs.
pub fn write_kernel(path: &Path, matrix: &DenseMatrix, ids: &[String]) -> Result<()> {
    write_cross_kernel(path, matrix, ids, ids)
}

/// Write a row_ids x col_ids kernel.
pub fn write_cross_kernel(
    path: &Path,
    matrix: &DenseMatrix,
    row_ids: &[String],
    col_ids: &[String],
) -> Result<()> {
    if matrix.nrows() != row_ids.len() || matrix.ncols() != col_ids.len() {
        bail!(
            "Kernel is {}x{} but {}x{} IIDs were given",
            matrix.nrows(),
            matrix.ncols(),
            row_ids.len(),
            col_ids.len()
        );
    }
    let mut f = std::io::BufWriter::new(
        std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?,
    );
    write!(f, "var")?;
    for id in col_ids {
        write!(f, "\t{id}")?;
    }
    writeln!(f)?;
    for (i, id) in row_ids.iter().enumerate() {
        write!(f, "{id}")?;
        for j in 0..col_ids.len() {
            write!(f, "\t{:.12e}", matrix.get(i, j))?;
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_rows_out_of_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.txt");
        std::fs::write(&path, "var S1 S2\nS2 0.5 2.0\nS1 1.0 0.5\n").unwrap();
        let (k, ids) = read_kernel(&path).unwrap();
        assert_eq!(ids, vec!["S1", "S2"]);
        assert_eq!(k.get(0, 0), 1.0);
        assert_eq!(k.get(1, 1), 2.0);
        assert_eq!(k.get(0, 1), 0.5);
    }

    #[test]
    fn test_missing_row_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.txt");
        std::fs::write(&path, "var S1 S2\nS1 1.0 0.5\n").unwrap();
        assert!(read_kernel(&path).is_err());
    }

    #[test]
    fn test_asymmetric_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.txt");
        std::fs::write(&path, "var S1 S2\nS1 1.0 0.5\nS2 0.1 1.0\n").unwrap();
        assert!(read_kernel(&path).is_err());
    }

    #[test]
    fn test_cross_kernel_keeps_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kx.txt");
        let k = DenseMatrix::from_row_major(3, 2, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let rows: Vec<String> = ["t3", "t1", "t2"].iter().map(|s| s.to_string()).collect();
        let cols: Vec<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
        write_cross_kernel(&path, &k, &rows, &cols).unwrap();
        let (back, back_rows, back_cols) = read_cross_kernel(&path).unwrap();
        assert_eq!(back_rows, rows);
        assert_eq!(back_cols, cols);
        assert_eq!(back.nrows(), 3);
        assert!((back.get(2, 1) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.txt");
        let k = DenseMatrix::from_row_major(2, 2, &[1.25, -0.125, -0.125, 0.75]);
        let ids = vec!["a".to_string(), "b".to_string()];
        write_kernel(&path, &k, &ids).unwrap();
        let (back, back_ids) = read_kernel(&path).unwrap();
        assert_eq!(back_ids, ids);
        assert!((back.get(0, 1) + 0.125).abs() < 1e-12);
        assert!((back.get(1, 1) - 0.75).abs() < 1e-12);
    }
}
