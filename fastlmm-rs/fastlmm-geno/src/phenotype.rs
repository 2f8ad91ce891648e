//! Phenotype and covariate file parser.
//!
//! Reads whitespace-delimited `FID IID v1 v2 ...` files. A header line is
//! recognised when its first token is `FID`; otherwise the value columns are
//! named `pheno0`, `pheno1`, ...

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use fastlmm_linalg::DenseMatrix;

/// Table of per-sample values: phenotypes or covariates.
#[derive(Debug, Clone)]
pub struct PhenoTable {
    /// IIDs in file order.
    pub sample_ids: Vec<String>,
    /// Column names.
    pub names: Vec<String>,
    /// iid x column values, NaN for missing.
    pub values: DenseMatrix,
}

impl PhenoTable {
    pub fn new(sample_ids: Vec<String>, names: Vec<String>, values: DenseMatrix) -> Result<Self> {
        if values.nrows() != sample_ids.len() || values.ncols() != names.len() {
            bail!(
                "Value matrix is {}x{} but table has {} samples and {} columns",
                values.nrows(),
                values.ncols(),
                sample_ids.len(),
                names.len()
            );
        }
        Ok(Self {
            sample_ids,
            names,
            values,
        })
    }

    /// A table with no columns over the given samples.
    pub fn empty(sample_ids: &[String]) -> Self {
        Self {
            sample_ids: sample_ids.to_vec(),
            names: Vec::new(),
            values: DenseMatrix::zeros(sample_ids.len(), 0),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// Keep only the named column.
    pub fn select(&self, name: &str) -> Result<PhenoTable> {
        let j = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| anyhow!("Column '{}' not found (have: {})", name, self.names.join(", ")))?;
        Ok(PhenoTable {
            sample_ids: self.sample_ids.clone(),
            names: vec![self.names[j].clone()],
            values: self.values.select_cols(&[j]),
        })
    }

    /// Keep rows by index, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> PhenoTable {
        PhenoTable {
            sample_ids: rows.iter().map(|&i| self.sample_ids[i].clone()).collect(),
            names: self.names.clone(),
            values: self.values.select_rows(rows),
        }
    }

    /// Keep the rows whose IID is listed, in the order of `ids`.
    pub fn subset(&self, ids: &[String]) -> Result<PhenoTable> {
        let lookup: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let rows = ids
            .iter()
            .map(|id| {
                lookup
                    .get(id.as_str())
                    .copied()
                    .ok_or_else(|| anyhow!("Sample '{}' not in table", id))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.take_rows(&rows))
    }
}

/// Parse a value, treating the usual missing markers as NaN.
fn parse_value(s: &str) -> Result<f64> {
    match s {
        "-9" | "NA" | "na" | "Na" | "." | "NaN" | "nan" => Ok(f64::NAN),
        _ => s
            .parse::<f64>()
            .with_context(|| format!("Cannot parse '{}' as a number", s)),
    }
}

/// Read a phenotype/covariate file.
pub fn read_pheno(path: &Path) -> Result<PhenoTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read phenotype file: {}", path.display()))?;

    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .peekable();

    let mut names: Option<Vec<String>> = None;
    if let Some((_, first)) = lines.peek() {
        let fields: Vec<&str> = first.split_whitespace().collect();
        if fields.first().is_some_and(|f| f.eq_ignore_ascii_case("FID")) {
            if fields.len() < 2 {
                bail!("Header of {} has no IID column", path.display());
            }
            names = Some(fields[2..].iter().map(|s| s.to_string()).collect());
            lines.next();
        }
    }

    let mut sample_ids = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut width: Option<usize> = names.as_ref().map(|n| n.len());

    for (line_num, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            bail!("Line {} of {} has fewer than 2 fields", line_num + 1, path.display());
        }
        let values = fields[2..]
            .iter()
            .map(|f| parse_value(f))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Line {} of {}", line_num + 1, path.display()))?;
        match width {
            Some(w) if w != values.len() => bail!(
                "Line {} of {} has {} values, expected {}",
                line_num + 1,
                path.display(),
                values.len(),
                w
            ),
            None => width = Some(values.len()),
            _ => {}
        }
        sample_ids.push(fields[1].to_string());
        rows.push(values);
    }

    let k = width.unwrap_or(0);
    let names = names.unwrap_or_else(|| (0..k).map(|j| format!("pheno{j}")).collect());
    let n = sample_ids.len();
    let mut flat = Vec::with_capacity(n * k);
    for row in &rows {
        flat.extend_from_slice(row);
    }
    PhenoTable::new(sample_ids, names, DenseMatrix::from_row_major(n, k, &flat))
}

/// Write a table in `FID IID ...` form with a header line.
pub fn write_pheno(path: &Path, table: &PhenoTable) -> Result<()> {
    use std::io::Write;
    let mut f = std::io::BufWriter::new(
        std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?,
    );
    write!(f, "FID\tIID")?;
    for name in &table.names {
        write!(f, "\t{name}")?;
    }
    writeln!(f)?;
    for (i, id) in table.sample_ids.iter().enumerate() {
        write!(f, "{id}\t{id}")?;
        for j in 0..table.n_cols() {
            let v = table.values.get(i, j);
            if v.is_nan() {
                write!(f, "\tNA")?;
            } else {
                write!(f, "\t{v}")?;
            }
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}
