//! Core traits for genotype reading.

use anyhow::{bail, Result};
use fastlmm_linalg::DenseMatrix;

/// Information about a genetic marker (SNP).
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInfo {
    /// Chromosome (e.g. "1", "22", "X").
    pub chrom: String,
    /// Marker ID (sid), e.g. an rsID.
    pub id: String,
    /// Genetic distance in centimorgans.
    pub gen_dist: f64,
    /// Position in base pairs.
    pub pos: u64,
}

/// Data for a single marker across all selected samples.
#[derive(Debug, Clone)]
pub struct MarkerData {
    pub info: MarkerInfo,
    /// Allele counts for each sample (0.0 to 2.0). Missing values are NaN.
    pub dosages: Vec<f64>,
    /// Frequency of the counted allele.
    pub af: f64,
    /// Minor allele count.
    pub mac: f64,
    /// Number of non-missing samples.
    pub n_valid: usize,
}

impl MarkerData {
    /// Compute allele frequency, minor allele count and non-missing count.
    pub fn compute_af(dosages: &[f64]) -> (f64, f64, usize) {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &d in dosages {
            if !d.is_nan() {
                sum += d;
                n += 1;
            }
        }
        let af = if n > 0 { sum / (2.0 * n as f64) } else { 0.0 };
        let mac = sum.min(2.0 * n as f64 - sum);
        (af, mac, n)
    }
}

/// Trait for reading SNP data.
///
/// Static dispatch in library code; `Box<dyn GenotypeReader>` at the CLI.
pub trait GenotypeReader: Send {
    /// Total number of markers in the file.
    fn n_markers(&self) -> usize;

    /// Number of samples currently selected.
    fn n_samples(&self) -> usize;

    /// IIDs of the currently selected samples, in read order.
    fn sample_ids(&self) -> &[String];

    /// Restrict and reorder subsequent reads to these IIDs. Unknown IDs are
    /// ignored.
    fn set_sample_subset(&mut self, ids: &[String]) -> Result<()>;

    /// Read data for the marker at `index`.
    fn read_marker(&mut self, index: u64) -> Result<MarkerData>;

    /// Marker metadata without reading genotypes.
    fn marker_info(&self, index: u64) -> Result<MarkerInfo>;

    /// Read markers [start, end) as an iid x sid matrix.
    fn read_block(&mut self, start: usize, end: usize) -> Result<(DenseMatrix, Vec<MarkerInfo>)> {
        if start > end || end > self.n_markers() {
            bail!(
                "Marker range {}..{} out of bounds ({} markers)",
                start,
                end,
                self.n_markers()
            );
        }
        let mut columns = Vec::with_capacity(end - start);
        let mut infos = Vec::with_capacity(end - start);
        for index in start..end {
            let data = self.read_marker(index as u64)?;
            columns.push(data.dosages);
            infos.push(data.info);
        }
        Ok((DenseMatrix::from_columns(self.n_samples(), &columns), infos))
    }

    /// Read every marker.
    fn read_all(&mut self) -> Result<(DenseMatrix, Vec<MarkerInfo>)> {
        let m = self.n_markers();
        self.read_block(0, m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_af_skips_missing() {
        let (af, mac, n) = MarkerData::compute_af(&[0.0, 1.0, f64::NAN, 2.0]);
        assert_eq!(n, 3);
        assert!((af - 0.5).abs() < 1e-12);
        assert!((mac - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_compute_af_minor_allele() {
        let (af, mac, _) = MarkerData::compute_af(&[2.0, 2.0, 1.0]);
        assert!((af - 5.0 / 6.0).abs() < 1e-12);
        assert!((mac - 1.0).abs() < 1e-12);
    }
}
