//! PLINK bed/bim/fam reader using memory-mapped files, plus a writer.
//!
//! PLINK binary format consists of three files:
//! - .bed: Binary genotype data (2 bits per genotype, packed)
//! - .bim: Variant information (chrom, id, cm, pos, a1, a2)
//! - .fam: Sample information (fid, iid, father, mother, sex, pheno)
//!
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fastlmm_linalg::DenseMatrix;
use memmap2::Mmap;
use tracing::debug;

use crate::traits::{GenotypeReader, MarkerData, MarkerInfo};

const BED_MAGIC: [u8; 3] = [0x6C, 0x1B, 0x01];

/// PLINK BIM file entry (one per variant).
#[derive(Debug, Clone)]
pub struct BimEntry {
    pub chrom: String,
    pub id: String,
    pub cm: f64,
    pub pos: u64,
    pub allele1: String,
    pub allele2: String,
}

/// PLINK FAM file entry (one per sample).
#[derive(Debug, Clone)]
pub struct FamEntry {
    pub fid: String,
    pub iid: String,
}

/// Path of one member of a PLINK fileset: `prefix.ext`.
pub fn plink_path(prefix: &Path, ext: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Reader for PLINK bed/bim/fam files.
pub struct PlinkReader {
    mmap: Mmap,
    bim: Vec<BimEntry>,
    fam: Vec<FamEntry>,
    bytes_per_marker: usize,
    /// IIDs of the selected samples.
    sample_ids: Vec<String>,
    /// Indices of selected samples into the fam file (None = all samples).
    sample_subset: Option<Vec<usize>>,
    /// Count allele 1 (true) or allele 2 (false).
    count_a1: bool,
}

impl PlinkReader {
    /// Open `prefix.bed`, `prefix.bim` and `prefix.fam`, counting allele 1.
    pub fn new<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Self::with_count_a1(prefix, true)
    }

    /// Open a PLINK fileset, choosing which allele is counted.
    pub fn with_count_a1<P: AsRef<Path>>(prefix: P, count_a1: bool) -> Result<Self> {
        let prefix = prefix.as_ref();
        let bed_path = plink_path(prefix, "bed");
        let fam = Self::parse_fam(&plink_path(prefix, "fam"))?;
        let bim = Self::parse_bim(&plink_path(prefix, "bim"))?;

        let bed_file = std::fs::File::open(&bed_path)
            .with_context(|| format!("Failed to open bed file: {}", bed_path.display()))?;
        // SAFETY: the file is opened read-only and not modified while mapped.
        let mmap = unsafe { Mmap::map(&bed_file)? };

        if mmap.len() < 3 {
            bail!("Bed file too small");
        }
        if mmap[0] != BED_MAGIC[0] || mmap[1] != BED_MAGIC[1] {
            bail!("Invalid PLINK bed file magic number");
        }
        if mmap[2] != BED_MAGIC[2] {
            bail!("Only SNP-major bed files are supported (mode byte = 0x01)");
        }

        let bytes_per_marker = fam.len().div_ceil(4);
        let expected_size = 3 + bytes_per_marker * bim.len();
        if mmap.len() < expected_size {
            bail!(
                "Bed file too small: expected at least {} bytes, got {}",
                expected_size,
                mmap.len()
            );
        }

        debug!(
            "Opened {}: {} samples x {} markers",
            bed_path.display(),
            fam.len(),
            bim.len()
        );

        let sample_ids = fam.iter().map(|f| f.iid.clone()).collect();
        Ok(Self {
            mmap,
            bim,
            fam,
            bytes_per_marker,
            sample_ids,
            sample_subset: None,
            count_a1,
        })
    }

    fn parse_fam(path: &Path) -> Result<Vec<FamEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fam file: {}", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 6 {
                bail!("Fam file line {} has fewer than 6 fields", line_num + 1);
            }
            entries.push(FamEntry {
                fid: fields[0].to_string(),
                iid: fields[1].to_string(),
            });
        }
        Ok(entries)
    }

    fn parse_bim(path: &Path) -> Result<Vec<BimEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bim file: {}", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 6 {
                bail!("Bim file line {} has fewer than 6 fields", line_num + 1);
            }
            entries.push(BimEntry {
                chrom: fields[0].to_string(),
                id: fields[1].to_string(),
                cm: fields[2]
                    .parse()
                    .with_context(|| format!("Bad cM value on bim line {}", line_num + 1))?,
                pos: fields[3]
                    .parse()
                    .with_context(|| format!("Bad position on bim line {}", line_num + 1))?,
                allele1: fields[4].to_string(),
                allele2: fields[5].to_string(),
            });
        }
        Ok(entries)
    }

    /// Decode one 2-bit genotype as a count of allele 1.
    #[inline]
    fn decode_genotype(byte: u8, offset: usize) -> f64 {
        match (byte >> (offset * 2)) & 0x03 {
            0b00 => 2.0,
            0b01 => f64::NAN,
            0b10 => 1.0,
            _ => 0.0,
        }
    }

    fn read_marker_raw(&self, index: usize) -> Vec<f64> {
        let offset = 3 + index * self.bytes_per_marker;
        let decode = |sample_idx: usize| {
            let byte = self.mmap[offset + sample_idx / 4];
            let a1 = Self::decode_genotype(byte, sample_idx % 4);
            if self.count_a1 {
                a1
            } else {
                2.0 - a1
            }
        };
        match &self.sample_subset {
            Some(indices) => indices.iter().map(|&i| decode(i)).collect(),
            None => (0..self.fam.len()).map(decode).collect(),
        }
    }

    pub fn fam(&self) -> &[FamEntry] {
        &self.fam
    }

    pub fn bim(&self) -> &[BimEntry] {
        &self.bim
    }

    fn info_at(&self, index: usize) -> MarkerInfo {
        let bim = &self.bim[index];
        MarkerInfo {
            chrom: bim.chrom.clone(),
            id: bim.id.clone(),
            gen_dist: bim.cm,
            pos: bim.pos,
        }
    }
}

impl GenotypeReader for PlinkReader {
    fn n_markers(&self) -> usize {
        self.bim.len()
    }

    fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn set_sample_subset(&mut self, ids: &[String]) -> Result<()> {
        let lookup: HashMap<&str, usize> = self
            .fam
            .iter()
            .enumerate()
            .map(|(i, f)| (f.iid.as_str(), i))
            .collect();
        let mut indices = Vec::with_capacity(ids.len());
        let mut new_ids = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(&pos) = lookup.get(id.as_str()) {
                indices.push(pos);
                new_ids.push(id.clone());
            }
        }
        self.sample_subset = Some(indices);
        self.sample_ids = new_ids;
        Ok(())
    }

    fn read_marker(&mut self, index: u64) -> Result<MarkerData> {
        let index = index as usize;
        if index >= self.bim.len() {
            bail!("Marker index {} out of range ({})", index, self.bim.len());
        }
        let dosages = self.read_marker_raw(index);
        let (af, mac, n_valid) = MarkerData::compute_af(&dosages);
        Ok(MarkerData {
            info: self.info_at(index),
            dosages,
            af,
            mac,
            n_valid,
        })
    }

    fn marker_info(&self, index: u64) -> Result<MarkerInfo> {
        let index = index as usize;
        if index >= self.bim.len() {
            bail!("Marker index {} out of range ({})", index, self.bim.len());
        }
        Ok(self.info_at(index))
    }
}

/// Write an iid x sid dosage matrix as a PLINK fileset counting allele 1.
///
/// Dosages are rounded to 0/1/2; NaN is written as missing. FID is set to
/// the IID and the alleles to A/G.
pub fn write_plink<P: AsRef<Path>>(
    prefix: P,
    sample_ids: &[String],
    markers: &[MarkerInfo],
    dosages: &DenseMatrix,
) -> Result<()> {
    let prefix = prefix.as_ref();
    let n = sample_ids.len();
    if dosages.nrows() != n || dosages.ncols() != markers.len() {
        bail!(
            "Dosage matrix is {}x{}, expected {}x{}",
            dosages.nrows(),
            dosages.ncols(),
            n,
            markers.len()
        );
    }

    let mut fam = BufWriter::new(std::fs::File::create(plink_path(prefix, "fam"))?);
    for id in sample_ids {
        writeln!(fam, "{id} {id} 0 0 0 -9")?;
    }
    fam.flush()?;

    let mut bim = BufWriter::new(std::fs::File::create(plink_path(prefix, "bim"))?);
    for m in markers {
        writeln!(bim, "{}\t{}\t{}\t{}\tA\tG", m.chrom, m.id, m.gen_dist, m.pos)?;
    }
    bim.flush()?;

    let mut bed = BufWriter::new(std::fs::File::create(plink_path(prefix, "bed"))?);
    bed.write_all(&BED_MAGIC)?;
    let bytes_per_marker = n.div_ceil(4);
    for j in 0..markers.len() {
        let mut packed = vec![0u8; bytes_per_marker];
        for i in 0..n {
            let d = dosages.get(i, j);
            let code: u8 = if d.is_nan() {
                0b01
            } else {
                match d.round() as i64 {
                    2 => 0b00,
                    1 => 0b10,
                    0 => 0b11,
                    other => bail!("Dosage {} at ({}, {}) is not 0, 1 or 2", other, i, j),
                }
            };
            packed[i / 4] |= code << ((i % 4) * 2);
        }
        bed.write_all(&packed)?;
    }
    bed.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str, pos: u64) -> MarkerInfo {
        MarkerInfo {
            chrom: "1".into(),
            id: id.into(),
            gen_dist: 0.0,
            pos,
        }
    }

    #[test]
    fn test_decode_genotype_offsets() {
        let byte: u8 = 0b11_10_01_00;
        assert_eq!(PlinkReader::decode_genotype(byte, 0), 2.0);
        assert!(PlinkReader::decode_genotype(byte, 1).is_nan());
        assert_eq!(PlinkReader::decode_genotype(byte, 2), 1.0);
        assert_eq!(PlinkReader::decode_genotype(byte, 3), 0.0);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");
        let ids: Vec<String> = (0..5).map(|i| format!("id{i}")).collect();
        let g = DenseMatrix::from_row_major(
            5,
            2,
            &[0.0, 2.0, 1.0, f64::NAN, 2.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        );
        write_plink(&prefix, &ids, &[marker("rs1", 10), marker("rs2", 20)], &g).unwrap();

        let mut reader = PlinkReader::new(&prefix).unwrap();
        assert_eq!(reader.n_samples(), 5);
        assert_eq!(reader.n_markers(), 2);
        assert_eq!(reader.marker_info(1).unwrap().pos, 20);

        let m0 = reader.read_marker(0).unwrap();
        assert_eq!(m0.dosages, vec![0.0, 1.0, 2.0, 0.0, 1.0]);
        let m1 = reader.read_marker(1).unwrap();
        assert!(m1.dosages[1].is_nan());
        assert_eq!(m1.n_valid, 4);
    }

    #[test]
    fn test_count_a2_mirrors_counts() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");
        let ids: Vec<String> = (0..3).map(|i| format!("id{i}")).collect();
        let g = DenseMatrix::from_row_major(3, 1, &[0.0, 1.0, 2.0]);
        write_plink(&prefix, &ids, &[marker("rs1", 1)], &g).unwrap();

        let mut reader = PlinkReader::with_count_a1(&prefix, false).unwrap();
        assert_eq!(reader.read_marker(0).unwrap().dosages, vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sample_subset_reorders() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");
        let ids: Vec<String> = (0..4).map(|i| format!("id{i}")).collect();
        let g = DenseMatrix::from_row_major(4, 1, &[0.0, 1.0, 2.0, 1.0]);
        write_plink(&prefix, &ids, &[marker("rs1", 1)], &g).unwrap();

        let mut reader = PlinkReader::new(&prefix).unwrap();
        reader
            .set_sample_subset(&["id2".into(), "missing".into(), "id0".into()])
            .unwrap();
        assert_eq!(reader.sample_ids(), &["id2".to_string(), "id0".to_string()]);
        assert_eq!(reader.read_marker(0).unwrap().dosages, vec![2.0, 0.0]);

        let (block, infos) = reader.read_all().unwrap();
        assert_eq!(block.nrows(), 2);
        assert_eq!(infos[0].id, "rs1");
    }
}
