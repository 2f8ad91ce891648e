//! Sample ID intersection.
//!
//! Every input to a mixed-model analysis (SNPs, phenotype, covariates,
//! kernel or eigen data) carries its own list of IIDs. Analyses run on
//! the individuals present in all of them, in the order of the first.

use std::collections::HashMap;

use fastlmm_linalg::DenseMatrix;

/// IIDs present in every source, with where each one sits in each source.
#[derive(Debug, Clone)]
pub struct SampleIntersection {
    /// Shared IIDs in the order of the first source.
    pub ids: Vec<String>,
    /// `indices[s][k]` is the row of `ids[k]` in source `s`.
    pub indices: Vec<Vec<usize>>,
}

impl SampleIntersection {
    /// True when source `s` already lists exactly the shared IIDs in order.
    pub fn is_identity(&self, s: usize, source_len: usize) -> bool {
        self.indices[s].len() == source_len
            && self.indices[s].iter().enumerate().all(|(k, &i)| k == i)
    }
}

/// Intersect IIDs from several sources, keeping the first source's order.
pub fn intersect_samples(sources: &[&[String]]) -> SampleIntersection {
    let Some((primary, rest)) = sources.split_first() else {
        return SampleIntersection {
            ids: Vec::new(),
            indices: Vec::new(),
        };
    };

    let maps: Vec<HashMap<&str, usize>> = rest
        .iter()
        .map(|ids| {
            ids.iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect()
        })
        .collect();

    let mut ids = Vec::new();
    let mut indices: Vec<Vec<usize>> = vec![Vec::new(); sources.len()];

    for (primary_idx, id) in primary.iter().enumerate() {
        let hits: Option<Vec<usize>> = maps.iter().map(|m| m.get(id.as_str()).copied()).collect();
        if let Some(hits) = hits {
            ids.push(id.clone());
            indices[0].push(primary_idx);
            for (s, hit) in hits.into_iter().enumerate() {
                indices[s + 1].push(hit);
            }
        }
    }

    SampleIntersection { ids, indices }
}

/// Rows of `data` picked by `indices`, in that order.
pub fn reorder_rows(data: &DenseMatrix, indices: &[usize]) -> DenseMatrix {
    data.select_rows(indices)
}

/// Reorder f64 values according to the given index mapping.
pub fn reorder_f64(data: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| data[i]).collect()
}
