//! Model serialization and deserialization.
//!
//! Format: bincode of [`ModelFile`], which carries magic bytes (FLMD), a
//! version number and the model itself. Optional JSON sidecar for human
//! inspection.

use std::path::Path;

use anyhow::{bail, Context, Result};
use fastlmm_geno::phenotype::PhenoTable;
use serde::{Deserialize, Serialize};

use super::{
    FastLmmModel, LinearRegressionModel, ModelStats, Prediction, TestKernel, TrainedModel,
};

/// Any trained model, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedModel {
    FastLmm(FastLmmModel),
    LinearRegression(LinearRegressionModel),
}

impl SavedModel {
    fn inner(&self) -> &dyn TrainedModel {
        match self {
            SavedModel::FastLmm(m) => m,
            SavedModel::LinearRegression(m) => m,
        }
    }
}

impl TrainedModel for SavedModel {
    fn predict(&self, test_kernel: TestKernel, covar: Option<&PhenoTable>) -> Result<Prediction> {
        self.inner().predict(test_kernel, covar)
    }

    fn stats(&self) -> ModelStats {
        self.inner().stats()
    }

    fn pheno_name(&self) -> &str {
        self.inner().pheno_name()
    }
}

impl From<FastLmmModel> for SavedModel {
    fn from(m: FastLmmModel) -> Self {
        SavedModel::FastLmm(m)
    }
}

impl From<LinearRegressionModel> for SavedModel {
    fn from(m: LinearRegressionModel) -> Self {
        SavedModel::LinearRegression(m)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub magic: [u8; 4],
    pub version: u32,
    pub model: SavedModel,
}

impl ModelFile {
    pub const MAGIC: [u8; 4] = *b"FLMD";
    pub const VERSION: u32 = 1;
}

/// Save a model to a binary file.
pub fn save_model(model: &SavedModel, path: &Path) -> Result<()> {
    let file = ModelFile {
        magic: ModelFile::MAGIC,
        version: ModelFile::VERSION,
        model: model.clone(),
    };
    let encoded = bincode::serialize(&file)?;
    std::fs::write(path, &encoded)
        .with_context(|| format!("Failed to write model file: {}", path.display()))?;
    Ok(())
}

/// Load a model from a binary file.
pub fn load_model(path: &Path) -> Result<SavedModel> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    let file: ModelFile = bincode::deserialize(&data)
        .with_context(|| format!("Invalid model file: {}", path.display()))?;

    if file.magic != ModelFile::MAGIC {
        bail!(
            "Invalid model file: expected magic bytes {:?}, got {:?}",
            ModelFile::MAGIC,
            file.magic
        );
    }

    Ok(file.model)
}

/// Save a JSON sidecar for debugging (.model.json).
pub fn save_model_json(model: &SavedModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Summary of a model (for display).
pub fn model_summary(model: &SavedModel) -> String {
    let stats = model.stats();
    match model {
        SavedModel::FastLmm(m) => format!(
            "FastLMM model v{}\n\
             Phenotype: {}\n\
             Samples: {}\n\
             Covariates: {}\n\
             Kernel: {}\n\
             Eigenvalues: {}\n\
             h2: {:.6}\n\
             sigma2: {:.6}\n\
             r2: {:.4}",
            ModelFile::VERSION,
            m.pheno_name,
            m.train_ids.len(),
            m.covar_sids.len() - 1,
            match &m.snp_sids {
                Some(sids) => format!("{} SNPs", sids.len()),
                None => "precomputed".to_string(),
            },
            m.eigen_values.len(),
            m.h2,
            m.sigma2,
            stats.r2,
        ),
        SavedModel::LinearRegression(m) => format!(
            "Linear regression model v{}\n\
             Phenotype: {}\n\
             Samples: {}\n\
             Covariates: {}\n\
             sigma2: {:.6}\n\
             r2: {:.4}",
            ModelFile::VERSION,
            m.pheno_name,
            m.iid_count,
            m.covar_sids.len() - 1,
            stats.sigma2total,
            stats.r2,
        ),
    }
}
