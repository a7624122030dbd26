use chrono::{DateTime, Utc};
use merlin_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Free-form training metrics (`avg_sim`, `n_items`, hyperparameters, ...)
pub type Metrics = BTreeMap<String, f64>;

/// Deployment stage of a registered model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Staging => "staging",
            Stage::Prod => "prod",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(Stage::Dev),
            "staging" => Ok(Stage::Staging),
            "prod" => Ok(Stage::Prod),
            other => Err(Error::InvalidConfig(format!("unknown stage: {}", other))),
        }
    }
}

/// On-disk layout of an artifact version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFormat {
    #[serde(rename = "dense-matrix", alias = "npz_dense")]
    DenseMatrix,
    #[serde(rename = "sparse-triplet", alias = "sparse_triplet")]
    SparseTriplet,
    #[serde(rename = "factors+ann", alias = "npz+faiss")]
    FactorsAnn,
}

impl ModelFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::DenseMatrix => "dense-matrix",
            ModelFormat::SparseTriplet => "sparse-triplet",
            ModelFormat::FactorsAnn => "factors+ann",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dense-matrix" | "npz_dense" => Ok(ModelFormat::DenseMatrix),
            "sparse-triplet" | "sparse_triplet" => Ok(ModelFormat::SparseTriplet),
            "factors+ann" | "npz+faiss" => Ok(ModelFormat::FactorsAnn),
            other => Err(Error::InvalidConfig(format!("unknown model format: {}", other))),
        }
    }
}

/// One file of an artifact version and its SHA-256
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

/// `manifest.json`, written last when an artifact version is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub model_id: String,
    pub version: String,
    pub format: ModelFormat,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub metrics: Metrics,
}
