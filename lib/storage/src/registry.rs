// Model registry: which artifact version is current for a (model_id, stage).

use chrono::{DateTime, Utc};
use heed::{Database, Env, EnvOpenOptions};
use merlin_core::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use crate::location::ArtifactLocation;
use crate::manifest::{Metrics, ModelFormat, Stage};

const DB_MODELS: &str = "models";

/// One registry row, keyed by `(model_id, version)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    pub version: String,
    #[serde(default)]
    pub stage: Stage,
    pub location: String,
    pub format: ModelFormat,
    #[serde(default)]
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What the serving side needs to load a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub model_id: String,
    pub version: String,
    pub location: ArtifactLocation,
    pub format: ModelFormat,
}

impl ResolvedModel {
    /// Fails with `UnsupportedLocationScheme` for non-local locations
    pub fn from_record(record: &ModelRecord) -> Result<Self> {
        Ok(Self {
            model_id: record.model_id.clone(),
            version: record.version.clone(),
            location: ArtifactLocation::parse(&record.location)?,
            format: record.format,
        })
    }
}

/// Newest row wins; equal timestamps go to the greatest version string
fn pick_latest<'a, I>(rows: I) -> Option<ModelRecord>
where
    I: IntoIterator<Item = &'a ModelRecord>,
{
    rows.into_iter()
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.version.cmp(&b.version))
        })
        .cloned()
}

fn sort_rows(rows: &mut [ModelRecord]) {
    rows.sort_by(|a, b| {
        a.model_id
            .cmp(&b.model_id)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.version.cmp(&a.version))
    });
}

/// Backing table of the registry
pub trait RegistryStore: Send + Sync {
    /// Insert or replace the row for `(record.model_id, record.version)`
    fn upsert(&self, record: &ModelRecord) -> Result<()>;

    fn get(&self, model_id: &str, version: &str) -> Result<Option<ModelRecord>>;

    /// Row with the greatest `created_at` for `(model_id, stage)`
    fn latest(&self, model_id: &str, stage: Stage) -> Result<Option<ModelRecord>>;

    /// All rows, optionally restricted to one stage, newest first per model
    fn list(&self, stage: Option<Stage>) -> Result<Vec<ModelRecord>>;
}

/// Registry kept in process memory
#[derive(Default)]
pub struct InMemoryRegistry {
    rows: RwLock<BTreeMap<(String, String), ModelRecord>>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for InMemoryRegistry {
    fn upsert(&self, record: &ModelRecord) -> Result<()> {
        self.rows.write().insert(
            (record.model_id.clone(), record.version.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn get(&self, model_id: &str, version: &str) -> Result<Option<ModelRecord>> {
        Ok(self
            .rows
            .read()
            .get(&(model_id.to_string(), version.to_string()))
            .cloned())
    }

    fn latest(&self, model_id: &str, stage: Stage) -> Result<Option<ModelRecord>> {
        let rows = self.rows.read();
        Ok(pick_latest(
            rows.values()
                .filter(|r| r.model_id == model_id && r.stage == stage),
        ))
    }

    fn list(&self, stage: Option<Stage>) -> Result<Vec<ModelRecord>> {
        let mut rows: Vec<ModelRecord> = self
            .rows
            .read()
            .values()
            .filter(|r| stage.map_or(true, |s| r.stage == s))
            .cloned()
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }
}

fn heed_err(e: heed::Error) -> Error {
    Error::Storage(e.to_string())
}

fn row_key(model_id: &str, version: &str) -> String {
    format!("{}\0{}", model_id, version)
}

/// Registry persisted in LMDB, one JSON row per `model_id\0version` key
pub struct LmdbRegistry {
    env: Arc<Env>,
    models_db: Database<heed::types::Str, heed::types::Bytes>,
}

impl LmdbRegistry {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(unsafe {
            EnvOpenOptions::new()
                .map_size(256 * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
                .map_err(heed_err)?
        });

        let mut wtxn = env.write_txn().map_err(heed_err)?;
        let models_db = env
            .create_database(&mut wtxn, Some(DB_MODELS))
            .map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;

        tracing::info!(path = %path.as_ref().display(), "opened model registry");
        Ok(Self { env, models_db })
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<ModelRecord> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Serialization(format!("registry row {:?}: {}", key, e)))
    }

    fn scan<F>(&self, mut keep: F) -> Result<Vec<ModelRecord>>
    where
        F: FnMut(&ModelRecord) -> bool,
    {
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        let mut rows = Vec::new();
        for entry in self.models_db.iter(&rtxn).map_err(heed_err)? {
            let (key, bytes) = entry.map_err(heed_err)?;
            let record = Self::decode(key, bytes)?;
            if keep(&record) {
                rows.push(record);
            }
        }
        Ok(rows)
    }
}

impl RegistryStore for LmdbRegistry {
    fn upsert(&self, record: &ModelRecord) -> Result<()> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| Error::Serialization(e.to_string()))?;
        let key = row_key(&record.model_id, &record.version);
        let mut wtxn = self.env.write_txn().map_err(heed_err)?;
        self.models_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(heed_err)?;
        wtxn.commit().map_err(heed_err)?;
        Ok(())
    }

    fn get(&self, model_id: &str, version: &str) -> Result<Option<ModelRecord>> {
        let key = row_key(model_id, version);
        let rtxn = self.env.read_txn().map_err(heed_err)?;
        match self.models_db.get(&rtxn, &key).map_err(heed_err)? {
            Some(bytes) => Ok(Some(Self::decode(&key, bytes)?)),
            None => Ok(None),
        }
    }

    fn latest(&self, model_id: &str, stage: Stage) -> Result<Option<ModelRecord>> {
        let rows = self.scan(|r| r.model_id == model_id && r.stage == stage)?;
        Ok(pick_latest(&rows))
    }

    fn list(&self, stage: Option<Stage>) -> Result<Vec<ModelRecord>> {
        let mut rows = self.scan(|r| stage.map_or(true, |s| r.stage == s))?;
        sort_rows(&mut rows);
        Ok(rows)
    }
}

/// Read and write path over a [`RegistryStore`]
#[derive(Clone)]
pub struct RegistryClient {
    store: Arc<dyn RegistryStore>,
}

impl RegistryClient {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRegistry::new()))
    }

    pub fn open_lmdb<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(LmdbRegistry::open(path)?)))
    }

    /// Current version of `model_id` at `stage`
    pub fn resolve_latest(&self, model_id: &str, stage: Stage) -> Result<ResolvedModel> {
        let record = self
            .store
            .latest(model_id, stage)?
            .ok_or_else(|| Error::ModelNotFound {
                model_id: model_id.to_string(),
                stage: stage.to_string(),
            })?;
        tracing::debug!(model_id, version = %record.version, %stage, "resolved latest model");
        ResolvedModel::from_record(&record)
    }

    pub fn resolve_version(&self, model_id: &str, version: &str) -> Result<ResolvedModel> {
        let record = self
            .store
            .get(model_id, version)?
            .ok_or_else(|| Error::ModelNotFound {
                model_id: format!("{}@{}", model_id, version),
                stage: "any".to_string(),
            })?;
        ResolvedModel::from_record(&record)
    }

    pub fn publish(&self, record: &ModelRecord) -> Result<()> {
        self.store.upsert(record)?;
        tracing::info!(
            model_id = %record.model_id,
            version = %record.version,
            stage = %record.stage,
            location = %record.location,
            "published model"
        );
        Ok(())
    }

    pub fn record(&self, model_id: &str, version: &str) -> Result<Option<ModelRecord>> {
        self.store.get(model_id, version)
    }

    pub fn list(&self, stage: Option<Stage>) -> Result<Vec<ModelRecord>> {
        self.store.list(stage)
    }
}
