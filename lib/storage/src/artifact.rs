// Versioned model artifacts on the local filesystem.
//
// Layout: <base>/<model_id>/<version>/ with one file per block, written
// atomically, and manifest.json (checksums) written last.

use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use merlin_core::{AnnBackend, AnnIndex, CsrMatrix, Error, Matrix, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use crate::location::ArtifactLocation;
use crate::manifest::{ArtifactManifest, ManifestFile, Metrics, ModelFormat};

pub const ITEM_IDS_FILE: &str = "item_ids.json";
pub const SIMS_DATA_FILE: &str = "sims_data.bin";
pub const SIMS_INDICES_FILE: &str = "sims_indices.bin";
pub const SIMS_INDPTR_FILE: &str = "sims_indptr.bin";
pub const SIMS_SHAPE_FILE: &str = "sims_shape.json";
pub const DENSE_SIMS_FILE: &str = "similarity.bin.gz";
pub const USER_FACTORS_FILE: &str = "user_factors.bin";
pub const ITEM_FACTORS_FILE: &str = "item_factors.bin";
pub const MAPPINGS_FILE: &str = "mappings.json";
pub const ANN_INDEX_FILE: &str = "items.index";
pub const METRICS_FILE: &str = "training_metrics.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Contents of one artifact version
#[derive(Debug, Clone)]
pub enum ArtifactPayload {
    /// Full N×N similarity block; position in `item_ids` is the row
    Dense { item_ids: Vec<String>, sims: Matrix },
    /// Top-K neighbor graph; position in `item_ids` is the row
    Sparse { item_ids: Vec<String>, graph: CsrMatrix },
    /// Latent factors, `(identifier, row)` tables and the ANN over item rows
    Factors {
        user_factors: Matrix,
        item_factors: Matrix,
        user_to_index: Vec<(String, i64)>,
        item_to_index: Vec<(String, i64)>,
        ann: AnnBackend,
    },
}

impl ArtifactPayload {
    #[must_use]
    pub fn format(&self) -> ModelFormat {
        match self {
            ArtifactPayload::Dense { .. } => ModelFormat::DenseMatrix,
            ArtifactPayload::Sparse { .. } => ModelFormat::SparseTriplet,
            ArtifactPayload::Factors { .. } => ModelFormat::FactorsAnn,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ShapeRecord {
    shape: [usize; 2],
}

#[derive(Serialize, Deserialize)]
struct Mappings {
    user_to_index: Vec<(String, i64)>,
    item_to_index: Vec<(String, i64)>,
}

fn bincode_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn gzip_bytes(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// File-addressed persistence of trained models
pub struct ArtifactStore {
    base_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Open the store named by a base URI such as `file:///models/`
    pub fn from_uri(base_uri: &str) -> Result<Self> {
        let location = ArtifactLocation::parse(base_uri)?;
        Self::new(location.path())
    }

    #[inline]
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn version_dir(&self, model_id: &str, version: &str) -> PathBuf {
        self.base_dir.join(model_id).join(version)
    }

    /// True once a version has been completely written
    #[must_use]
    pub fn exists(&self, model_id: &str, version: &str) -> bool {
        self.version_dir(model_id, version).join(MANIFEST_FILE).exists()
    }

    /// Persist a new artifact version and return its location.
    ///
    /// Versions are write-once: a directory that already has a manifest is
    /// refused. Each block is written atomically and the manifest goes last,
    /// so a crash mid-write leaves a directory without a manifest that a
    /// retry may overwrite.
    pub fn write(
        &self,
        model_id: &str,
        version: &str,
        payload: &ArtifactPayload,
        metrics: &Metrics,
    ) -> Result<ArtifactLocation> {
        if self.exists(model_id, version) {
            return Err(Error::ArtifactExists(format!("{}/{}", model_id, version)));
        }
        let dir = self.version_dir(model_id, version);
        fs::create_dir_all(&dir)?;

        let mut blocks: Vec<(&str, Vec<u8>)> = Vec::new();
        match payload {
            ArtifactPayload::Dense { item_ids, sims } => {
                if sims.rows() != item_ids.len() || sims.cols() != item_ids.len() {
                    return Err(Error::shape("dense similarity side", item_ids.len(), sims.rows()));
                }
                blocks.push((ITEM_IDS_FILE, json_bytes(item_ids)?));
                blocks.push((DENSE_SIMS_FILE, gzip_bytes(&bincode_bytes(sims)?)?));
            }
            ArtifactPayload::Sparse { item_ids, graph } => {
                if graph.n_rows() != item_ids.len() {
                    return Err(Error::shape("similarity graph rows", item_ids.len(), graph.n_rows()));
                }
                let indptr: Vec<u64> = graph.indptr().iter().map(|&o| o as u64).collect();
                blocks.push((ITEM_IDS_FILE, json_bytes(item_ids)?));
                blocks.push((SIMS_DATA_FILE, bincode_bytes(&graph.data())?));
                blocks.push((SIMS_INDICES_FILE, bincode_bytes(&graph.indices())?));
                blocks.push((SIMS_INDPTR_FILE, bincode_bytes(&indptr)?));
                blocks.push((
                    SIMS_SHAPE_FILE,
                    json_bytes(&ShapeRecord {
                        shape: [graph.n_rows(), graph.n_cols()],
                    })?,
                ));
            }
            ArtifactPayload::Factors {
                user_factors,
                item_factors,
                user_to_index,
                item_to_index,
                ann,
            } => {
                if ann.len() != item_factors.rows() {
                    return Err(Error::shape("ann rows", item_factors.rows(), ann.len()));
                }
                blocks.push((USER_FACTORS_FILE, bincode_bytes(user_factors)?));
                blocks.push((ITEM_FACTORS_FILE, bincode_bytes(item_factors)?));
                blocks.push((
                    MAPPINGS_FILE,
                    json_bytes(&Mappings {
                        user_to_index: user_to_index.clone(),
                        item_to_index: item_to_index.clone(),
                    })?,
                ));
                blocks.push((ANN_INDEX_FILE, bincode_bytes(ann)?));
            }
        }
        blocks.push((METRICS_FILE, json_bytes(metrics)?));

        let mut files = Vec::with_capacity(blocks.len());
        for (name, bytes) in &blocks {
            write_atomic(&dir.join(name), bytes)?;
            files.push(ManifestFile {
                name: name.to_string(),
                size: bytes.len() as u64,
                sha256: sha256_hex(bytes),
            });
        }

        let manifest = ArtifactManifest {
            model_id: model_id.to_string(),
            version: version.to_string(),
            format: payload.format(),
            created_at: Utc::now(),
            files,
            metrics: metrics.clone(),
        };
        write_atomic(&dir.join(MANIFEST_FILE), &json_bytes(&manifest)?)?;

        tracing::info!(
            model_id,
            version,
            format = %payload.format(),
            dir = %dir.display(),
            "wrote artifact"
        );
        Ok(ArtifactLocation::local(dir))
    }

    /// Read the manifest of a version, if one was written
    pub fn read_manifest(&self, location: &ArtifactLocation) -> Result<Option<ArtifactManifest>> {
        let path = location.path().join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(manifest))
    }

    pub fn read_metrics(&self, location: &ArtifactLocation) -> Result<Metrics> {
        let reader = BlockReader::open(self, location)?;
        reader.json(METRICS_FILE)
    }

    /// Load and validate the payload at `location`, which must be in `format`
    pub fn read(&self, location: &ArtifactLocation, format: ModelFormat) -> Result<ArtifactPayload> {
        let reader = BlockReader::open(self, location)?;
        if let Some(manifest) = &reader.manifest {
            if manifest.format != format {
                return Err(Error::FormatMismatch {
                    expected: format.to_string(),
                    actual: manifest.format.to_string(),
                });
            }
        }

        let payload = match format {
            ModelFormat::DenseMatrix => {
                let item_ids: Vec<String> = reader.json(ITEM_IDS_FILE)?;
                let sims: Matrix = reader.bincode_gz(DENSE_SIMS_FILE)?;
                if sims.rows() != sims.cols() {
                    return Err(Error::shape("dense similarity columns", sims.rows(), sims.cols()));
                }
                if sims.rows() != item_ids.len() {
                    return Err(Error::shape("dense similarity rows", item_ids.len(), sims.rows()));
                }
                ArtifactPayload::Dense { item_ids, sims }
            }
            ModelFormat::SparseTriplet => {
                let item_ids: Vec<String> = reader.json(ITEM_IDS_FILE)?;
                let data: Vec<f32> = reader.bincode(SIMS_DATA_FILE)?;
                let indices: Vec<u32> = reader.bincode(SIMS_INDICES_FILE)?;
                let indptr: Vec<u64> = reader.bincode(SIMS_INDPTR_FILE)?;
                let ShapeRecord { shape: [rows, cols] } = reader.json(SIMS_SHAPE_FILE)?;
                if rows != cols {
                    return Err(Error::shape("similarity graph columns", rows, cols));
                }
                if rows != item_ids.len() {
                    return Err(Error::shape("similarity graph rows", item_ids.len(), rows));
                }
                let indptr = indptr.into_iter().map(|o| o as usize).collect();
                let graph = CsrMatrix::from_parts(rows, cols, indptr, indices, data)?;
                ArtifactPayload::Sparse { item_ids, graph }
            }
            ModelFormat::FactorsAnn => {
                let user_factors: Matrix = reader.bincode(USER_FACTORS_FILE)?;
                let item_factors: Matrix = reader.bincode(ITEM_FACTORS_FILE)?;
                let mappings: Mappings = reader.json(MAPPINGS_FILE)?;
                let ann: AnnBackend = reader.bincode(ANN_INDEX_FILE)?;
                check_factor_blocks(&user_factors, &item_factors, &ann)?;
                ArtifactPayload::Factors {
                    user_factors,
                    item_factors,
                    user_to_index: mappings.user_to_index,
                    item_to_index: mappings.item_to_index,
                    ann,
                }
            }
        };

        tracing::debug!(location = %location, format = %format, "read artifact");
        Ok(payload)
    }
}

/// Factor blocks share one width and the ANN indexes exactly the item rows
fn check_factor_blocks(user_factors: &Matrix, item_factors: &Matrix, ann: &AnnBackend) -> Result<()> {
    if user_factors.rows() > 0 && item_factors.rows() > 0 && user_factors.cols() != item_factors.cols() {
        return Err(Error::corrupt(format!(
            "factor widths differ: users {}, items {}",
            user_factors.cols(),
            item_factors.cols()
        )));
    }
    if ann.len() != item_factors.rows() {
        return Err(Error::corrupt(format!(
            "ann holds {} rows, item factors {}",
            ann.len(),
            item_factors.rows()
        )));
    }
    if !ann.is_empty() && ann.dim() != item_factors.cols() {
        return Err(Error::corrupt(format!(
            "ann dimension {} != item factor width {}",
            ann.dim(),
            item_factors.cols()
        )));
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))
}

/// Reads the blocks of one version, verifying checksums listed in the manifest
struct BlockReader {
    dir: PathBuf,
    manifest: Option<ArtifactManifest>,
    checksums: HashMap<String, String>,
}

impl BlockReader {
    fn open(store: &ArtifactStore, location: &ArtifactLocation) -> Result<Self> {
        let manifest = store.read_manifest(location)?;
        let checksums = manifest
            .as_ref()
            .map(|m| {
                m.files
                    .iter()
                    .map(|f| (f.name.clone(), f.sha256.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            dir: location.path().to_path_buf(),
            manifest,
            checksums,
        })
    }

    fn raw(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        let bytes = fs::read(&path)
            .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?;
        if let Some(expected) = self.checksums.get(name) {
            let actual = sha256_hex(&bytes);
            if &actual != expected {
                return Err(Error::corrupt(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    name, expected, actual
                )));
            }
        }
        Ok(bytes)
    }

    fn json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        serde_json::from_slice(&self.raw(name)?)
            .map_err(|e| Error::corrupt(format!("{}: {}", name, e)))
    }

    fn bincode<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        bincode::deserialize(&self.raw(name)?)
            .map_err(|e| Error::corrupt(format!("{}: {}", name, e)))
    }

    fn bincode_gz<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let compressed = self.raw(name)?;
        let mut raw = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut raw)?;
        bincode::deserialize(&raw).map_err(|e| Error::corrupt(format!("{}: {}", name, e)))
    }
}
