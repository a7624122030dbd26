use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::Matrix;

/// Row value an index reports when it has nothing to put in a result slot
pub const NO_MATCH: i64 = -1;

/// One ANN result: a row of the indexed matrix and its inner product with
/// the query. `row` is [`NO_MATCH`] for padding slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnHit {
    pub row: i64,
    pub score: f32,
}

/// Nearest-neighbor search by inner product over row-aligned vectors.
///
/// Implementations must be safe to search from many threads at once.
pub trait AnnIndex: Send + Sync {
    fn dim(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` hits ordered by descending score. Callers must tolerate
    /// [`NO_MATCH`] rows and shorter results.
    fn search(&self, query: &[f32], k: usize) -> Vec<AnnHit>;
}

/// Exact inner-product scan. Always answers with exactly `k` slots, padding
/// with [`NO_MATCH`] when `k` exceeds the number of rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIpIndex {
    vectors: Matrix,
}

impl FlatIpIndex {
    #[must_use]
    pub fn new(vectors: Matrix) -> Self {
        Self { vectors }
    }
}

impl AnnIndex for FlatIpIndex {
    fn dim(&self) -> usize {
        self.vectors.cols()
    }

    fn len(&self) -> usize {
        self.vectors.rows()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<AnnHit> {
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..self.vectors.rows())
            .map(|r| (r, crate::simd::dot_product_simd(query, self.vectors.row(r))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        let mut hits: Vec<AnnHit> = scored
            .into_iter()
            .map(|(r, s)| AnnHit {
                row: r as i64,
                score: s,
            })
            .collect();
        hits.resize(
            k,
            AnnHit {
                row: NO_MATCH,
                score: f32::NEG_INFINITY,
            },
        );
        hits
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnKind {
    #[default]
    Flat,
    Hnsw,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    pub kind: AnnKind,
    pub hnsw: HnswConfig,
}

/// Serializable choice of ANN structure stored next to the item factors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnnBackend {
    Flat(FlatIpIndex),
    Hnsw(HnswIndex),
}

impl AnnBackend {
    /// Index `vectors` row by row. Rows are expected to be L2-normalized
    /// already so that inner product equals cosine.
    #[must_use]
    pub fn build(vectors: &Matrix, config: &AnnConfig) -> Self {
        match config.kind {
            AnnKind::Flat => AnnBackend::Flat(FlatIpIndex::new(vectors.clone())),
            AnnKind::Hnsw => AnnBackend::Hnsw(HnswIndex::build(vectors, &config.hnsw)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> AnnKind {
        match self {
            AnnBackend::Flat(_) => AnnKind::Flat,
            AnnBackend::Hnsw(_) => AnnKind::Hnsw,
        }
    }

    fn inner(&self) -> &dyn AnnIndex {
        match self {
            AnnBackend::Flat(f) => f,
            AnnBackend::Hnsw(h) => h,
        }
    }
}

impl AnnIndex for AnnBackend {
    fn dim(&self) -> usize {
        self.inner().dim()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<AnnHit> {
        self.inner().search(query, k)
    }
}
