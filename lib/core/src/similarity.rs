//! Item-to-item similarity indices.
//!
//! [`SparseSimilarity`] keeps the top-K neighbors of every item in a CSR graph
//! and is what interaction-trained models use. [`DenseSimilarity`] holds the
//! full N×N cosine matrix of a content-trained model and only fits small
//! catalogs. Both answer `similar_items(seed, k)` the same way: unknown seeds
//! give an empty list, results come back sorted by descending score and ties
//! keep the order the neighbors are stored in.

use std::cmp::Ordering;
use crate::{CsrMatrix, Error, IdentityMap, Matrix, Result};

/// A ranked `(item_id, score)` pair
pub type ScoredItem = (String, f32);

#[inline]
fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)
}

/// Top-K neighbor graph over the item identity space
#[derive(Debug, Clone)]
pub struct SparseSimilarity {
    items: IdentityMap,
    graph: CsrMatrix,
}

impl SparseSimilarity {
    pub fn new(items: IdentityMap, graph: CsrMatrix) -> Result<Self> {
        if graph.n_rows() != graph.n_cols() {
            return Err(Error::shape("similarity graph columns", graph.n_rows(), graph.n_cols()));
        }
        if items.slots() != graph.n_rows() {
            return Err(Error::shape("similarity graph rows", items.slots(), graph.n_rows()));
        }
        Ok(Self { items, graph })
    }

    #[inline]
    pub fn items(&self) -> &IdentityMap {
        &self.items
    }

    #[inline]
    pub fn graph(&self) -> &CsrMatrix {
        &self.graph
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.n_rows()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.n_rows() == 0
    }

    /// Stored neighbors of `seed_item_id`, best first, at most `k` of them.
    ///
    /// Self-loops are excluded when the graph is built, so the row is
    /// returned as stored, only sorted and truncated.
    pub fn similar_items(&self, seed_item_id: &str, k: usize) -> Vec<ScoredItem> {
        let Some(row) = self.items.row_of(seed_item_id) else {
            return Vec::new();
        };
        let (neighbors, scores) = self.graph.row(row);
        if neighbors.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = neighbors
            .iter()
            .zip(scores)
            .map(|(&j, &s)| (j as usize, s))
            .collect();
        // stable: equal scores keep their stored order
        ranked.sort_by(by_score_desc);
        ranked.truncate(k);

        ranked
            .into_iter()
            .filter_map(|(j, s)| self.items.id_of(j).map(|id| (id.to_string(), s)))
            .collect()
    }
}

/// Full pairwise cosine matrix for small catalogs
#[derive(Debug, Clone)]
pub struct DenseSimilarity {
    items: IdentityMap,
    sims: Matrix,
}

impl DenseSimilarity {
    pub fn new(items: IdentityMap, sims: Matrix) -> Result<Self> {
        if sims.rows() != sims.cols() {
            return Err(Error::shape("dense similarity columns", sims.rows(), sims.cols()));
        }
        if items.slots() != sims.rows() {
            return Err(Error::shape("dense similarity rows", items.slots(), sims.rows()));
        }
        Ok(Self { items, sims })
    }

    #[inline]
    pub fn items(&self) -> &IdentityMap {
        &self.items
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix {
        &self.sims
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sims.rows()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sims.rows() == 0
    }

    /// Every other item ranked by cosine to the seed; the seed itself is
    /// skipped here because the diagonal is stored.
    pub fn similar_items(&self, seed_item_id: &str, k: usize) -> Vec<ScoredItem> {
        let Some(row) = self.items.row_of(seed_item_id) else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = self
            .sims
            .row(row)
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != row)
            .map(|(j, &s)| (j, s))
            .collect();
        ranked.sort_by(by_score_desc);

        ranked
            .into_iter()
            .filter_map(|(j, s)| self.items.id_of(j).map(|id| (id.to_string(), s)))
            .take(k)
            .collect()
    }
}

/// Either form of a loaded item-item model
#[derive(Debug, Clone)]
pub enum SimilarityIndex {
    Sparse(SparseSimilarity),
    Dense(DenseSimilarity),
}

impl SimilarityIndex {
    pub fn similar_items(&self, seed_item_id: &str, k: usize) -> Vec<ScoredItem> {
        match self {
            SimilarityIndex::Sparse(s) => s.similar_items(seed_item_id, k),
            SimilarityIndex::Dense(d) => d.similar_items(seed_item_id, k),
        }
    }

    pub fn items(&self) -> &IdentityMap {
        match self {
            SimilarityIndex::Sparse(s) => s.items(),
            SimilarityIndex::Dense(d) => d.items(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            SimilarityIndex::Sparse(s) => s.len(),
            SimilarityIndex::Dense(d) => d.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<SparseSimilarity> for SimilarityIndex {
    fn from(s: SparseSimilarity) -> Self {
        SimilarityIndex::Sparse(s)
    }
}

impl From<DenseSimilarity> for SimilarityIndex {
    fn from(d: DenseSimilarity) -> Self {
        SimilarityIndex::Dense(d)
    }
}
