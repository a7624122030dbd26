//! # Merlin Core
//!
//! Core library for the Merlin recommendation engine.
//!
//! This crate provides the in-memory structures that serve recommendations:
//!
//! - [`IdentityMap`] - External identifier ↔ dense row bijection (gap tolerant)
//! - [`CsrMatrix`] - Compressed sparse rows (similarity graphs, incidence matrices)
//! - [`SparseSimilarity`] / [`DenseSimilarity`] - Item-to-item top-K queries
//! - [`FactorIndex`] - User/item latent factors with an ANN over item rows
//! - [`HnswIndex`] / [`FlatIpIndex`] - Inner-product nearest-neighbor search
//! - [`ModelCache`] - Load-once cache of models keyed by `(model_id, version)`
//!
//! ## Example
//!
//! ```rust
//! use merlin_core::{CsrMatrix, IdentityMap, SparseSimilarity};
//!
//! let items = IdentityMap::from_ordered(["a", "b", "c"]);
//! let graph = CsrMatrix::from_rows(3, vec![
//!     vec![(2, 0.4), (1, 0.9)],
//!     vec![],
//!     vec![(0, 0.9)],
//! ]).unwrap();
//! let index = SparseSimilarity::new(items, graph).unwrap();
//!
//! let top = index.similar_items("a", 2);
//! assert_eq!(top[0].0, "b");
//! ```

pub mod error;
pub mod matrix;
pub mod identity;
pub mod csr;
pub mod similarity;
pub mod ann;
pub mod hnsw;
pub mod factors;
pub mod cache;

/// Inner-product kernels
///
/// - AVX2/FMA on x86_64
/// - Scalar fallback with two accumulators elsewhere
pub mod simd;

pub use error::{Error, Result};
pub use matrix::Matrix;
pub use identity::IdentityMap;
pub use csr::CsrMatrix;
pub use similarity::{DenseSimilarity, ScoredItem, SimilarityIndex, SparseSimilarity};
pub use ann::{AnnBackend, AnnConfig, AnnHit, AnnIndex, AnnKind, FlatIpIndex, NO_MATCH};
pub use hnsw::{HnswConfig, HnswIndex};
pub use factors::FactorIndex;
pub use cache::{CacheKey, ModelCache};
