//! # Merlin
//!
//! A recommendation engine: offline trainers produce versioned model
//! artifacts, a registry records which version is current, and a serving
//! facade answers top-K queries from an in-process model cache.
//!
//! ## Models
//!
//! - **Item-KNN (co-occurrence)**: cosine neighbors over a binary user×item
//!   matrix, stored as a sparse top-K graph
//! - **Item-KNN (content)**: cosine over TF-IDF catalog vectors, stored dense
//! - **Implicit ALS**: user/item latent factors with an inner-product ANN
//!   (exact flat scan or HNSW) over the normalized item factors
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! merlin train-itemknn --source interactions --input ratings.jsonl --version 0.0.1
//! merlin train-itemknn --source movielens --input ./ml-25m --version 0.0.2
//! merlin train-mf --input events.jsonl --version 0.0.1
//! merlin recommend --algorithm cf_itemknn --seed-item-id tt0133093 -k 10
//! merlin recommend --algorithm mf_als --user-id 42 -k 10
//! ```
//!
//! ### As a library
//!
//! ```rust,no_run
//! use merlin::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(ArtifactStore::from_uri("file:///srv/models/").unwrap());
//! let registry = RegistryClient::open_lmdb("/srv/registry").unwrap();
//! let service = RecommendationService::new(registry, store, ServeConfig::default());
//!
//! let response = service
//!     .recommend(&RecommendRequest {
//!         user_id: Some("42".into()),
//!         seed_item_id: None,
//!         algorithm: Algorithm::MfAls,
//!         k: 10,
//!     })
//!     .unwrap();
//! for item in &response.items {
//!     println!("{} {:.3} ({})", item.item_id, item.score, item.why);
//! }
//! ```

pub mod config;

pub use merlin_core;
pub use merlin_serve;
pub use merlin_storage;
pub use merlin_train;

/// Commonly used types
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use merlin_core::{
        AnnBackend, AnnConfig, AnnIndex, AnnKind, CsrMatrix, Error, FactorIndex, IdentityMap,
        Matrix, ModelCache, Result, SimilarityIndex,
    };
    pub use merlin_serve::{
        Algorithm, LoadedModel, RecommendRequest, RecommendResponse, RecommendationService,
        ServeConfig,
    };
    pub use merlin_storage::{
        ArtifactLocation, ArtifactPayload, ArtifactStore, ModelFormat, ModelRecord,
        RegistryClient, Stage,
    };
    pub use merlin_train::{
        publish, train_content, train_interactions, train_mf, AlsConfig, ItemKnnConfig,
        PublishTarget, TrainedModel,
    };
}
