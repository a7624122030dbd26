//! Offline trainers for Merlin.
//!
//! Each trainer turns interaction or content data into a [`TrainedModel`]
//! which [`publish`] writes to an artifact store and registers.

pub mod config;
pub mod input;
pub mod movielens;
pub mod tfidf;
pub mod itemknn;
pub mod als;
pub mod orientation;
pub mod mf;
pub mod publish;

pub use config::{AlsConfig, EventWeights, ItemKnnConfig, TfidfConfig};
pub use input::{CatalogRow, EventRow, RatingRow};
pub use itemknn::{train_content, train_interactions};
pub use mf::train_mf;
pub use orientation::{resolve_orientation, validate_shapes, FactorShape};
pub use publish::{publish, PublishSummary, PublishTarget, TrainedModel};
pub use tfidf::TfidfModel;
