//! Serving facade: registry resolution, cached model loading and top-K
//! recommendation queries.

pub mod loader;
pub mod service;

pub use loader::{build_model, load_model, LoadedModel};
pub use service::{
    Algorithm, RecommendRequest, RecommendResponse, RecommendationService, RecommendedItem,
    ServeConfig,
};
