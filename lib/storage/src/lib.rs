pub mod location;
pub mod manifest;
pub mod artifact;
pub mod registry;

pub use location::ArtifactLocation;
pub use manifest::{ArtifactManifest, ManifestFile, Metrics, ModelFormat, Stage};
pub use artifact::{ArtifactPayload, ArtifactStore};
pub use registry::{
    InMemoryRegistry, LmdbRegistry, ModelRecord, RegistryClient, RegistryStore, ResolvedModel,
};
