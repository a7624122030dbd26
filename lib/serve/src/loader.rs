use merlin_core::{
    DenseSimilarity, FactorIndex, IdentityMap, Result, SimilarityIndex, SparseSimilarity,
};
use merlin_storage::{ArtifactPayload, ArtifactStore, ResolvedModel};

/// A model ready to answer queries
#[derive(Debug)]
pub enum LoadedModel {
    Similarity(SimilarityIndex),
    Factors(FactorIndex),
}

impl LoadedModel {
    /// Short name of the query family, for logs and format errors
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            LoadedModel::Similarity(_) => "similarity",
            LoadedModel::Factors(_) => "factors",
        }
    }
}

/// Turn a stored payload into its query structure
pub fn build_model(payload: ArtifactPayload) -> Result<LoadedModel> {
    Ok(match payload {
        ArtifactPayload::Sparse { item_ids, graph } => LoadedModel::Similarity(
            SparseSimilarity::new(IdentityMap::from_ordered(item_ids), graph)?.into(),
        ),
        ArtifactPayload::Dense { item_ids, sims } => LoadedModel::Similarity(
            DenseSimilarity::new(IdentityMap::from_ordered(item_ids), sims)?.into(),
        ),
        ArtifactPayload::Factors {
            user_factors,
            item_factors,
            user_to_index,
            item_to_index,
            ann,
        } => LoadedModel::Factors(FactorIndex::new(
            user_factors,
            item_factors,
            IdentityMap::from_pairs(user_to_index),
            IdentityMap::from_pairs(item_to_index),
            ann,
        )?),
    })
}

/// Read a resolved artifact from the store and build it
pub fn load_model(store: &ArtifactStore, resolved: &ResolvedModel) -> Result<LoadedModel> {
    let payload = store.read(&resolved.location, resolved.format)?;
    let model = build_model(payload)?;
    tracing::info!(
        model_id = %resolved.model_id,
        version = %resolved.version,
        format = %resolved.format,
        kind = model.kind(),
        "loaded model"
    );
    Ok(model)
}
