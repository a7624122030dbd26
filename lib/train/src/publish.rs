use chrono::Utc;
use merlin_core::Result;
use merlin_storage::{
    ArtifactPayload, ArtifactStore, Metrics, ModelFormat, ModelRecord, RegistryClient, Stage,
};
use serde::Serialize;

/// Output of a trainer, ready to persist
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub payload: ArtifactPayload,
    pub metrics: Metrics,
}

impl TrainedModel {
    #[must_use]
    pub fn format(&self) -> ModelFormat {
        self.payload.format()
    }
}

/// Where and how a trained model is registered
#[derive(Debug, Clone)]
pub struct PublishTarget {
    pub model_id: String,
    pub version: String,
    pub stage: Stage,
    pub notes: Option<String>,
}

/// Printed by the CLI after a successful publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishSummary {
    pub model_id: String,
    pub version: String,
    pub stage: Stage,
    pub artifact_uri: String,
    pub format: ModelFormat,
    pub metrics: Metrics,
}

fn default_notes(format: ModelFormat) -> &'static str {
    match format {
        ModelFormat::DenseMatrix | ModelFormat::SparseTriplet => "Item-item similarity model",
        ModelFormat::FactorsAnn => "Implicit ALS factors + ANN index",
    }
}

/// Write the artifact, then upsert its registry row.
///
/// The row only appears once every file of the version is on disk, so a
/// reader resolving the latest version never sees a partial artifact.
pub fn publish(
    store: &ArtifactStore,
    registry: &RegistryClient,
    model: &TrainedModel,
    target: &PublishTarget,
) -> Result<PublishSummary> {
    let location = store.write(&target.model_id, &target.version, &model.payload, &model.metrics)?;
    let format = model.format();

    let record = ModelRecord {
        model_id: target.model_id.clone(),
        version: target.version.clone(),
        stage: target.stage,
        location: location.to_uri(),
        format,
        metrics: model.metrics.clone(),
        created_at: Utc::now(),
        notes: Some(
            target
                .notes
                .clone()
                .unwrap_or_else(|| default_notes(format).to_string()),
        ),
    };
    registry.publish(&record)?;

    Ok(PublishSummary {
        model_id: record.model_id,
        version: record.version,
        stage: record.stage,
        artifact_uri: record.location,
        format,
        metrics: record.metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use merlin_core::{CsrMatrix, Error};

    fn model() -> TrainedModel {
        TrainedModel {
            payload: ArtifactPayload::Sparse {
                item_ids: vec!["a".into(), "b".into()],
                graph: CsrMatrix::from_rows(2, vec![vec![(1u32, 0.5f32)], vec![(0, 0.5)]]).unwrap(),
            },
            metrics: Metrics::from([("nnz".to_string(), 2.0)]),
        }
    }

    #[test]
    fn test_publish_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let registry = RegistryClient::in_memory();
        let target = PublishTarget {
            model_id: "cf_itemknn".into(),
            version: "0.0.1".into(),
            stage: Stage::Staging,
            notes: None,
        };

        let summary = publish(&store, &registry, &model(), &target).unwrap();
        assert!(summary.artifact_uri.starts_with("file://"));
        assert!(summary.artifact_uri.ends_with("cf_itemknn/0.0.1/"));
        assert_eq!(summary.format, ModelFormat::SparseTriplet);

        let resolved = registry.resolve_latest("cf_itemknn", Stage::Staging).unwrap();
        assert_eq!(resolved.version, "0.0.1");
        assert!(store.read(&resolved.location, resolved.format).is_ok());

        let row = registry.record("cf_itemknn", "0.0.1").unwrap().unwrap();
        assert_eq!(row.notes.as_deref(), Some("Item-item similarity model"));
        assert_eq!(row.metrics["nnz"], 2.0);
    }

    #[test]
    fn test_republish_same_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let registry = RegistryClient::in_memory();
        let target = PublishTarget {
            model_id: "m".into(),
            version: "1".into(),
            stage: Stage::Dev,
            notes: Some("first".into()),
        };
        publish(&store, &registry, &model(), &target).unwrap();
        assert!(matches!(
            publish(&store, &registry, &model(), &target),
            Err(Error::ArtifactExists(_))
        ));
        let row = registry.record("m", "1").unwrap().unwrap();
        assert_eq!(row.notes.as_deref(), Some("first"));
    }
}
