use merlin_core::{Error, ModelCache, Result, ScoredItem};
use merlin_storage::{ArtifactStore, RegistryClient, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use crate::loader::{load_model, LoadedModel};

/// Which model family answers a request. Deserializes through [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Algorithm {
    /// Co-occurrence item-KNN, seeded by an item
    CfItemknn,
    /// Content item-KNN, seeded by an item
    ContentItemknn,
    /// Latent factors, personalized by user
    MfAls,
}

impl Algorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::CfItemknn => "cf_itemknn",
            Algorithm::ContentItemknn => "content_itemknn",
            Algorithm::MfAls => "mf_als",
        }
    }

    fn why(&self) -> &'static str {
        match self {
            Algorithm::CfItemknn => "item-knn",
            Algorithm::ContentItemknn => "content-knn",
            Algorithm::MfAls => "mf-als",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    /// Case-insensitive; any name starting with `mf` selects factors
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "cf_itemknn" | "itemknn" => Ok(Algorithm::CfItemknn),
            "content_itemknn" | "content" => Ok(Algorithm::ContentItemknn),
            n if n.starts_with("mf") => Ok(Algorithm::MfAls),
            _ => Err(Error::InvalidConfig(format!("unknown algorithm: {}", s))),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = Error;

    fn try_from(name: String) -> Result<Self> {
        name.parse()
    }
}

/// Serving knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Registry stage models are resolved from
    pub stage: Stage,
    pub itemknn_model_id: String,
    pub content_model_id: String,
    pub mf_model_id: String,
    /// Upper bound on `k`
    pub max_k: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            stage: Stage::Dev,
            itemknn_model_id: "cf_itemknn".to_string(),
            content_model_id: "content_itemknn".to_string(),
            mf_model_id: "mf_als".to_string(),
            max_k: 200,
        }
    }
}

impl ServeConfig {
    #[must_use]
    pub fn model_id(&self, algorithm: Algorithm) -> &str {
        match algorithm {
            Algorithm::CfItemknn => &self.itemknn_model_id,
            Algorithm::ContentItemknn => &self.content_model_id,
            Algorithm::MfAls => &self.mf_model_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub seed_item_id: Option<String>,
    pub algorithm: Algorithm,
    pub k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedItem {
    pub item_id: String,
    pub score: f32,
    pub why: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub model_id: String,
    pub version: String,
    pub items: Vec<RecommendedItem>,
    /// No personalized answer was possible; the caller should use its own
    /// fallback (popular items, editorial lists, ...)
    pub fallback: bool,
    pub notes: Option<String>,
    pub elapsed_ms: f64,
}

/// Resolves the current model version, loads it once, answers top-K queries
pub struct RecommendationService {
    registry: RegistryClient,
    store: Arc<ArtifactStore>,
    cache: ModelCache<LoadedModel>,
    config: ServeConfig,
}

impl RecommendationService {
    pub fn new(registry: RegistryClient, store: Arc<ArtifactStore>, config: ServeConfig) -> Self {
        Self {
            registry,
            store,
            cache: ModelCache::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache<LoadedModel> {
        &self.cache
    }

    /// Drop a cached model version; the next request reloads it
    pub fn evict(&self, model_id: &str, version: &str) -> bool {
        let evicted = self.cache.evict(model_id, version);
        if evicted {
            tracing::info!(model_id, version, "evicted model from cache");
        }
        evicted
    }

    /// Resolve and load the current model for `algorithm`
    pub fn model(&self, algorithm: Algorithm) -> Result<(String, String, Arc<LoadedModel>)> {
        let model_id = self.config.model_id(algorithm);
        let resolved = self.registry.resolve_latest(model_id, self.config.stage)?;
        let model = self
            .cache
            .get_or_load(&resolved.model_id, &resolved.version, || load_model(&self.store, &resolved))?;
        Ok((resolved.model_id, resolved.version, model))
    }

    pub fn recommend(&self, request: &RecommendRequest) -> Result<RecommendResponse> {
        let started = Instant::now();
        let algorithm = request.algorithm;
        let k = request.k.min(self.config.max_k);
        let (model_id, version, model) = self.model(algorithm)?;

        let (scored, notes): (Vec<ScoredItem>, String) = match (algorithm, model.as_ref()) {
            (Algorithm::CfItemknn | Algorithm::ContentItemknn, LoadedModel::Similarity(index)) => {
                match request.seed_item_id.as_deref() {
                    None => (Vec::new(), "seed required".to_string()),
                    Some(seed) if index.items().row_of(seed).is_none() => {
                        (Vec::new(), format!("unknown seed item: {}", seed))
                    }
                    Some(seed) => (index.similar_items(seed, k), algorithm.to_string()),
                }
            }
            (Algorithm::MfAls, LoadedModel::Factors(index)) => match request.user_id.as_deref() {
                None => (Vec::new(), "user required".to_string()),
                Some(user) if index.users().row_of(user).is_none() => {
                    (Vec::new(), format!("cold user: {}", user))
                }
                Some(user) => (index.recommend_for_user(user, k), algorithm.to_string()),
            },
            (_, other) => {
                return Err(Error::FormatMismatch {
                    expected: algorithm.to_string(),
                    actual: other.kind().to_string(),
                })
            }
        };

        let items: Vec<RecommendedItem> = scored
            .into_iter()
            .map(|(item_id, score)| RecommendedItem {
                item_id,
                score,
                why: algorithm.why(),
            })
            .collect();
        let fallback = items.is_empty() && k > 0;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            %algorithm,
            %model_id,
            %version,
            k,
            returned = items.len(),
            fallback,
            elapsed_ms,
            "served recommendation"
        );

        Ok(RecommendResponse {
            model_id,
            version,
            items,
            fallback,
            notes: Some(notes),
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merlin_train::{publish, train_interactions, train_mf, ItemKnnConfig, PublishTarget, TrainedModel};
    use merlin_train::AlsConfig;

    fn target(model_id: &str, version: &str) -> PublishTarget {
        PublishTarget {
            model_id: model_id.into(),
            version: version.into(),
            stage: Stage::Dev,
            notes: None,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<ArtifactStore>,
        registry: RegistryClient,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(ArtifactStore::new(dir.path()).unwrap());
            Self {
                _dir: dir,
                store,
                registry: RegistryClient::in_memory(),
            }
        }

        fn publish(&self, model: &TrainedModel, model_id: &str, version: &str) {
            publish(&self.store, &self.registry, model, &target(model_id, version)).unwrap();
        }

        fn service(&self) -> RecommendationService {
            RecommendationService::new(self.registry.clone(), self.store.clone(), ServeConfig::default())
        }
    }

    fn knn_model() -> TrainedModel {
        let rows: Vec<(String, String)> = [("u1", "A"), ("u1", "B"), ("u2", "A"), ("u2", "B"), ("u3", "C")]
            .iter()
            .map(|(u, i)| (u.to_string(), i.to_string()))
            .collect();
        let config = ItemKnnConfig {
            min_item_count: 1,
            min_user_count: 1,
            ..ItemKnnConfig::default()
        };
        train_interactions(&rows, &config).unwrap()
    }

    fn mf_model() -> TrainedModel {
        let mut events = Vec::new();
        for u in 0..3 {
            for i in 0..3 {
                events.push((format!("u{}", u), format!("i{}", i), 1.0));
            }
        }
        let config = AlsConfig {
            factors: 4,
            iterations: 5,
            ..AlsConfig::default()
        };
        train_mf(&events, &config).unwrap()
    }

    fn request(algorithm: Algorithm, seed: Option<&str>, user: Option<&str>, k: usize) -> RecommendRequest {
        RecommendRequest {
            user_id: user.map(str::to_string),
            seed_item_id: seed.map(str::to_string),
            algorithm,
            k,
        }
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("cf_itemknn".parse::<Algorithm>().unwrap(), Algorithm::CfItemknn);
        assert_eq!("MF_ALS".parse::<Algorithm>().unwrap(), Algorithm::MfAls);
        assert_eq!("mf".parse::<Algorithm>().unwrap(), Algorithm::MfAls);
        assert_eq!("content_itemknn".parse::<Algorithm>().unwrap(), Algorithm::ContentItemknn);
        assert!("popular".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_request_json_accepts_parser_names() {
        let req: RecommendRequest =
            serde_json::from_str(r#"{"user_id": "u1", "algorithm": "mf", "k": 5}"#).unwrap();
        assert_eq!(req.algorithm, Algorithm::MfAls);
        let req: RecommendRequest =
            serde_json::from_str(r#"{"seed_item_id": "A", "algorithm": "CF_ITEMKNN", "k": 5}"#).unwrap();
        assert_eq!(req.algorithm, Algorithm::CfItemknn);
        assert!(serde_json::from_str::<RecommendRequest>(r#"{"algorithm": "popular", "k": 5}"#).is_err());
        assert_eq!(serde_json::to_string(&Algorithm::MfAls).unwrap(), r#""mf_als""#);
    }

    #[test]
    fn test_item_knn_request() {
        let fx = Fixture::new();
        fx.publish(&knn_model(), "cf_itemknn", "1");
        let svc = fx.service();

        let resp = svc.recommend(&request(Algorithm::CfItemknn, Some("A"), None, 10)).unwrap();
        assert_eq!(resp.model_id, "cf_itemknn");
        assert_eq!(resp.version, "1");
        assert_eq!(resp.items.len(), 1);
        assert_eq!(resp.items[0].item_id, "B");
        assert_eq!(resp.items[0].why, "item-knn");
        assert!(!resp.fallback);

        let resp = svc.recommend(&request(Algorithm::CfItemknn, None, None, 10)).unwrap();
        assert!(resp.items.is_empty());
        assert_eq!(resp.notes.as_deref(), Some("seed required"));

        let resp = svc.recommend(&request(Algorithm::CfItemknn, Some("nope"), None, 10)).unwrap();
        assert!(resp.items.is_empty());
        assert!(resp.fallback);
    }

    #[test]
    fn test_k_zero_and_clamp() {
        let fx = Fixture::new();
        fx.publish(&knn_model(), "cf_itemknn", "1");
        let svc = RecommendationService::new(
            fx.registry.clone(),
            fx.store.clone(),
            ServeConfig {
                max_k: 1,
                ..ServeConfig::default()
            },
        );
        let resp = svc.recommend(&request(Algorithm::CfItemknn, Some("A"), None, 0)).unwrap();
        assert!(resp.items.is_empty());
        assert!(!resp.fallback);
        let resp = svc.recommend(&request(Algorithm::CfItemknn, Some("A"), None, 50)).unwrap();
        assert_eq!(resp.items.len(), 1);
    }

    #[test]
    fn test_cold_user_gets_fallback() {
        let fx = Fixture::new();
        fx.publish(&mf_model(), "mf_als", "1");
        let svc = fx.service();

        let resp = svc.recommend(&request(Algorithm::MfAls, None, Some("stranger"), 5)).unwrap();
        assert!(resp.items.is_empty());
        assert!(resp.fallback);

        let resp = svc.recommend(&request(Algorithm::MfAls, None, Some("u1"), 2)).unwrap();
        assert_eq!(resp.items.len(), 2);
        assert!(resp.items.iter().all(|i| i.why == "mf-als"));
    }

    #[test]
    fn test_model_loaded_once_and_new_version_picked_up() {
        let fx = Fixture::new();
        fx.publish(&knn_model(), "cf_itemknn", "1");
        let svc = fx.service();
        let (_, _, first) = svc.model(Algorithm::CfItemknn).unwrap();
        let (_, _, again) = svc.model(Algorithm::CfItemknn).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        std::thread::sleep(std::time::Duration::from_millis(5));
        fx.publish(&knn_model(), "cf_itemknn", "2");
        let (_, version, _) = svc.model(Algorithm::CfItemknn).unwrap();
        assert_eq!(version, "2");
        assert_eq!(svc.cache().len(), 2);
        assert!(svc.evict("cf_itemknn", "1"));
        assert_eq!(svc.cache().len(), 1);
    }

    #[test]
    fn test_missing_model_and_wrong_format() {
        let fx = Fixture::new();
        let svc = fx.service();
        assert!(matches!(
            svc.recommend(&request(Algorithm::MfAls, None, Some("u"), 5)),
            Err(Error::ModelNotFound { .. })
        ));

        // factor artifact registered under the item-knn id
        fx.publish(&mf_model(), "cf_itemknn", "1");
        assert!(matches!(
            svc.recommend(&request(Algorithm::CfItemknn, Some("i0"), None, 5)),
            Err(Error::FormatMismatch { .. })
        ));
    }
}
