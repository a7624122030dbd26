// End-to-end tests: JSONL input -> training -> artifact + registry -> serving
use merlin::prelude::*;
use merlin_storage::Metrics;
use merlin_train::input::{self, CatalogRow, EventRow, RatingRow};
use merlin_train::{tfidf, EventWeights, TfidfConfig};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

struct Workspace {
    dir: tempfile::TempDir,
    store: Arc<ArtifactStore>,
    registry: RegistryClient,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = format!("file://{}/models/", dir.path().display());
        let store = Arc::new(ArtifactStore::from_uri(&base).unwrap());
        let registry = RegistryClient::open_lmdb(dir.path().join("registry")).unwrap();
        Self { dir, store, registry }
    }

    fn write_jsonl(&self, name: &str, lines: &[String]) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    fn publish(&self, model: &TrainedModel, model_id: &str, version: &str) {
        let target = PublishTarget {
            model_id: model_id.to_string(),
            version: version.to_string(),
            stage: Stage::Dev,
            notes: None,
        };
        publish(&self.store, &self.registry, model, &target).unwrap();
    }

    fn service(&self) -> RecommendationService {
        RecommendationService::new(self.registry.clone(), self.store.clone(), ServeConfig::default())
    }
}

fn ratings_path(ws: &Workspace) -> std::path::PathBuf {
    let mut lines = Vec::new();
    // users 1 and 2 loved A and B; user 3 loved C; low ratings are ignored
    for (user, item, rating) in [
        (1, "A", 5.0),
        (1, "B", 4.5),
        (2, "A", 4.0),
        (2, "B", 5.0),
        (3, "C", 5.0),
        (3, "A", 2.0),
    ] {
        lines.push(format!(
            r#"{{"user_id": {}, "item_id": "{}", "rating": {}}}"#,
            user, item, rating
        ));
    }
    ws.write_jsonl("ratings.jsonl", &lines)
}

fn train_ratings(path: &Path) -> TrainedModel {
    let ratings: Vec<RatingRow> = input::read_jsonl(path).unwrap();
    let config = ItemKnnConfig {
        min_item_count: 1,
        min_user_count: 1,
        ..ItemKnnConfig::default()
    };
    let positives = input::positive_interactions(&ratings, config.implicit_threshold);
    train_interactions(&positives, &config).unwrap()
}

#[test]
fn test_co_rated_items_recommend_each_other() {
    let ws = Workspace::new();
    let model = train_ratings(&ratings_path(&ws));
    ws.publish(&model, "cf_itemknn", "0.0.1");

    let service = ws.service();
    let response = service
        .recommend(&RecommendRequest {
            user_id: None,
            seed_item_id: Some("A".into()),
            algorithm: Algorithm::CfItemknn,
            k: 10,
        })
        .unwrap();

    assert_eq!(response.model_id, "cf_itemknn");
    assert_eq!(response.version, "0.0.1");
    assert_eq!(response.items[0].item_id, "B");
    assert!((response.items[0].score - 1.0).abs() < 1e-6);
    assert!(response.items.iter().all(|i| i.item_id != "A"));
    assert!(!response.fallback);
}

#[test]
fn test_movielens_dump_recommends_by_imdb_id() {
    let ws = Workspace::new();
    let ml = ws.dir.path().join("ml-latest-small");
    std::fs::create_dir(&ml).unwrap();
    std::fs::write(
        ml.join("ratings.csv"),
        "userId,movieId,rating,timestamp\n1,1,5.0,1\n1,2,4.5,2\n2,1,4.0,3\n2,2,5.0,4\n3,3,5.0,5\n",
    )
    .unwrap();
    std::fs::write(ml.join("links.csv"), "movieId,imdbId,tmdbId\n1,0114709,862\n2,0113497,8844\n").unwrap();

    let config = ItemKnnConfig {
        min_item_count: 1,
        min_user_count: 1,
        ..ItemKnnConfig::default()
    };
    let positives =
        merlin_train::movielens::load_interactions(&ml, config.implicit_threshold).unwrap();
    ws.publish(&train_interactions(&positives, &config).unwrap(), "cf_itemknn", "1");

    let response = ws
        .service()
        .recommend(&RecommendRequest {
            user_id: None,
            seed_item_id: Some("tt0114709".into()),
            algorithm: Algorithm::CfItemknn,
            k: 5,
        })
        .unwrap();
    assert_eq!(response.items[0].item_id, "tt0113497");
    assert!(response.items.iter().all(|i| i.item_id != "3"));
}

#[test]
fn test_cold_user_gets_empty_fallback() {
    let ws = Workspace::new();
    let mut lines = Vec::new();
    for user in ["ana", "ben", "cy"] {
        for (item, event) in [("m1", "like"), ("m2", "view"), ("m3", "save")] {
            lines.push(format!(
                r#"{{"user_id": "{}", "item_id": "{}", "event_type": "{}"}}"#,
                user, item, event
            ));
        }
    }
    let path = ws.write_jsonl("events.jsonl", &lines);
    let events: Vec<EventRow> = input::read_jsonl(&path).unwrap();
    let weighted = input::weighted_events(&events, &EventWeights::default());
    let config = AlsConfig {
        factors: 4,
        iterations: 5,
        ..AlsConfig::default()
    };
    let model = train_mf(&weighted, &config).unwrap();
    ws.publish(&model, "mf_als", "1");

    let service = ws.service();
    let cold = service
        .recommend(&RecommendRequest {
            user_id: Some("newcomer".into()),
            seed_item_id: None,
            algorithm: Algorithm::MfAls,
            k: 5,
        })
        .unwrap();
    assert!(cold.items.is_empty());
    assert!(cold.fallback);

    let warm = service
        .recommend(&RecommendRequest {
            user_id: Some("ben".into()),
            seed_item_id: None,
            algorithm: "mf".parse().unwrap(),
            k: 5,
        })
        .unwrap();
    assert_eq!(warm.items.len(), 3);
    assert!(warm.items.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_content_model_from_catalog() {
    let ws = Workspace::new();
    let lines = vec![
        r#"{"item_id": "m1", "title": "Space Pirates", "overview": "pirates in space", "genres": ["SciFi"]}"#.to_string(),
        r#"{"item_id": "m2", "title": "Space Station", "overview": "life in space", "genres": ["SciFi"]}"#.to_string(),
        r#"{"item_id": "m3", "title": "Garden Party", "overview": "a quiet comedy", "genres": ["Comedy"]}"#.to_string(),
    ];
    let path = ws.write_jsonl("catalog.jsonl", &lines);
    let catalog: Vec<CatalogRow> = input::read_jsonl(&path).unwrap();
    let vectors = tfidf::content_vectors(&catalog, &TfidfConfig::default());
    let model = train_content(&vectors).unwrap();
    assert_eq!(model.format(), ModelFormat::DenseMatrix);
    ws.publish(&model, "content_itemknn", "1");

    let response = ws
        .service()
        .recommend(&RecommendRequest {
            user_id: None,
            seed_item_id: Some("m1".into()),
            algorithm: Algorithm::ContentItemknn,
            k: 2,
        })
        .unwrap();
    let ids: Vec<&str> = response.items.iter().map(|i| i.item_id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m3"]);
    assert_eq!(response.items[0].why, "content-knn");
}

#[test]
fn test_sparse_artifact_round_trip_through_registry() {
    let ws = Workspace::new();
    let graph = CsrMatrix::from_rows(
        3,
        vec![vec![(1u32, 0.9f32), (2, 0.4)], vec![], vec![(0, 0.9)]],
    )
    .unwrap();
    let model = TrainedModel {
        payload: ArtifactPayload::Sparse {
            item_ids: vec!["x".into(), "y".into(), "z".into()],
            graph: graph.clone(),
        },
        metrics: Metrics::new(),
    };
    ws.publish(&model, "cf_itemknn", "7");

    let resolved = ws.registry.resolve_latest("cf_itemknn", Stage::Dev).unwrap();
    let ArtifactPayload::Sparse { graph: read, .. } =
        ws.store.read(&resolved.location, resolved.format).unwrap()
    else {
        panic!("expected sparse payload");
    };
    assert_eq!(read, graph);

    let service = ws.service();
    let empty_row = service
        .recommend(&RecommendRequest {
            user_id: None,
            seed_item_id: Some("y".into()),
            algorithm: Algorithm::CfItemknn,
            k: 5,
        })
        .unwrap();
    assert!(empty_row.items.is_empty());
}

#[test]
fn test_foreign_location_fails_before_io() {
    let ws = Workspace::new();
    ws.registry
        .publish(&ModelRecord {
            model_id: "cf_itemknn".into(),
            version: "1".into(),
            stage: Stage::Dev,
            location: "s3://bucket/cf_itemknn/1/".into(),
            format: ModelFormat::SparseTriplet,
            metrics: Metrics::new(),
            created_at: chrono::Utc::now(),
            notes: None,
        })
        .unwrap();

    let result = ws.service().recommend(&RecommendRequest {
        user_id: None,
        seed_item_id: Some("A".into()),
        algorithm: Algorithm::CfItemknn,
        k: 5,
    });
    assert!(matches!(result, Err(Error::UnsupportedLocationScheme(_))));
}

#[test]
fn test_concurrent_requests_share_one_load() {
    let ws = Workspace::new();
    ws.publish(&train_ratings(&ratings_path(&ws)), "cf_itemknn", "1");
    let service = ws.service();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let response = service
                    .recommend(&RecommendRequest {
                        user_id: None,
                        seed_item_id: Some("B".into()),
                        algorithm: Algorithm::CfItemknn,
                        k: 3,
                    })
                    .unwrap();
                assert_eq!(response.items[0].item_id, "A");
            });
        }
    });
    assert_eq!(service.cache().len(), 1);
}
