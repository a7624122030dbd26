use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use merlin::config::AppConfig;
use merlin_core::AnnKind;
use merlin_serve::{Algorithm, RecommendRequest, RecommendationService};
use merlin_storage::{ArtifactStore, RegistryClient, Stage};
use merlin_train::input::{self, CatalogRow, EventRow, RatingRow};
use merlin_train::{publish, tfidf, PublishTarget, TrainedModel};

/// Train, publish and query recommendation models
#[derive(Parser, Debug)]
#[command(name = "merlin")]
#[command(about = "Item-KNN and ALS recommendation models", long_about = None)]
struct Args {
    /// Config file (defaults to $MERLIN_CONFIG, then ./merlin.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    /// Ratings JSONL, co-occurrence similarity
    Interactions,
    /// Catalog JSONL, TF-IDF content similarity
    Content,
    /// MovieLens directory (ratings.csv + links.csv, or u.data)
    Movielens,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnnArg {
    Flat,
    Hnsw,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train an item-KNN model and register it
    TrainItemknn {
        #[arg(long, value_enum, default_value = "interactions")]
        source: Source,
        /// JSONL input (ratings or catalog rows), or a MovieLens directory
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        model_id: Option<String>,
        #[arg(long)]
        version: String,
        #[arg(long, default_value = "dev")]
        stage: Stage,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_item_count: Option<usize>,
        #[arg(long)]
        min_user_count: Option<usize>,
        /// Ratings at or above this are positives
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Train implicit ALS factors and register them
    TrainMf {
        /// Events JSONL
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "mf_als")]
        model_id: String,
        #[arg(long)]
        version: String,
        #[arg(long, default_value = "dev")]
        stage: Stage,
        #[arg(long)]
        factors: Option<usize>,
        #[arg(long)]
        reg: Option<f32>,
        #[arg(long)]
        alpha: Option<f32>,
        #[arg(long)]
        iters: Option<usize>,
        #[arg(long, value_enum)]
        ann: Option<AnnArg>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Query the current model of an algorithm
    Recommend {
        #[arg(long, default_value = "mf_als")]
        algorithm: Algorithm,
        #[arg(long)]
        seed_item_id: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(short, default_value_t = 10)]
        k: usize,
        #[arg(long)]
        stage: Option<Stage>,
    },
    /// List registered models
    Models {
        #[arg(long)]
        stage: Option<Stage>,
    },
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config.logging.level)?;
    info!("merlin v{}", env!("CARGO_PKG_VERSION"));

    let registry = RegistryClient::open_lmdb(&config.storage.registry_path)
        .with_context(|| format!("opening registry at {}", config.storage.registry_path.display()))?;

    match args.command {
        Command::TrainItemknn {
            source,
            input: input_path,
            model_id,
            version,
            stage,
            top_k,
            min_item_count,
            min_user_count,
            threshold,
            notes,
        } => {
            let mut knn = config.itemknn.clone();
            knn.top_k = top_k.unwrap_or(knn.top_k);
            knn.min_item_count = min_item_count.unwrap_or(knn.min_item_count);
            knn.min_user_count = min_user_count.unwrap_or(knn.min_user_count);
            knn.implicit_threshold = threshold.unwrap_or(knn.implicit_threshold);

            let (model, default_id): (TrainedModel, &str) = match source {
                Source::Interactions => {
                    let ratings: Vec<RatingRow> = input::read_jsonl(&input_path)?;
                    let positives = input::positive_interactions(&ratings, knn.implicit_threshold);
                    (merlin_train::train_interactions(&positives, &knn)?, config.serve.itemknn_model_id.as_str())
                }
                Source::Movielens => {
                    let positives =
                        merlin_train::movielens::load_interactions(&input_path, knn.implicit_threshold)?;
                    (merlin_train::train_interactions(&positives, &knn)?, config.serve.itemknn_model_id.as_str())
                }
                Source::Content => {
                    let catalog: Vec<CatalogRow> = input::read_jsonl(&input_path)?;
                    let vectors = tfidf::content_vectors(&catalog, &config.tfidf);
                    (merlin_train::train_content(&vectors)?, config.serve.content_model_id.as_str())
                }
            };

            let store = ArtifactStore::from_uri(&config.storage.artifact_base)?;
            let target = PublishTarget {
                model_id: model_id.unwrap_or_else(|| default_id.to_string()),
                version,
                stage,
                notes,
            };
            let summary = publish(&store, &registry, &model, &target)?;
            print_json(&summary)?;
        }
        Command::TrainMf {
            input: input_path,
            model_id,
            version,
            stage,
            factors,
            reg,
            alpha,
            iters,
            ann,
            notes,
        } => {
            let mut als = config.als.clone();
            als.factors = factors.unwrap_or(als.factors);
            als.regularization = reg.unwrap_or(als.regularization);
            als.alpha = alpha.unwrap_or(als.alpha);
            als.iterations = iters.unwrap_or(als.iterations);
            if let Some(ann) = ann {
                als.ann.kind = match ann {
                    AnnArg::Flat => AnnKind::Flat,
                    AnnArg::Hnsw => AnnKind::Hnsw,
                };
            }

            let events: Vec<EventRow> = input::read_jsonl(&input_path)?;
            let weighted = input::weighted_events(&events, &config.events);
            let model = merlin_train::train_mf(&weighted, &als)?;

            let store = ArtifactStore::from_uri(&config.storage.artifact_base)?;
            let target = PublishTarget {
                model_id,
                version,
                stage,
                notes,
            };
            let summary = publish(&store, &registry, &model, &target)?;
            print_json(&summary)?;
        }
        Command::Recommend {
            algorithm,
            seed_item_id,
            user_id,
            k,
            stage,
        } => {
            let mut serve = config.serve.clone();
            serve.stage = stage.unwrap_or(serve.stage);
            let store = Arc::new(ArtifactStore::from_uri(&config.storage.artifact_base)?);
            let service = RecommendationService::new(registry, store, serve);
            let response = service.recommend(&RecommendRequest {
                user_id,
                seed_item_id,
                algorithm,
                k,
            })?;
            print_json(&response)?;
        }
        Command::Models { stage } => {
            let rows = registry.list(stage)?;
            info!("{} registered model versions", rows.len());
            print_json(&rows)?;
        }
    }

    Ok(())
}
