use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use merlin_serve::ServeConfig;
use merlin_train::{AlsConfig, EventWeights, ItemKnnConfig, TfidfConfig};

const DEFAULT_CONFIG_FILE: &str = "merlin.toml";

/// Top-level application configuration loaded from file + environment.
///
/// Environment overrides use the `MERLIN_` prefix and `__` between nested
/// keys, e.g. `MERLIN_ALS__FACTORS=32` or `MERLIN_SERVE__STAGE=prod`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSection,
    pub itemknn: ItemKnnConfig,
    pub als: AlsConfig,
    pub events: EventWeights,
    pub tfidf: TfidfConfig,
    pub serve: ServeConfig,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Base URI artifacts are written under (`file://` only)
    pub artifact_base: String,
    /// LMDB directory of the model registry
    pub registry_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            artifact_base: "file://./models/".to_string(),
            registry_path: PathBuf::from("./registry"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, else `$MERLIN_CONFIG`, else
    /// `merlin.toml` when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => env::var("MERLIN_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        let mut builder = config::Config::builder();
        if config_path.exists() {
            builder = builder.add_source(config::File::from(config_path.clone()));
        } else if path.is_some() {
            anyhow::bail!("config file not found: {}", config_path.display());
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MERLIN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| format!("loading configuration from {}", config_path.display()))?;
        let mut config: Self = settings.try_deserialize()?;

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.itemknn.validate()?;
        self.als.validate()?;
        if self.serve.max_k == 0 {
            anyhow::bail!("serve.max_k must be positive");
        }
        Ok(())
    }
}
