use merlin_core::{AnnConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item-KNN training knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemKnnConfig {
    /// Items with fewer positives are dropped
    pub min_item_count: usize,
    /// Users with fewer positives are dropped
    pub min_user_count: usize,
    /// Neighbors kept per item
    pub top_k: usize,
    /// Ratings at or above this count as positive interactions
    pub implicit_threshold: f32,
}

impl Default for ItemKnnConfig {
    fn default() -> Self {
        Self {
            min_item_count: 5,
            min_user_count: 5,
            top_k: 200,
            implicit_threshold: 4.0,
        }
    }
}

impl ItemKnnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("itemknn.top_k must be positive".into()));
        }
        Ok(())
    }
}

/// Implicit ALS hyperparameters and the ANN built over item factors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlsConfig {
    pub factors: usize,
    pub regularization: f32,
    pub alpha: f32,
    pub iterations: usize,
    pub seed: u64,
    pub ann: AnnConfig,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            factors: 64,
            regularization: 0.05,
            alpha: 40.0,
            iterations: 20,
            seed: 42,
            ann: AnnConfig::default(),
        }
    }
}

impl AlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.factors == 0 {
            return Err(Error::InvalidConfig("als.factors must be positive".into()));
        }
        if self.regularization <= 0.0 {
            return Err(Error::InvalidConfig("als.regularization must be positive".into()));
        }
        if self.alpha < 0.0 {
            return Err(Error::InvalidConfig("als.alpha must not be negative".into()));
        }
        Ok(())
    }
}

/// Event type → implicit feedback weight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventWeights {
    pub weights: BTreeMap<String, f32>,
    /// Weight of event types missing from `weights`
    pub unknown: f32,
}

impl Default for EventWeights {
    fn default() -> Self {
        let weights = [("view", 0.1), ("click", 0.3), ("like", 1.0), ("save", 1.2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            weights,
            unknown: 0.1,
        }
    }
}

impl EventWeights {
    #[must_use]
    pub fn weight(&self, event_type: &str) -> f32 {
        self.weights.get(event_type).copied().unwrap_or(self.unknown)
    }
}

/// Content vectorizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfConfig {
    /// Vocabulary cap, most frequent terms kept
    pub max_features: usize,
    /// Also index adjacent token pairs
    pub bigrams: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            max_features: 50_000,
            bigrams: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_weights() {
        let w = EventWeights::default();
        assert_eq!(w.weight("save"), 1.2);
        assert_eq!(w.weight("like"), 1.0);
        assert_eq!(w.weight("share"), 0.1);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: AlsConfig = serde_json::from_str(r#"{"factors": 8, "ann": {"kind": "hnsw"}}"#).unwrap();
        assert_eq!(cfg.factors, 8);
        assert_eq!(cfg.iterations, 20);
        assert_eq!(cfg.ann.kind, merlin_core::AnnKind::Hnsw);
        assert!(AlsConfig { factors: 0, ..AlsConfig::default() }.validate().is_err());
    }
}
