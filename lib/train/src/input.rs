// JSON Lines training inputs: ratings, events and catalog rows.

use merlin_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use crate::config::EventWeights;

/// Identifiers may arrive as strings or as integers (MovieLens user ids)
fn flexible_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RatingRow {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: String,
    #[serde(deserialize_with = "flexible_id")]
    pub item_id: String,
    pub rating: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRow {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: String,
    #[serde(deserialize_with = "flexible_id")]
    pub item_id: String,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogRow {
    #[serde(deserialize_with = "flexible_id")]
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CatalogRow {
    /// Title, overview and genres joined into one document
    #[must_use]
    pub fn document(&self) -> String {
        format!("{} {} {}", self.title, self.overview, self.genres.join(" "))
    }
}

/// Parse one JSON object per non-blank line
pub fn read_jsonl<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| {
            Error::Serialization(format!("{}:{}: {}", path.display(), lineno + 1, e))
        })?;
        rows.push(row);
    }
    tracing::info!(path = %path.display(), rows = rows.len(), "read training input");
    Ok(rows)
}

/// `(user_id, item_id)` for every rating at or above `threshold`
#[must_use]
pub fn positive_interactions(rows: &[RatingRow], threshold: f32) -> Vec<(String, String)> {
    let positives: Vec<(String, String)> = rows
        .iter()
        .filter(|r| r.rating >= threshold)
        .map(|r| (r.user_id.clone(), r.item_id.clone()))
        .collect();
    tracing::info!(
        ratings = rows.len(),
        positives = positives.len(),
        threshold,
        "thresholded ratings"
    );
    positives
}

/// `(user_id, item_id, weight)` with weights looked up by event type
#[must_use]
pub fn weighted_events(rows: &[EventRow], weights: &EventWeights) -> Vec<(String, String, f32)> {
    rows.iter()
        .map(|r| (r.user_id.clone(), r.item_id.clone(), weights.weight(&r.event_type)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_ratings_with_numeric_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user_id": 1, "item_id": "tt0111161", "rating": 5.0}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"user_id": "2", "item_id": 42, "rating": 3.5}}"#).unwrap();

        let rows: Vec<RatingRow> = read_jsonl(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, "1");
        assert_eq!(rows[1].item_id, "42");

        let pos = positive_interactions(&rows, 4.0);
        assert_eq!(pos, vec![("1".to_string(), "tt0111161".to_string())]);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user_id": "u", "item_id": "i", "event_type": "view"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        let err = read_jsonl::<EventRow, _>(file.path()).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_weighted_events_and_documents() {
        let rows = vec![
            EventRow { user_id: "u".into(), item_id: "i".into(), event_type: "like".into() },
            EventRow { user_id: "u".into(), item_id: "j".into(), event_type: "hover".into() },
        ];
        let w = weighted_events(&rows, &EventWeights::default());
        assert_eq!(w[0].2, 1.0);
        assert_eq!(w[1].2, 0.1);

        let row: CatalogRow =
            serde_json::from_str(r#"{"item_id":"m1","title":"Heat","genres":["Crime","Drama"]}"#).unwrap();
        assert_eq!(row.document(), "Heat  Crime Drama");
    }
}
