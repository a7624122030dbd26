//! MovieLens rating dumps as implicit positives.
//!
//! Two layouts are understood inside one directory:
//!
//! - `ratings.csv` (`userId,movieId,rating,...`) with an optional `links.csv`
//!   (`movieId,imdbId,...`). Linked movies are keyed by their IMDb id
//!   (`tt` plus seven zero-padded digits), unlinked ones by `movieId`.
//! - `u.data` (ML-100K): tab separated `user item rating timestamp`, no
//!   header, keyed by `movieId`.
//!
//! `ratings.csv` wins when both are present.

use ahash::AHashMap;
use merlin_core::{Error, Result};
use serde::Deserialize;
use std::io;
use std::path::Path;

pub const RATINGS_CSV: &str = "ratings.csv";
pub const LINKS_CSV: &str = "links.csv";
pub const UDATA: &str = "u.data";

#[derive(Debug, Deserialize)]
struct CsvRating {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "movieId")]
    movie_id: i64,
    rating: f32,
}

#[derive(Debug, Deserialize)]
struct CsvLink {
    #[serde(rename = "movieId")]
    movie_id: i64,
    #[serde(rename = "imdbId")]
    imdb_id: Option<i64>,
}

/// IMDb title id for a numeric `imdbId`: `114709 -> "tt0114709"`
#[must_use]
pub fn tt_from_imdb(imdb_id: i64) -> Option<String> {
    (imdb_id >= 0).then(|| format!("tt{:07}", imdb_id))
}

fn csv_error(path: &Path, e: csv::Error) -> Error {
    Error::Serialization(format!("{}: {}", path.display(), e))
}

/// `(user_id, item_id)` for every rating at or above `threshold` in the
/// MovieLens dump under `dir`
pub fn load_interactions(dir: &Path, threshold: f32) -> Result<Vec<(String, String)>> {
    let ratings_csv = dir.join(RATINGS_CSV);
    if ratings_csv.exists() {
        return load_csv(dir, threshold);
    }
    let udata = dir.join(UDATA);
    if udata.exists() {
        return load_udata(&udata, threshold);
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!(
            "no MovieLens files in {} (looked for {} and {})",
            dir.display(),
            RATINGS_CSV,
            UDATA
        ),
    )))
}

fn load_links(path: &Path) -> Result<AHashMap<i64, String>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let mut links = AHashMap::new();
    for record in reader.deserialize::<CsvLink>() {
        let link = record.map_err(|e| csv_error(path, e))?;
        if let Some(tt) = link.imdb_id.and_then(tt_from_imdb) {
            links.insert(link.movie_id, tt);
        }
    }
    tracing::info!(path = %path.display(), links = links.len(), "read imdb links");
    Ok(links)
}

fn load_csv(dir: &Path, threshold: f32) -> Result<Vec<(String, String)>> {
    let path = dir.join(RATINGS_CSV);
    let links_path = dir.join(LINKS_CSV);
    let links = if links_path.exists() {
        load_links(&links_path)?
    } else {
        tracing::info!(dir = %dir.display(), "no links.csv, keeping movieId item ids");
        AHashMap::new()
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|e| csv_error(&path, e))?;
    let mut total = 0usize;
    let mut positives = Vec::new();
    for record in reader.deserialize::<CsvRating>() {
        let row = record.map_err(|e| csv_error(&path, e))?;
        total += 1;
        if row.rating < threshold {
            continue;
        }
        let item_id = links
            .get(&row.movie_id)
            .cloned()
            .unwrap_or_else(|| row.movie_id.to_string());
        positives.push((row.user_id.to_string(), item_id));
    }
    tracing::info!(path = %path.display(), ratings = total, positives = positives.len(), threshold, "read movielens ratings");
    Ok(positives)
}

fn load_udata(path: &Path, threshold: f32) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    let mut total = 0usize;
    let mut positives = Vec::new();
    for record in reader.deserialize::<(i64, i64, f32, i64)>() {
        let (user, movie, rating, _timestamp) = record.map_err(|e| csv_error(path, e))?;
        total += 1;
        if rating >= threshold {
            positives.push((user.to_string(), movie.to_string()));
        }
    }
    tracing::info!(path = %path.display(), ratings = total, positives = positives.len(), threshold, "read ml-100k ratings");
    Ok(positives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn pair(user: &str, item: &str) -> (String, String) {
        (user.to_string(), item.to_string())
    }

    #[test]
    fn test_tt_padding() {
        assert_eq!(tt_from_imdb(114709).as_deref(), Some("tt0114709"));
        assert_eq!(tt_from_imdb(1375666).as_deref(), Some("tt1375666"));
        assert_eq!(tt_from_imdb(-3), None);
    }

    #[test]
    fn test_ratings_csv_with_links() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(RATINGS_CSV),
            "userId,movieId,rating,timestamp\n1,1,4.0,964982703\n1,3,5.0,964981247\n2,1,3.5,964982224\n2,2,4.5,964983815\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(LINKS_CSV),
            "movieId,imdbId,tmdbId\n1,0114709,862\n2,,8844\n",
        )
        .unwrap();

        let rows = load_interactions(dir.path(), 4.0).unwrap();
        assert_eq!(
            rows,
            vec![pair("1", "tt0114709"), pair("1", "3"), pair("2", "2")]
        );
    }

    #[test]
    fn test_ratings_csv_without_links_keeps_movie_ids() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RATINGS_CSV), "userId,movieId,rating\n7,42,4.0\n").unwrap();
        assert_eq!(load_interactions(dir.path(), 4.0).unwrap(), vec![pair("7", "42")]);
    }

    #[test]
    fn test_udata_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(UDATA),
            "196\t242\t3\t881250949\n186\t302\t4\t891717742\n22\t377\t5\t878887116\n",
        )
        .unwrap();
        assert_eq!(
            load_interactions(dir.path(), 4.0).unwrap(),
            vec![pair("186", "302"), pair("22", "377")]
        );
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_interactions(dir.path(), 4.0), Err(Error::Io(_))));
    }

    #[test]
    fn test_malformed_rating_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RATINGS_CSV), "userId,movieId,rating\n1,abc,4.0\n").unwrap();
        assert!(matches!(load_interactions(dir.path(), 4.0), Err(Error::Serialization(_))));
    }
}
