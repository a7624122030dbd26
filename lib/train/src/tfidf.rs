use ahash::AHashMap;
use merlin_core::simd::l2_normalize_in_place;
use rayon::prelude::*;
use crate::config::TfidfConfig;
use crate::input::CatalogRow;

/// Lowercase, split on whitespace and punctuation, drop single characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|s| s.chars().count() > 1)
        .collect()
}

fn terms(text: &str, bigrams: bool) -> Vec<String> {
    let tokens = tokenize(text);
    let mut out = tokens.clone();
    if bigrams {
        out.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    }
    out
}

/// Smoothed TF-IDF vectorizer with L2-normalized output rows
#[derive(Debug, Clone)]
pub struct TfidfModel {
    vocabulary: Vec<String>,
    index: AHashMap<String, usize>,
    idf: Vec<f32>,
    bigrams: bool,
}

impl TfidfModel {
    /// Learn the vocabulary and document frequencies of `docs`.
    ///
    /// When the vocabulary exceeds `max_features`, the terms with the highest
    /// corpus frequency are kept. Columns are ordered alphabetically.
    pub fn fit<S: AsRef<str>>(docs: &[S], config: &TfidfConfig) -> Self {
        let mut doc_freq: AHashMap<String, usize> = AHashMap::new();
        let mut term_freq: AHashMap<String, usize> = AHashMap::new();
        for doc in docs {
            let mut seen: Vec<String> = terms(doc.as_ref(), config.bigrams);
            for t in &seen {
                *term_freq.entry(t.clone()).or_insert(0) += 1;
            }
            seen.sort_unstable();
            seen.dedup();
            for t in seen {
                *doc_freq.entry(t).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
        if ranked.len() > config.max_features {
            ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(config.max_features);
        }
        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        vocabulary.sort_unstable();

        let n = docs.len() as f32;
        let idf = vocabulary
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        tracing::debug!(docs = docs.len(), vocabulary = vocabulary.len(), "fitted tf-idf");
        Self {
            vocabulary,
            index,
            idf,
            bigrams: config.bigrams,
        }
    }

    #[must_use]
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.vocabulary.len()
    }

    /// Dense TF-IDF row for `doc`; out-of-vocabulary terms are ignored
    #[must_use]
    pub fn transform(&self, doc: &str) -> Vec<f32> {
        let mut row = vec![0.0f32; self.vocabulary.len()];
        for t in terms(doc, self.bigrams) {
            if let Some(&col) = self.index.get(&t) {
                row[col] += 1.0;
            }
        }
        for (v, idf) in row.iter_mut().zip(&self.idf) {
            *v *= idf;
        }
        l2_normalize_in_place(&mut row);
        row
    }
}

/// Catalog rows → ordered `(item_id, tf-idf vector)` pairs
pub fn content_vectors(rows: &[CatalogRow], config: &TfidfConfig) -> Vec<(String, Vec<f32>)> {
    let docs: Vec<String> = rows.iter().map(CatalogRow::document).collect();
    let model = TfidfModel::fit(&docs, config);
    rows.par_iter()
        .zip(docs.par_iter())
        .map(|(row, doc)| (row.item_id.clone(), model.transform(doc)))
        .collect()
}
