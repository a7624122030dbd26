// Item-to-item cosine neighbors, from content vectors or from co-occurrence.

use ahash::AHashMap;
use merlin_core::simd::dot_product_simd;
use merlin_core::{CsrMatrix, Error, Matrix, Result};
use merlin_storage::{ArtifactPayload, Metrics};
use rayon::prelude::*;
use std::collections::BTreeSet;
use crate::config::ItemKnnConfig;
use crate::publish::TrainedModel;

/// Full pairwise cosine over content vectors, kept dense.
///
/// Vectors must share one dimension. Zero vectors score 0 against
/// everything, themselves included.
pub fn train_content(items: &[(String, Vec<f32>)]) -> Result<TrainedModel> {
    if items.is_empty() {
        return Err(Error::EmptyTrainingSet("no content vectors".into()));
    }
    let mut seen = BTreeSet::new();
    for (id, _) in items {
        if !seen.insert(id.as_str()) {
            return Err(Error::InvalidConfig(format!("duplicate item id: {}", id)));
        }
    }

    let rows: Vec<&[f32]> = items.iter().map(|(_, v)| v.as_slice()).collect();
    let normalized = Matrix::from_rows(&rows)?.normalized_rows();
    let n = normalized.rows();

    let mut sims = Matrix::zeros(n, n);
    if n > 0 {
        sims.as_mut_slice()
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, out)| {
                let a = normalized.row(i);
                for (j, slot) in out.iter_mut().enumerate() {
                    *slot = dot_product_simd(a, normalized.row(j));
                }
            });
    }

    let mut metrics = Metrics::new();
    metrics.insert("avg_sim".into(), sims.mean());
    metrics.insert("n_items".into(), n as f64);
    tracing::info!(n_items = n, dim = normalized.cols(), "trained content item-knn");

    Ok(TrainedModel {
        payload: ArtifactPayload::Dense {
            item_ids: items.iter().map(|(id, _)| id.clone()).collect(),
            sims,
        },
        metrics,
    })
}

/// Keep rows whose item and user both reach their minimum positive counts.
/// Counts are taken over the raw multiset, before any filtering.
fn filter_min_counts<'a>(
    interactions: &'a [(String, String)],
    config: &ItemKnnConfig,
) -> Vec<(&'a str, &'a str)> {
    let mut item_counts: AHashMap<&str, usize> = AHashMap::new();
    let mut user_counts: AHashMap<&str, usize> = AHashMap::new();
    for (user, item) in interactions {
        *item_counts.entry(item.as_str()).or_insert(0) += 1;
        *user_counts.entry(user.as_str()).or_insert(0) += 1;
    }
    interactions
        .iter()
        .filter(|(user, item)| {
            item_counts[item.as_str()] >= config.min_item_count
                && user_counts[user.as_str()] >= config.min_user_count
        })
        .map(|(u, i)| (u.as_str(), i.as_str()))
        .collect()
}

/// Top `limit` cosine neighbors of `item`, score descending, ties to the
/// lower row. `scratch` is a dense accumulator sized to the item count and is
/// left zeroed on return.
fn item_neighbors(
    item: usize,
    item_users: &CsrMatrix,
    user_items: &CsrMatrix,
    norms: &[f32],
    limit: usize,
    scratch: &mut [f32],
) -> Vec<(u32, f32)> {
    let mut touched: Vec<u32> = Vec::new();
    let (users, weights) = item_users.row(item);
    for (&u, &w) in users.iter().zip(weights) {
        let (items, values) = user_items.row(u as usize);
        for (&j, &v) in items.iter().zip(values) {
            if scratch[j as usize] == 0.0 {
                touched.push(j);
            }
            scratch[j as usize] += w * v;
        }
    }

    let mut scored: Vec<(u32, f32)> = touched
        .into_iter()
        .map(|j| {
            let dot = std::mem::take(&mut scratch[j as usize]);
            let denom = norms[item] * norms[j as usize];
            let score = if denom > 0.0 { dot / denom } else { 0.0 };
            (j, score)
        })
        .collect();

    let by_score = |a: &(u32, f32), b: &(u32, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
    if scored.len() > limit {
        scored.select_nth_unstable_by(limit, by_score);
        scored.truncate(limit);
    }
    scored.sort_unstable_by(by_score);
    scored
}

/// Co-occurrence item-KNN over implicit `(user_id, item_id)` positives.
///
/// Ids are sorted, the user×item incidence is binary, and each item keeps
/// at most `top_k` neighbors, itself excluded.
pub fn train_interactions(
    interactions: &[(String, String)],
    config: &ItemKnnConfig,
) -> Result<TrainedModel> {
    config.validate()?;
    let kept = filter_min_counts(interactions, config);
    if kept.is_empty() {
        return Err(Error::EmptyTrainingSet(format!(
            "no interactions left after min-count filter (items >= {}, users >= {})",
            config.min_item_count, config.min_user_count
        )));
    }

    let users: Vec<&str> = kept.iter().map(|(u, _)| *u).collect::<BTreeSet<_>>().into_iter().collect();
    let items: Vec<&str> = kept.iter().map(|(_, i)| *i).collect::<BTreeSet<_>>().into_iter().collect();
    let user_row: AHashMap<&str, u32> = users.iter().enumerate().map(|(r, u)| (*u, r as u32)).collect();
    let item_row: AHashMap<&str, u32> = items.iter().enumerate().map(|(r, i)| (*i, r as u32)).collect();
    let (n_users, n_items) = (users.len(), items.len());
    tracing::info!(
        users = n_users,
        items = n_items,
        rows = kept.len(),
        "interactions after min-count filter"
    );

    let triplets: Vec<(u32, u32, f32)> = kept
        .iter()
        .map(|(u, i)| (user_row[u], item_row[i], 1.0))
        .collect();
    let user_items = CsrMatrix::from_triplets(n_users, n_items, &triplets)?.map_values(|_| 1.0);
    let item_users = user_items.transpose();
    let norms = item_users.row_norms();

    let limit = config.top_k + 1;
    let neighbor_rows: Vec<Vec<(u32, f32)>> = (0..n_items)
        .into_par_iter()
        .map_init(
            || vec![0.0f32; n_items],
            |scratch, i| {
                item_neighbors(i, &item_users, &user_items, &norms, limit, scratch)
                    .into_iter()
                    .filter(|&(j, _)| j as usize != i)
                    .take(config.top_k)
                    .collect()
            },
        )
        .collect();

    let graph = CsrMatrix::from_rows(n_items, neighbor_rows)?;
    let avg_sim = if graph.nnz() > 0 {
        graph.data().iter().map(|&s| s as f64).sum::<f64>() / graph.nnz() as f64
    } else {
        0.0
    };

    let mut metrics = Metrics::new();
    metrics.insert("avg_sim".into(), avg_sim);
    metrics.insert("n_items".into(), n_items as f64);
    metrics.insert("n_users".into(), n_users as f64);
    metrics.insert("nnz".into(), graph.nnz() as f64);
    tracing::info!(
        n_items,
        n_users,
        nnz = graph.nnz(),
        top_k = config.top_k,
        "trained co-occurrence item-knn"
    );

    Ok(TrainedModel {
        payload: ArtifactPayload::Sparse {
            item_ids: items.into_iter().map(str::to_string).collect(),
            graph,
        },
        metrics,
    })
}
