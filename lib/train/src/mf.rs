use ahash::AHashMap;
use merlin_core::{AnnBackend, CsrMatrix, Error, Result};
use merlin_storage::{ArtifactPayload, Metrics};
use crate::als;
use crate::config::AlsConfig;
use crate::orientation::{resolve_orientation, validate_shapes, FactorShape};
use crate::publish::TrainedModel;

/// Identifiers in first-appearance order with their row lookup
#[derive(Default)]
struct Interner<'a> {
    ids: Vec<&'a str>,
    rows: AHashMap<&'a str, u32>,
}

impl<'a> Interner<'a> {
    fn intern(&mut self, id: &'a str) -> u32 {
        if let Some(&row) = self.rows.get(id) {
            return row;
        }
        let row = self.ids.len() as u32;
        self.ids.push(id);
        self.rows.insert(id, row);
        row
    }

    fn to_pairs(&self) -> Vec<(String, i64)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(row, id)| (id.to_string(), row as i64))
            .collect()
    }
}

/// Matrix factorization over weighted `(user_id, item_id, weight)` events.
///
/// Duplicate pairs have their weights summed. ALS is fitted on the
/// item×user matrix; its output is checked against the user/item counts
/// before anything is built on top of it.
pub fn train_mf(events: &[(String, String, f32)], config: &AlsConfig) -> Result<TrainedModel> {
    config.validate()?;
    if events.is_empty() {
        return Err(Error::EmptyTrainingSet("no events".into()));
    }

    let mut users = Interner::default();
    let mut items = Interner::default();
    let triplets: Vec<(u32, u32, f32)> = events
        .iter()
        .map(|(u, i, w)| (users.intern(u), items.intern(i), *w))
        .collect();
    let (num_users, num_items) = (users.ids.len(), items.ids.len());
    tracing::info!(
        events = events.len(),
        users = num_users,
        items = num_items,
        "built weighted interaction matrix"
    );

    let user_items = CsrMatrix::from_triplets(num_users, num_items, &triplets)?;
    let (row_factors, col_factors) = als::fit(&user_items.transpose(), config)?;

    let shape = FactorShape {
        num_users,
        num_items,
        users_len: users.ids.len(),
        items_len: items.ids.len(),
    };
    let (user_factors, item_factors) = resolve_orientation(col_factors, row_factors, &shape)?;
    validate_shapes(&user_factors, &item_factors, &shape)?;

    let ann = AnnBackend::build(&item_factors.normalized_rows(), &config.ann);

    let mut metrics = Metrics::new();
    metrics.insert("num_users".into(), user_factors.rows() as f64);
    metrics.insert("num_items".into(), item_factors.rows() as f64);
    metrics.insert("factors".into(), config.factors as f64);
    metrics.insert("reg".into(), config.regularization as f64);
    metrics.insert("alpha".into(), config.alpha as f64);
    metrics.insert("iters".into(), config.iterations as f64);
    tracing::info!(num_users, num_items, ann = ?ann.kind(), "trained matrix factorization");

    Ok(TrainedModel {
        payload: ArtifactPayload::Factors {
            user_factors,
            item_factors,
            user_to_index: users.to_pairs(),
            item_to_index: items.to_pairs(),
            ann,
        },
        metrics,
    })
}
