use ahash::AHashMap;

/// Bijection between external identifiers and dense row indices.
///
/// Built either from an ordered identifier list (position == row) or from
/// `(identifier, row)` pairs. Pair tables need not be contiguous or sorted:
/// the inverse table is sized to `max(row) + 1` and rows nobody maps to stay
/// `None`. An absent slot is a valid state and every lookup treats it as a
/// miss.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    by_id: AHashMap<String, usize>,
    by_row: Vec<Option<String>>,
}

impl IdentityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Position in `ids` defines the row. A repeated identifier keeps its
    /// first row; later copies leave their slot empty.
    #[must_use]
    pub fn from_ordered<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (row, id) in ids.into_iter().enumerate() {
            let id = id.into();
            if map.by_id.contains_key(&id) {
                tracing::warn!(%id, row, "duplicate identifier in ordered table, keeping first row");
                map.by_row.push(None);
                continue;
            }
            map.by_id.insert(id.clone(), row);
            map.by_row.push(Some(id));
        }
        map
    }

    /// Materialize a dense inverse table from sparse `(identifier, row)` pairs.
    /// Negative rows are dropped. The first pair wins both ways: a repeated
    /// identifier keeps its first row, and a row claimed twice keeps its
    /// first identifier.
    #[must_use]
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (id, row) in pairs {
            let id = id.into();
            if row < 0 {
                tracing::warn!(%id, row, "ignoring identity pair with negative row");
                continue;
            }
            let row = row as usize;
            if map.by_id.contains_key(&id) {
                tracing::warn!(%id, row, "duplicate identifier in pair table, keeping first row");
                continue;
            }
            if row >= map.by_row.len() {
                map.by_row.resize(row + 1, None);
            }
            if let Some(owner) = &map.by_row[row] {
                tracing::warn!(%id, %owner, row, "row already mapped, keeping first identifier");
                continue;
            }
            map.by_row[row] = Some(id.clone());
            map.by_id.insert(id, row);
        }
        map
    }

    #[inline]
    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Identifier stored at `row`; `None` for gaps and out-of-range rows
    #[inline]
    pub fn id_of(&self, row: usize) -> Option<&str> {
        self.by_row.get(row).and_then(|slot| slot.as_deref())
    }

    /// Number of mapped identifiers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Size of the inverse table (`max(row) + 1`), including gaps
    #[inline]
    #[must_use]
    pub fn slots(&self) -> usize {
        self.by_row.len()
    }

    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.by_row.len() == self.by_id.len()
    }

    /// Identifiers in row order; `None` marks a gap
    pub fn slots_iter(&self) -> impl Iterator<Item = Option<&str>> {
        self.by_row.iter().map(|slot| slot.as_deref())
    }

    /// `(identifier, row)` pairs sorted by row
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, i64)> {
        self.by_row
            .iter()
            .enumerate()
            .filter_map(|(row, slot)| slot.as_ref().map(|id| (id.clone(), row as i64)))
            .collect()
    }
}
