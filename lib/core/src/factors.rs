use crate::ann::{AnnBackend, AnnIndex, NO_MATCH};
use crate::similarity::ScoredItem;
use crate::{Error, IdentityMap, Matrix, Result};

/// Dense user/item latent factors plus an ANN structure over the normalized
/// item rows. ANN row `r` is item factor row `r`.
#[derive(Debug, Clone)]
pub struct FactorIndex {
    user_factors: Matrix,
    item_factors: Matrix,
    users: IdentityMap,
    items: IdentityMap,
    ann: AnnBackend,
}

impl FactorIndex {
    /// Assemble a loaded model. Only the structural contract between the
    /// blocks is enforced here: equal factor dimensions and one ANN row per
    /// item row. Identity tables may have gaps or point past the factor
    /// blocks; queries treat such rows as misses.
    pub fn new(
        user_factors: Matrix,
        item_factors: Matrix,
        users: IdentityMap,
        items: IdentityMap,
        ann: AnnBackend,
    ) -> Result<Self> {
        if user_factors.cols() != item_factors.cols() && user_factors.rows() > 0 && item_factors.rows() > 0 {
            return Err(Error::InvalidDimension {
                expected: item_factors.cols(),
                actual: user_factors.cols(),
            });
        }
        if ann.len() != item_factors.rows() {
            return Err(Error::shape("ann rows", item_factors.rows(), ann.len()));
        }
        if !ann.is_empty() && ann.dim() != item_factors.cols() {
            return Err(Error::InvalidDimension {
                expected: item_factors.cols(),
                actual: ann.dim(),
            });
        }
        if users.len() != user_factors.rows() {
            tracing::warn!(
                mapped = users.len(),
                rows = user_factors.rows(),
                "user identity table and user factors disagree"
            );
        }
        if items.len() != item_factors.rows() {
            tracing::warn!(
                mapped = items.len(),
                rows = item_factors.rows(),
                "item identity table and item factors disagree"
            );
        }
        Ok(Self {
            user_factors,
            item_factors,
            users,
            items,
            ann,
        })
    }

    #[inline]
    pub fn user_factors(&self) -> &Matrix {
        &self.user_factors
    }

    #[inline]
    pub fn item_factors(&self) -> &Matrix {
        &self.item_factors
    }

    #[inline]
    pub fn users(&self) -> &IdentityMap {
        &self.users
    }

    #[inline]
    pub fn items(&self) -> &IdentityMap {
        &self.items
    }

    #[inline]
    pub fn ann(&self) -> &AnnBackend {
        &self.ann
    }

    /// Top-`k` items for a user by cosine between the normalized user row
    /// and the normalized item rows.
    ///
    /// Unknown users and users whose row lies outside the factor block get an
    /// empty list so the caller can fall back to a non-personalized one. ANN
    /// hits that are padding, out of range or land on an unmapped item row are
    /// dropped, so fewer than `k` items may come back.
    pub fn recommend_for_user(&self, user_id: &str, k: usize) -> Vec<ScoredItem> {
        let Some(row) = self.users.row_of(user_id) else {
            return Vec::new();
        };
        if row >= self.user_factors.rows() || k == 0 {
            return Vec::new();
        }

        let mut query = self.user_factors.row(row).to_vec();
        crate::simd::l2_normalize_in_place(&mut query);

        self.ann
            .search(&query, k)
            .into_iter()
            .filter(|hit| hit.row != NO_MATCH && hit.row >= 0)
            .filter_map(|hit| {
                self.items
                    .id_of(hit.row as usize)
                    .map(|id| (id.to_string(), hit.score))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::{AnnConfig, AnnKind};

    fn index_with(users: IdentityMap, items: IdentityMap, kind: AnnKind) -> FactorIndex {
        let user_factors = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 2.0]]).unwrap();
        let item_factors =
            Matrix::from_rows(&[vec![2.0, 0.1], vec![0.1, 3.0], vec![1.0, 1.0]]).unwrap();
        let config = AnnConfig {
            kind,
            ..Default::default()
        };
        let ann = AnnBackend::build(&item_factors.normalized_rows(), &config);
        FactorIndex::new(user_factors, item_factors, users, items, ann).unwrap()
    }

    #[test]
    fn test_recommend_ranked() {
        let index = index_with(
            IdentityMap::from_ordered(["u0", "u1"]),
            IdentityMap::from_ordered(["i0", "i1", "i2"]),
            AnnKind::Flat,
        );
        let recs = index.recommend_for_user("u1", 2);
        let ids: Vec<&str> = recs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
        assert!(recs[0].1 >= recs[1].1);
    }

    #[test]
    fn test_unknown_or_out_of_bounds_user() {
        let index = index_with(
            IdentityMap::from_pairs(vec![("u0", 0), ("ghost", 7)]),
            IdentityMap::from_ordered(["i0", "i1", "i2"]),
            AnnKind::Flat,
        );
        assert!(index.recommend_for_user("nobody", 3).is_empty());
        assert!(index.recommend_for_user("ghost", 3).is_empty());
        assert_eq!(index.recommend_for_user("u0", 3).len(), 3);
    }

    #[test]
    fn test_padding_and_unmapped_rows_are_skipped() {
        // item row 1 has no identifier
        let index = index_with(
            IdentityMap::from_ordered(["u0", "u1"]),
            IdentityMap::from_pairs(vec![("i0", 0), ("i2", 2)]),
            AnnKind::Flat,
        );
        let recs = index.recommend_for_user("u0", 10);
        let ids: Vec<&str> = recs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["i0", "i2"]);
    }

    #[test]
    fn test_rejects_misaligned_ann() {
        let item_factors = Matrix::from_rows(&[vec![1.0, 0.0]]).unwrap();
        let ann = AnnBackend::build(
            &Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(),
            &AnnConfig::default(),
        );
        let result = FactorIndex::new(
            Matrix::zeros(0, 2),
            item_factors,
            IdentityMap::new(),
            IdentityMap::from_ordered(["i0"]),
            ann,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_ann_of_other_width() {
        let item_factors = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let ann = AnnBackend::build(
            &Matrix::from_rows(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).unwrap(),
            &AnnConfig::default(),
        );
        let result = FactorIndex::new(
            Matrix::zeros(0, 2),
            item_factors,
            IdentityMap::new(),
            IdentityMap::from_ordered(["i0", "i1"]),
            ann,
        );
        assert!(matches!(result, Err(Error::InvalidDimension { expected: 2, actual: 3 })));
    }
}
