use merlin_core::{Error, Matrix, Result};

/// Counts the factor blocks must agree with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorShape {
    /// Rows of the training matrix on the user side
    pub num_users: usize,
    /// Columns of the training matrix on the item side
    pub num_items: usize,
    /// Length of the user identifier list
    pub users_len: usize,
    /// Length of the item identifier list
    pub items_len: usize,
}

fn matches(first: usize, second: usize, users: usize, items: usize) -> Option<bool> {
    if (first, second) == (users, items) {
        Some(false)
    } else if (first, second) == (items, users) {
        Some(true)
    } else {
        None
    }
}

/// Decide which of two factor blocks is the user side.
///
/// `first` is tried as users and `second` as items. Row counts are compared
/// against the matrix shape, then against the identifier list lengths; the
/// blocks are swapped when only the swapped reading fits. Nothing is
/// returned unless one reading is consistent.
pub fn resolve_orientation(first: Matrix, second: Matrix, shape: &FactorShape) -> Result<(Matrix, Matrix)> {
    let (a, b) = (first.rows(), second.rows());
    let swap = matches(a, b, shape.num_users, shape.num_items)
        .or_else(|| matches(a, b, shape.users_len, shape.items_len))
        .ok_or(Error::OrientationUnresolvable {
            first_rows: a,
            second_rows: b,
            num_users: shape.num_users,
            num_items: shape.num_items,
        })?;

    if swap {
        tracing::warn!(first_rows = a, second_rows = b, "factor blocks arrived swapped");
        Ok((second, first))
    } else {
        Ok((first, second))
    }
}

/// `user_factors.rows == num_users == users_len` and the same for items
pub fn validate_shapes(user_factors: &Matrix, item_factors: &Matrix, shape: &FactorShape) -> Result<()> {
    if user_factors.rows() != shape.num_users {
        return Err(Error::shape("user factor rows", shape.num_users, user_factors.rows()));
    }
    if shape.users_len != shape.num_users {
        return Err(Error::shape("user identifiers", shape.num_users, shape.users_len));
    }
    if item_factors.rows() != shape.num_items {
        return Err(Error::shape("item factor rows", shape.num_items, item_factors.rows()));
    }
    if shape.items_len != shape.num_items {
        return Err(Error::shape("item identifiers", shape.num_items, shape.items_len));
    }
    Ok(())
}
