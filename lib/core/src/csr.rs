use serde::{Deserialize, Serialize};
use crate::{Error, Result};

/// Compressed sparse row matrix.
///
/// Row `i` owns `indices[indptr[i]..indptr[i + 1]]` and the matching slice of
/// `data`. `indptr` has `n_rows + 1` entries, starts at 0, never decreases and
/// ends at `nnz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl CsrMatrix {
    /// Assemble from raw blocks, checking every structural invariant.
    pub fn from_parts(
        n_rows: usize,
        n_cols: usize,
        indptr: Vec<usize>,
        indices: Vec<u32>,
        data: Vec<f32>,
    ) -> Result<Self> {
        if indptr.len() != n_rows + 1 {
            return Err(Error::shape("csr row offsets", n_rows + 1, indptr.len()));
        }
        if indptr[0] != 0 {
            return Err(Error::corrupt(format!("csr row offsets start at {}", indptr[0])));
        }
        if let Some(w) = indptr.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::corrupt(format!("csr row offsets decrease at row {}", w)));
        }
        if indices.len() != data.len() {
            return Err(Error::shape("csr neighbor indices", data.len(), indices.len()));
        }
        let nnz = indptr[n_rows];
        if nnz != data.len() {
            return Err(Error::shape("csr stored entries", nnz, data.len()));
        }
        if let Some(&bad) = indices.iter().find(|&&j| j as usize >= n_cols) {
            return Err(Error::corrupt(format!(
                "csr column {} out of range for {} columns",
                bad, n_cols
            )));
        }
        Ok(Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            data,
        })
    }

    /// Build row by row. Entries keep the order they are given in.
    pub fn from_rows<I, R>(n_cols: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (u32, f32)>,
    {
        let mut indptr = vec![0usize];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for row in rows {
            for (j, v) in row {
                indices.push(j);
                data.push(v);
            }
            indptr.push(indices.len());
        }
        Self::from_parts(indptr.len() - 1, n_cols, indptr, indices, data)
    }

    /// Build from `(row, col, value)` triplets, summing duplicates.
    /// Columns within a row end up sorted ascending.
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        triplets: &[(u32, u32, f32)],
    ) -> Result<Self> {
        let mut counts = vec![0usize; n_rows];
        for &(r, c, _) in triplets {
            if r as usize >= n_rows || c as usize >= n_cols {
                return Err(Error::corrupt(format!(
                    "triplet ({}, {}) outside {}x{}",
                    r, c, n_rows, n_cols
                )));
            }
            counts[r as usize] += 1;
        }

        let mut rows: Vec<Vec<(u32, f32)>> = counts.into_iter().map(Vec::with_capacity).collect();
        for &(r, c, v) in triplets {
            rows[r as usize].push((c, v));
        }

        let merged = rows.into_iter().map(|mut row| {
            row.sort_unstable_by_key(|&(c, _)| c);
            let mut out: Vec<(u32, f32)> = Vec::with_capacity(row.len());
            for (c, v) in row {
                match out.last_mut() {
                    Some(last) if last.0 == c => last.1 += v,
                    _ => out.push((c, v)),
                }
            }
            out
        });
        Self::from_rows(n_cols, merged)
    }

    #[inline]
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Column indices and values stored for row `i`
    #[inline]
    #[must_use]
    pub fn row(&self, i: usize) -> (&[u32], &[f32]) {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        (&self.indices[start..end], &self.data[start..end])
    }

    #[inline]
    #[must_use]
    pub fn row_nnz(&self, i: usize) -> usize {
        self.indptr[i + 1] - self.indptr[i]
    }

    #[inline]
    #[must_use]
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.n_cols + 1];
        for &j in &self.indices {
            counts[j as usize + 1] += 1;
        }
        for j in 0..self.n_cols {
            counts[j + 1] += counts[j];
        }

        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0u32; self.nnz()];
        let mut data = vec![0f32; self.nnz()];
        for i in 0..self.n_rows {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                let slot = next[j as usize];
                indices[slot] = i as u32;
                data[slot] = v;
                next[j as usize] += 1;
            }
        }

        Self {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr,
            indices,
            data,
        }
    }

    /// Apply `f` to every stored value
    #[must_use]
    pub fn map_values<F: Fn(f32) -> f32>(&self, f: F) -> Self {
        let mut out = self.clone();
        for v in &mut out.data {
            *v = f(*v);
        }
        out
    }

    /// L2 norm of each row
    #[must_use]
    pub fn row_norms(&self) -> Vec<f32> {
        (0..self.n_rows)
            .map(|i| self.row(i).1.iter().map(|v| v * v).sum::<f32>().sqrt())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_validates_offsets() {
        assert!(CsrMatrix::from_parts(2, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::from_parts(2, 2, vec![1, 1, 1], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::from_parts(2, 2, vec![0, 1, 0], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::from_parts(2, 2, vec![0, 1, 2], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::from_parts(2, 2, vec![0, 1, 1], vec![5], vec![1.0]).is_err());
        assert!(CsrMatrix::from_parts(2, 2, vec![0, 1, 1], vec![1], vec![1.0]).is_ok());
    }

    #[test]
    fn test_triplets_sum_duplicates() {
        let m = CsrMatrix::from_triplets(2, 3, &[(0, 2, 1.0), (0, 0, 0.5), (0, 2, 2.0), (1, 1, 1.0)])
            .unwrap();
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.row(0), (&[0u32, 2][..], &[0.5f32, 3.0][..]));
        assert_eq!(m.row(1), (&[1u32][..], &[1.0f32][..]));
    }

    #[test]
    fn test_transpose() {
        let m = CsrMatrix::from_triplets(2, 3, &[(0, 0, 1.0), (0, 2, 2.0), (1, 2, 3.0)]).unwrap();
        let t = m.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.row(0), (&[0u32][..], &[1.0f32][..]));
        assert_eq!(t.row_nnz(1), 0);
        assert_eq!(t.row(2), (&[0u32, 1][..], &[2.0f32, 3.0][..]));
        assert_eq!(t.transpose(), m);
    }
}
