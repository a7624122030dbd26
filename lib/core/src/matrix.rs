use serde::{Deserialize, Serialize};
use crate::{Error, Result};

/// Dense row-major `f32` matrix (factor blocks, dense similarity blocks)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// Decoded form checked through [`Matrix::from_vec`]
#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = Error;

    fn try_from(raw: RawMatrix) -> Result<Self> {
        Matrix::from_vec(raw.rows, raw.cols, raw.data)
    }
}

impl Matrix {
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::shape("matrix buffer", rows * cols, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    /// Stack equally sized rows. An empty input gives a 0×0 matrix.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::InvalidDimension {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.cols + j]
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Copy with every row scaled to unit length (`norm + epsilon`)
    #[must_use]
    pub fn normalized_rows(&self) -> Self {
        let mut out = self.clone();
        for i in 0..out.rows {
            crate::simd::l2_normalize_in_place(out.row_mut(i));
        }
        out
    }

    /// Mean over all entries, 0.0 for an empty matrix
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&x| x as f64).sum::<f64>() / self.data.len() as f64
    }

    /// `selfᵀ · self` (cols × cols), the Gram matrix used by ALS
    #[must_use]
    pub fn gram(&self) -> Self {
        let d = self.cols;
        let mut out = Self::zeros(d, d);
        for r in 0..self.rows {
            let row = self.row(r);
            for a in 0..d {
                let ra = row[a];
                if ra == 0.0 {
                    continue;
                }
                let dst = out.row_mut(a);
                for b in 0..d {
                    dst[b] += ra * row[b];
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            Matrix::from_rows(&rows),
            Err(Error::InvalidDimension { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let bytes = bincode::serialize(&(1usize, 2usize, Vec::<f32>::new())).unwrap();
        assert!(bincode::deserialize::<Matrix>(&bytes).is_err());

        let bytes = bincode::serialize(&Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap()).unwrap();
        assert_eq!(bincode::deserialize::<Matrix>(&bytes).unwrap().row(0), &[1.0, 2.0]);
    }

    #[test]
    fn test_gram() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let g = m.gram();
        assert_eq!(g.get(0, 0), 10.0);
        assert_eq!(g.get(0, 1), 14.0);
        assert_eq!(g.get(1, 0), 14.0);
        assert_eq!(g.get(1, 1), 20.0);
    }

    #[test]
    fn test_normalized_rows() {
        let m = Matrix::from_rows(&[vec![3.0, 4.0], vec![0.0, 0.0]]).unwrap();
        let n = m.normalized_rows();
        assert!((n.get(0, 0) - 0.6).abs() < 1e-6);
        assert_eq!(n.row(1), &[0.0, 0.0]);
    }
}
