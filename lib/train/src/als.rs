// Implicit-feedback alternating least squares (Hu, Koren & Volinsky).

use merlin_core::{CsrMatrix, Error, Matrix, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::Instant;
use crate::config::AlsConfig;

fn random_factors(rows: usize, factors: usize, rng: &mut StdRng) -> Matrix {
    let mut m = Matrix::zeros(rows, factors);
    for v in m.as_mut_slice() {
        *v = rng.random::<f32>() * 0.01;
    }
    m
}

/// In-place Cholesky solve of the symmetric positive definite `a · x = b`.
/// `a` is row-major `n × n`; its lower triangle is overwritten with the
/// factor and `b` with the solution.
fn cholesky_solve(a: &mut [f64], b: &mut [f64], n: usize) -> Result<()> {
    for j in 0..n {
        let mut diag = a[j * n + j];
        for k in 0..j {
            diag -= a[j * n + k] * a[j * n + k];
        }
        if diag <= 0.0 {
            return Err(Error::InvalidConfig(
                "ALS normal equations are not positive definite; raise regularization".into(),
            ));
        }
        let diag = diag.sqrt();
        a[j * n + j] = diag;
        for i in (j + 1)..n {
            let mut v = a[i * n + j];
            for k in 0..j {
                v -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = v / diag;
        }
    }
    // L y = b
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= a[i * n + k] * b[k];
        }
        b[i] = v / a[i * n + i];
    }
    // Lᵀ x = y
    for i in (0..n).rev() {
        let mut v = b[i];
        for k in (i + 1)..n {
            v -= a[k * n + i] * b[k];
        }
        b[i] = v / a[i * n + i];
    }
    Ok(())
}

/// Solve every row of `confidence` against the fixed factors of the other side.
///
/// For row `r`: `(YᵀY + Yᵀ(Cʳ − I)Y + λI) x = YᵀCʳp`, with `p = 1` on observed
/// entries and `Cʳ` their confidences.
fn solve_side(confidence: &CsrMatrix, fixed: &Matrix, regularization: f32) -> Result<Matrix> {
    let f = fixed.cols();
    let gram: Vec<f64> = fixed.gram().as_slice().iter().map(|&v| v as f64).collect();
    let reg = regularization as f64;

    let mut out = Matrix::zeros(confidence.n_rows(), f);
    out.as_mut_slice()
        .par_chunks_mut(f)
        .enumerate()
        .try_for_each(|(r, x)| -> Result<()> {
            let mut a = gram.clone();
            let mut b = vec![0.0f64; f];
            let (cols, confs) = confidence.row(r);
            for (&j, &c) in cols.iter().zip(confs) {
                let c = c as f64;
                let y = fixed.row(j as usize);
                for p in 0..f {
                    let yp = y[p] as f64;
                    b[p] += c * yp;
                    let scaled = (c - 1.0) * yp;
                    for q in 0..f {
                        a[p * f + q] += scaled * y[q] as f64;
                    }
                }
            }
            for p in 0..f {
                a[p * f + p] += reg;
            }
            cholesky_solve(&mut a, &mut b, f)?;
            for (dst, v) in x.iter_mut().zip(&b) {
                *dst = *v as f32;
            }
            Ok(())
        })?;
    Ok(out)
}

/// Fit implicit ALS on a weighted matrix.
///
/// Confidence is `1 + alpha · w` on stored entries. Returns
/// `(row_factors, col_factors)` of the matrix given: pass item×user to get
/// item factors first.
pub fn fit(weights: &CsrMatrix, config: &AlsConfig) -> Result<(Matrix, Matrix)> {
    config.validate()?;
    let alpha = config.alpha;
    let confidence = weights.map_values(|w| 1.0 + alpha * w);
    let confidence_t = confidence.transpose();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut row_factors = random_factors(weights.n_rows(), config.factors, &mut rng);
    let mut col_factors = random_factors(weights.n_cols(), config.factors, &mut rng);

    let started = Instant::now();
    for iteration in 0..config.iterations {
        let t0 = Instant::now();
        row_factors = solve_side(&confidence, &col_factors, config.regularization)?;
        col_factors = solve_side(&confidence_t, &row_factors, config.regularization)?;
        tracing::debug!(
            iteration = iteration + 1,
            of = config.iterations,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "als iteration"
        );
    }
    tracing::info!(
        rows = weights.n_rows(),
        cols = weights.n_cols(),
        nnz = weights.nnz(),
        factors = config.factors,
        iterations = config.iterations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fitted implicit als"
    );
    Ok((row_factors, col_factors))
}
