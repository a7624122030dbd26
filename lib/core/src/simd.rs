// Inner-product kernels used by cosine similarity, ALS and ANN search.
// AVX2/FMA on x86_64 when the slice is long enough, scalar otherwise.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "x86_64")]
const MIN_DIM_SIZE_AVX: usize = 32;

/// Epsilon added to a norm before dividing by it.
pub const NORM_EPSILON: f32 = 1e-12;

/// Dot product of two equally sized slices. Mismatched lengths yield 0.0.
#[inline]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if a.len() >= MIN_DIM_SIZE_AVX
            && is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
        {
            return unsafe { dot_product_avx2(a, b) };
        }
    }

    dot_product_scalar(a, b)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;
    let mut acc_lo = _mm256_setzero_ps();
    let mut acc_hi = _mm256_setzero_ps();

    while i + 16 <= dim {
        let xa = _mm256_loadu_ps(a.as_ptr().add(i));
        let xb = _mm256_loadu_ps(b.as_ptr().add(i));
        let ya = _mm256_loadu_ps(a.as_ptr().add(i + 8));
        let yb = _mm256_loadu_ps(b.as_ptr().add(i + 8));
        acc_lo = _mm256_fmadd_ps(xa, xb, acc_lo);
        acc_hi = _mm256_fmadd_ps(ya, yb, acc_hi);
        i += 16;
    }

    let acc = _mm256_add_ps(acc_lo, acc_hi);
    let folded = _mm_add_ps(_mm256_extractf128_ps(acc, 1), _mm256_castps256_ps128(acc));
    let folded = _mm_hadd_ps(folded, folded);
    let folded = _mm_hadd_ps(folded, folded);
    let mut dot = _mm_cvtss_f32(folded);

    while i < dim {
        dot += a[i] * b[i];
        i += 1;
    }
    dot
}

/// Two accumulators over chunks of eight.
#[inline]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut even = 0.0f32;
    let mut odd = 0.0f32;

    let a_chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let tail_start = a.len() - a_chunks.remainder().len();

    for (x, y) in a_chunks.zip(b_chunks) {
        even += x[0] * y[0] + x[2] * y[2] + x[4] * y[4] + x[6] * y[6];
        odd += x[1] * y[1] + x[3] * y[3] + x[5] * y[5] + x[7] * y[7];
    }
    for i in tail_start..a.len() {
        even += a[i] * b[i];
    }

    even + odd
}

#[inline]
pub fn norm_simd(v: &[f32]) -> f32 {
    dot_product_simd(v, v).sqrt()
}

/// Scale `v` in place to unit length, dividing by `norm + NORM_EPSILON` so an
/// all-zero vector stays all-zero instead of turning into NaNs.
#[inline]
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let inv = 1.0 / (norm_simd(v) + NORM_EPSILON);
    for x in v.iter_mut() {
        *x *= inv;
    }
}
