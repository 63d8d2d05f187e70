//! Cosine distance kernels shared by exact scan and LSH re-ranking.
//!
//! Random-hyperplane signatures approximate angular similarity, so both search
//! paths rank by cosine distance `1 - cos(a, b)`. All distances follow the
//! convention **lower is better**. Plain loops keep results bit-identical
//! across platforms, which save/load equivalence depends on.
//!
//! Sums accumulate in `f64`: squares of any finite `f32` stay finite and
//! nonzero there, so very large and very small vectors keep a usable norm.

/// Dot product between two f32 slices of equal length, accumulated in f64.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    let mut sum = 0.0f64;
    for i in 0..a.len() {
        sum += f64::from(a[i]) * f64::from(b[i]);
    }
    sum
}

/// L2 norm of a vector.
#[inline]
pub fn norm(v: &[f32]) -> f64 {
    dot(v, v).sqrt()
}

/// Cosine similarity using precomputed norms. Returns a value in [-1, 1].
/// A zero-norm operand yields 0.
#[inline]
pub fn cosine_similarity_prenorm(a: &[f32], b: &[f32], norm_a: f64, norm_b: f64) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32
}

/// Cosine similarity between two f32 slices. Returns a value in [-1, 1].
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity_prenorm(a, b, norm(a), norm(b))
}

/// Cosine distance with precomputed norms: `1 - cosine_similarity`. Range: \[0, 2\].
#[inline]
pub fn cosine_distance_prenorm(a: &[f32], b: &[f32], norm_a: f64, norm_b: f64) -> f32 {
    1.0 - cosine_similarity_prenorm(a, b, norm_a, norm_b)
}

/// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
