//! Shared feature-vector math.
//!
//! Every corpus in the crate (song features, play latents) is ranked under
//! cosine similarity, so the zero-norm conventions live here in one place:
//! similarity against a zero vector is 0, and normalizing a zero vector
//! leaves it untouched.

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either norm is (near) zero — a silent clip or an all-zero
/// latent row must never produce a division error.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for i in 0..a.len().min(b.len()) {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

/// L2-normalize a vector in place. Returns whether the norm was non-zero;
/// a zero (or non-finite) vector is left unchanged.
pub fn normalize_l2_in_place(values: &mut [f64]) -> bool {
    let sum: f64 = values.iter().map(|v| v * v).sum();
    if !sum.is_finite() || sum <= 0.0 {
        return false;
    }
    let norm = sum.sqrt();
    for value in values.iter_mut() {
        *value /= norm;
    }
    true
}
