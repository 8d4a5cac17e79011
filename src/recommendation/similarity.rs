//! Content similarity between a user vector and the catalog.

use std::cmp::Ordering;

/// Magnitudes below this are treated as zero vectors
const NORM_EPSILON: f64 = 1e-12;

/// cos(u, p) = (u . p) / (|u| |p|), or 0 when either vector has no magnitude
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < NORM_EPSILON || norm_b < NORM_EPSILON {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Score every program vector against the user and keep the best `top_n`.
///
/// Returns `(catalog position, similarity)` pairs, highest first. Equal
/// similarities keep catalog order.
pub fn score_all<V: AsRef<[f64]>>(
    user_vector: &[f64],
    program_vectors: &[V],
    top_n: usize,
) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = program_vectors
        .iter()
        .enumerate()
        .map(|(idx, v)| (idx, cosine_similarity(user_vector, v.as_ref())))
        .collect();

    // Stable sort: ties stay in insertion order
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_n);
    scored
}
