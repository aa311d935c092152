//! Feature-vector comparison.
//!
//! Pure functions with no state: identical inputs always give bit-identical scores.
//! Sums are accumulated in `f64` in index order and narrowed to `f32` at the end.

/// Cosine similarity: dot(a, b) / (||a|| * ||b||), in [-1, 1].
///
/// Degenerate inputs score 0 instead of failing: vectors of different length
/// (e.g. produced by another embedding model version), empty vectors, zero-magnitude
/// vectors, and inputs containing NaN or infinity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // sqrt of the product rather than product of sqrts: exact 1.0 for cos(v, v).
    let score = dot / (norm_a * norm_b).sqrt();
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0) as f32
}

/// Inner product of two equal-length vectors; 0 when lengths differ.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum::<f64>() as f32
}

/// Euclidean length.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt() as f32
}

/// Best cosine similarity over every (query, candidate) pair.
/// Used for face matching, where an image carries zero or more face vectors.
/// Returns 0 when either side is empty.
pub fn best_match(queries: &[Vec<f32>], candidates: &[Vec<f32>]) -> f32 {
    let mut best: Option<f32> = None;
    for q in queries {
        for c in candidates {
            let score = cosine_similarity(q, c);
            best = Some(best.map_or(score, |b| b.max(score)));
        }
    }
    best.unwrap_or(0.0)
}
