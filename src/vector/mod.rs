//! Vector similarity for the snapshot cache.
//!
//! Similarity is cosine similarity rescaled to a 0–100 score:
//!
//! ```text
//! score = clamp( dot(a / |a|, b / |b|) × 100, 0, 100 )
//! ```
//!
//! Opposed or orthogonal vectors score 0; identical directions score 100.
//! Vectors of different length, or with zero norm, never score at all.
//!
//! The [`SimilarityIndex`] compares a query against every snapshot in turn.
//! The scan is linear in the number of snapshots, which is fine for the
//! tens to low hundreds of entries a single assistant accumulates; a
//! `criterion` bench (`benches/resolve.rs`) tracks its cost.

mod linear;

pub use linear::SimilarityIndex;

/// Scales `v` to unit length in place.
///
/// Returns `false` (leaving `v` untouched) when the norm is zero or not
/// finite.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// Cosine similarity of `a` and `b` as a score in `[0, 100]`.
///
/// Returns `None` if the dimensions differ or either vector has zero norm.
pub fn cosine_score(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    if !l2_normalize(&mut a) || !l2_normalize(&mut b) {
        return None;
    }
    unit_score(&a, &b)
}

/// Score of two vectors that are already unit length.
pub(crate) fn unit_score(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot * 100.0;
    if !score.is_finite() {
        return None;
    }
    Some(score.clamp(0.0, 100.0))
}

/// Unit-length copy of `v`, or `None` for a zero vector.
pub(crate) fn unit(v: &[f32]) -> Option<Vec<f32>> {
    let mut v = v.to_vec();
    l2_normalize(&mut v).then_some(v)
}
