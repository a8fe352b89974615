//! Deterministic local vectors used when the external generator is
//! unavailable.
//!
//! Everything here is a pure function of its input: the same text always
//! yields a bit-identical vector.

use super::l2_normalize;

/// Dimensionality of [`mock_embedding`].
pub const MOCK_DIMS: usize = 384;

/// Dimensionality of the legacy keyword-hash and content vectors.
pub const LEGACY_DIMS: usize = 100;

/// djb2 over Unicode scalar values, wrapping on overflow.
pub fn djb2(s: &str) -> i64 {
    s.chars().fold(5381i64, |hash, c| {
        hash.wrapping_mul(33).wrapping_add(c as i64)
    })
}

/// Component `i` of a hash-derived vector, in `[-1, 1)`.
fn hashed_component(text: &str, i: usize) -> f32 {
    let hash = djb2(&format!("{}-{}", text, i));
    hash.rem_euclid(1000) as f32 / 500.0 - 1.0
}

fn positional_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut vector: Vec<f32> = (0..dims).map(|i| hashed_component(text, i)).collect();
    l2_normalize(&mut vector);
    vector
}

/// 384-d stand-in embedding for `text`.
pub fn mock_embedding(text: &str) -> Vec<f32> {
    positional_vector(text, MOCK_DIMS)
}

/// 100-d positional hash of a whole content string.
pub fn legacy_content_vector(content: &str) -> Vec<f32> {
    positional_vector(content, LEGACY_DIMS)
}

/// 100-d bag-of-tokens vector: each token adds 1.0 to bucket `|djb2(token) % 100|`.
pub fn legacy_query_vector<S: AsRef<str>>(tokens: &[S]) -> Vec<f32> {
    let mut vector = vec![0.0f32; LEGACY_DIMS];
    for token in tokens {
        let bucket = (djb2(token.as_ref()) % LEGACY_DIMS as i64).unsigned_abs() as usize;
        vector[bucket] += 1.0;
    }
    l2_normalize(&mut vector);
    vector
}
