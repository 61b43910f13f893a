//! Embedding blob packing and cosine similarity.

/// Pack a vector as consecutive little-endian `f32` values.
#[must_use]
pub fn pack(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverse [`pack`]. Trailing bytes that do not form a full `f32` are ignored.
#[must_use]
pub fn unpack(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `dot(a, b) / (|a| * |b|)`.
///
/// Returns `0.0` when the lengths differ, either vector is empty or has zero
/// magnitude, or the result is not finite. Accumulates in `f64` so the result
/// is symmetric and large magnitudes do not overflow.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !sim.is_finite() {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let sim = sim.clamp(-1.0, 1.0) as f32;
    sim
}

/// Cosine distance, `1 - cosine_similarity`.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn identical_vectors_similarity_one() {
        let v = vec![0.3, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_similarity_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_exactly_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn mismatched_or_empty_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn huge_magnitudes_do_not_overflow() {
        let a = vec![f32::MAX, f32::MAX];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unpack_ignores_trailing_bytes() {
        let mut blob = pack(&[1.5, -2.0]);
        blob.push(0xff);
        assert_eq!(unpack(&blob), vec![1.5, -2.0]);
    }

    proptest! {
        #[test]
        fn pack_roundtrip(v in proptest::collection::vec(any::<f32>().prop_filter("finite", |x| x.is_finite()), 1..=4096)) {
            let back = unpack(&pack(&v));
            prop_assert_eq!(back.len(), v.len());
            for (x, y) in v.iter().zip(&back) {
                prop_assert!((x - y).abs() <= f32::EPSILON * x.abs().max(1.0));
            }
        }

        #[test]
        fn similarity_is_symmetric(
            a in proptest::collection::vec(-1e6f32..1e6, 0..32),
            b in proptest::collection::vec(-1e6f32..1e6, 0..32),
        ) {
            prop_assert_eq!(cosine_similarity(&a, &b).to_bits(), cosine_similarity(&b, &a).to_bits());
        }

        #[test]
        fn similarity_is_bounded(
            a in proptest::collection::vec(-1e3f32..1e3, 8),
            b in proptest::collection::vec(-1e3f32..1e3, 8),
        ) {
            let s = cosine_similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&s));
        }
    }
}
