//! Dense vector math shared by clustering and gap detection.

/// Cosine similarity in [-1, 1]. Returns 0.0 when either vector is zero or
/// the lengths disagree.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// `1 - cosine_similarity`, in [0, 2].
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

/// Scale to unit length in place; zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

/// Component-wise mean. Returns an empty vector for empty input.
pub fn mean_vector<'a, I>(vectors: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut acc: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for v in vectors {
        if acc.is_empty() {
            acc = vec![0.0; v.len()];
        }
        for (slot, &x) in acc.iter_mut().zip(v) {
            *slot += x as f64;
        }
        count += 1;
    }
    if count == 0 {
        return Vec::new();
    }
    acc.into_iter().map(|x| (x / count as f64) as f32).collect()
}

/// Whether an embedding can be used for analysis.
pub fn is_usable(v: &[f32]) -> bool {
    !v.is_empty() && v.iter().all(|x| x.is_finite()) && v.iter().any(|&x| x != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cosine_of_orthogonal_and_parallel() {
        assert_relative_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]), 0.0);
        assert_relative_eq!(cosine_similarity(&[1.0, 1.0], &[3.0, 3.0]), 1.0, epsilon = 1e-9);
        assert_relative_eq!(cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_and_mismatched_vectors_have_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn normalize_and_mean() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert_relative_eq!(l2_norm(&v), 1.0, epsilon = 1e-6);

        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let m = mean_vector([&a[..], &b[..]]);
        assert_eq!(m, vec![0.5, 0.5]);
        assert!(mean_vector(std::iter::empty::<&[f32]>()).is_empty());
    }

    #[test]
    fn usability() {
        assert!(is_usable(&[0.1, 0.0]));
        assert!(!is_usable(&[]));
        assert!(!is_usable(&[0.0, 0.0]));
        assert!(!is_usable(&[f32::NAN, 1.0]));
    }
}
