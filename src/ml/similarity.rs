//! Vector similarity and ranking
//!
//! Exact cosine similarity over stored chunk vectors. The corpus is small
//! enough (hundreds to low thousands of chunks per instance) that a linear
//! scan beats maintaining an approximate index.

use crate::ml::embedding::Embedding;

/// Cosine similarity on a 0-1 scale for non-negative-dot inputs
/// (1.0 = identical direction, 0.0 = orthogonal or zero vector)
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// A scored candidate produced by [`rank`]
#[derive(Debug, Clone)]
pub struct Ranked {
    /// Position of the candidate in the input sequence
    pub index: usize,
    /// Cosine similarity against the query
    pub score: f32,
}

/// Rank candidate vectors against a query: descending similarity, filtered to
/// `threshold`, truncated to `top_k`. Ties keep input (insertion) order; the
/// sort is stable.
pub fn rank(query: &Embedding, candidates: &[Embedding], top_k: usize, threshold: f32) -> Vec<Ranked> {
    let mut scored: Vec<Ranked> = candidates
        .iter()
        .enumerate()
        .map(|(index, vector)| Ranked {
            index,
            score: cosine_similarity(query, vector),
        })
        .filter(|ranked| ranked.score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.2, 0.5, 0.8];
        assert_relative_eq!(cosine_similarity(&v, &v), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_relative_eq!(cosine_similarity(&a, &b), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_rank_descending_and_thresholded() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            vec![0.0, 1.0],  // orthogonal, below threshold
            vec![1.0, 0.1],  // very close
            vec![1.0, 1.0],  // ~0.707
        ];
        let results = rank(&query, &candidates, 10, 0.7);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 1);
        assert_eq!(results[1].index, 2);
        assert!(results[0].score >= results[1].score);
        for r in &results {
            assert!(r.score >= 0.7);
        }
    }

    #[test]
    fn test_rank_truncates_to_top_k() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![1.0, 0.0]; 5];
        let results = rank(&query, &candidates, 3, 0.0);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_rank_ties_stable() {
        let query = vec![1.0, 0.0];
        // Identical candidates score identically; insertion order must hold.
        let candidates = vec![vec![2.0, 0.0], vec![4.0, 0.0], vec![8.0, 0.0]];
        let results = rank(&query, &candidates, 3, 0.0);
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
