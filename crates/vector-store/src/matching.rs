//! Bipartite similarity between two embedding sets.
//!
//! Both sets must be L2-normalized. The exact variant solves a minimum-cost
//! assignment over the negated similarity matrix; the sampled variant averages
//! nearest-neighbor similarities for a random subset of query rows.

use crate::error::{Result, VectorStoreError};
use crate::index::SimilarityIndex;
use ndarray::{ArrayView2, Axis};
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;
use rand::Rng;

/// Fixed-point scale used to feed float similarities to the integer solver.
const COST_SCALE: f64 = 1_000_000.0;

/// How a bipartite similarity is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Optimal assignment (Hungarian), cubic in the smaller set size
    Exact,
    /// Mean nearest-neighbor similarity over at most `sample_size` rows
    Sampled { sample_size: usize },
}

/// Mean similarity of the optimal one-to-one assignment between `a` and `b`.
///
/// The smaller set is assigned into the larger one, so every row of the
/// smaller set is matched exactly once.
pub fn optimal_assignment_similarity(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Result<f32> {
    if a.nrows() == 0 || b.nrows() == 0 {
        return Err(VectorStoreError::EmptySet("optimal assignment"));
    }
    if a.ncols() != b.ncols() {
        return Err(VectorStoreError::InvalidDimension {
            expected: a.ncols(),
            actual: b.ncols(),
        });
    }

    let (small, large) = if a.nrows() <= b.nrows() {
        (a.view(), b.view())
    } else {
        (b.view(), a.view())
    };
    let similarity = small.dot(&large.t());

    let costs: Vec<i64> = similarity
        .iter()
        .map(|&s| -(f64::from(s) * COST_SCALE).round() as i64)
        .collect();
    let weights = Matrix::from_vec(small.nrows(), large.nrows(), costs)
        .map_err(|e| VectorStoreError::Other(format!("cost matrix: {e}")))?;
    let (_, assignment) = kuhn_munkres_min(&weights);

    let total: f32 = assignment
        .iter()
        .enumerate()
        .map(|(row, &col)| similarity[[row, col]])
        .sum();
    Ok(total / small.nrows() as f32)
}

/// Mean best-match similarity of a random sample of `queries` against `targets`.
///
/// When `sample_size` covers every query row, all rows are used and the
/// result is deterministic.
pub fn sampled_match_similarity<R: Rng + ?Sized>(
    queries: ArrayView2<f32>,
    targets: &SimilarityIndex,
    sample_size: usize,
    rng: &mut R,
) -> Result<f32> {
    if queries.nrows() == 0 || targets.is_empty() {
        return Err(VectorStoreError::EmptySet("sampled match"));
    }
    if sample_size == 0 {
        return Err(VectorStoreError::Other("sample_size must be > 0".to_string()));
    }

    let best = if sample_size < queries.nrows() {
        let mut rows = rand::seq::index::sample(rng, queries.nrows(), sample_size).into_vec();
        rows.sort_unstable();
        let sampled = queries.select(Axis(0), &rows);
        targets.best_matches(sampled.view())?
    } else {
        targets.best_matches(queries)?
    };

    Ok(best.iter().sum::<f32>() / best.len() as f32)
}

/// Bipartite similarity between two sets under `strategy`.
///
/// The sampled strategy draws from the larger set and looks each sample up in
/// the smaller one.
pub fn match_similarity<R: Rng + ?Sized>(
    a: ArrayView2<f32>,
    b: ArrayView2<f32>,
    strategy: MatchStrategy,
    rng: &mut R,
) -> Result<f32> {
    match strategy {
        MatchStrategy::Exact => optimal_assignment_similarity(a, b),
        MatchStrategy::Sampled { sample_size } => {
            let (small, large) = if a.nrows() <= b.nrows() {
                (a.view(), b.view())
            } else {
                (b.view(), a.view())
            };
            let index = SimilarityIndex::new(small.to_owned());
            sampled_match_similarity(large, &index, sample_size, rng)
        }
    }
}
