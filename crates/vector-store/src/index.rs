use crate::error::{Result, VectorStoreError};
use crate::vectors::stack_rows;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

/// Flat inner-product index over pre-normalized vectors.
///
/// Built once and never mutated, so it can be shared read-only across tasks.
/// For normalized input the inner product equals cosine similarity.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    vectors: Array2<f32>,
}

impl SimilarityIndex {
    /// Build from an `n x d` matrix.
    pub fn new(vectors: Array2<f32>) -> Self {
        let dimension = vectors.ncols();
        Self { dimension, vectors }
    }

    /// Build from a slice of rows.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R], dimension: usize) -> Result<Self> {
        Ok(Self::new(stack_rows(rows, dimension)?))
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Top `k` nearest vectors to `query` by descending inner product.
    ///
    /// Returns `(row, score)` pairs; ties are broken by row for determinism.
    pub fn top_k(&self, query: ArrayView1<f32>, k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query.len())?;

        let scores: Array1<f32> = self.vectors.dot(&query);
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Full `queries x index` similarity matrix.
    pub fn all_pairs(&self, queries: ArrayView2<f32>) -> Result<Array2<f32>> {
        if self.is_empty() || queries.nrows() == 0 {
            return Ok(Array2::zeros((queries.nrows(), self.len())));
        }
        self.check_dimension(queries.ncols())?;
        Ok(queries.dot(&self.vectors.t()))
    }

    /// Best similarity for each query row (its single nearest neighbor).
    pub fn best_matches(&self, queries: ArrayView2<f32>) -> Result<Vec<f32>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let matrix = self.all_pairs(queries)?;
        Ok(matrix
            .axis_iter(Axis(0))
            .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect())
    }

    pub fn vectors(&self) -> ArrayView2<f32> {
        self.vectors.view()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.nrows() == 0
    }
}
