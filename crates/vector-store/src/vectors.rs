use crate::error::{Result, VectorStoreError};
use ndarray::{Array2, ArrayView1};

/// Stack equally-sized rows into an `n x d` matrix.
///
/// `dimension` is required so an empty input still has a well-defined width.
pub fn stack_rows<R: AsRef<[f32]>>(rows: &[R], dimension: usize) -> Result<Array2<f32>> {
    let mut flat = Vec::with_capacity(rows.len() * dimension);
    for row in rows {
        let row = row.as_ref();
        if row.len() != dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: dimension,
                actual: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Ok(Array2::from_shape_vec((rows.len(), dimension), flat)?)
}

/// L2-normalize every row in place. Zero rows are left untouched.
pub fn normalize_rows(matrix: &mut Array2<f32>) {
    for mut row in matrix.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > f32::EPSILON {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

/// Stack and normalize in one go.
pub fn normalized_matrix<R: AsRef<[f32]>>(rows: &[R], dimension: usize) -> Result<Array2<f32>> {
    let mut matrix = stack_rows(rows, dimension)?;
    normalize_rows(&mut matrix);
    Ok(matrix)
}

/// Cosine similarity of two vectors of equal length.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let dot = a.dot(&b);
    let norm = (a.dot(&a) * b.dot(&b)).sqrt();
    if norm <= f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn normalizes_rows_to_unit_length() {
        let mut m = array![[3.0_f32, 4.0], [0.0, 0.0]];
        normalize_rows(&mut m);
        assert!((m[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((m[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(m[[1, 0]], 0.0);
    }

    #[test]
    fn stack_rejects_ragged_rows() {
        let rows = vec![vec![1.0_f32, 0.0], vec![1.0]];
        assert!(matches!(
            stack_rows(&rows, 2),
            Err(VectorStoreError::InvalidDimension {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn empty_stack_keeps_width() {
        let rows: Vec<Vec<f32>> = Vec::new();
        let m = stack_rows(&rows, 8).unwrap();
        assert_eq!(m.dim(), (0, 8));
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = array![1.0_f32, 2.0, 3.0];
        let b = array![2.0_f32, 4.0, 6.0];
        assert!((cosine_similarity(a.view(), b.view()) - 1.0).abs() < 1e-6);
    }
}
