//! # Serendipity Vector Store
//!
//! Similarity primitives over normalized item embeddings.
//!
//! ## Features
//!
//! - **Flat inner-product index** with `top_k` and `all_pairs` queries
//! - **Exact bipartite matching** via the Hungarian algorithm
//! - **Sampled bipartite matching** for large sets (seeded, reproducible)
//!
//! ## Architecture
//!
//! ```text
//! Item embeddings[]
//!     │
//!     ├──> normalize_rows ──> Array2<f32> (n x d, unit rows)
//!     │
//!     ├──> SimilarityIndex
//!     │      ├─> top_k(query, k)
//!     │      └─> all_pairs(queries)
//!     │
//!     └──> match_similarity(a, b, strategy)
//!            ├─> Exact: optimal assignment mean
//!            └─> Sampled: mean nearest-neighbor over a sample
//! ```
//!
//! ## Example
//!
//! ```rust
//! use serendipity_vector_store::{normalized_matrix, SimilarityIndex};
//!
//! let rows = vec![vec![1.0_f32, 0.0], vec![0.6, 0.8]];
//! let index = SimilarityIndex::new(normalized_matrix(&rows, 2).unwrap());
//! let query = normalized_matrix(&[vec![1.0_f32, 0.1]], 2).unwrap();
//! let hits = index.top_k(query.row(0), 1).unwrap();
//! assert_eq!(hits[0].0, 0);
//! ```

mod error;
mod index;
mod matching;
mod vectors;

pub use error::{Result, VectorStoreError};
pub use index::SimilarityIndex;
pub use matching::{
    match_similarity, optimal_assignment_similarity, sampled_match_similarity, MatchStrategy,
};
pub use vectors::{cosine_similarity, normalize_rows, normalized_matrix, stack_rows};
