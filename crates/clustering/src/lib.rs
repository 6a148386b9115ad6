//! # Serendipity Clustering
//!
//! Groups two accounts' items into clusters of likely-related content.
//!
//! ## Architecture
//!
//! ```text
//! current[n1 x d] ++ peer[n2 x d]   (normalized)
//!     │
//!     ├──> Dendrogram (Ward, nearest-neighbor chain, built once)
//!     │
//!     └──> BoundedClusterBuilder
//!            ├─ MaxItems(c): n = ceil((n1+n2)/c), cut, check largest,
//!            │               raise n until it fits / stops improving /
//!            │               retry budget or item count is exhausted
//!            └─ DistanceThreshold(t): single cut below t
//! ```
//!
//! Every outcome that may leave an oversized cluster is logged and reported
//! through [`BuildOutcome`].

mod builder;
mod error;
mod types;
mod ward;

pub use builder::{BoundedClusterBuilder, ClusterBound, DEFAULT_MAX_CLUSTER_ITERATIONS};
pub use error::{ClusteringError, Result};
pub use types::{BuildOutcome, ClusterAssignment, ClusterPartition};
pub use ward::{Dendrogram, Merge};
