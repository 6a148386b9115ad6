use crate::error::{ClusteringError, Result};
use crate::types::{BuildOutcome, ClusterAssignment};
use crate::ward::Dendrogram;
use ndarray::{concatenate, ArrayView2, Axis};
use serendipity_vector_store::VectorStoreError;

pub const DEFAULT_MAX_CLUSTER_ITERATIONS: usize = 5;

/// What bounds the clusters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterBound {
    /// Ceiling on items per cluster, reached by raising the cluster count
    MaxItems(usize),
    /// Ward distance at or above which clusters are not merged
    DistanceThreshold(f32),
}

/// Partitions two accounts' items into clusters of bounded size.
#[derive(Debug, Clone)]
pub struct BoundedClusterBuilder {
    bound: ClusterBound,
    max_iterations: usize,
}

/// Labels from the previous attempt, kept as the fallback.
struct Attempt {
    labels: Vec<usize>,
    largest: usize,
}

impl BoundedClusterBuilder {
    pub fn new(bound: ClusterBound, max_iterations: usize) -> Result<Self> {
        match bound {
            ClusterBound::MaxItems(0) => {
                return Err(ClusteringError::invalid_config(
                    "max_items_per_cluster must be > 0",
                ))
            }
            ClusterBound::DistanceThreshold(t) if !(t.is_finite() && t > 0.0) => {
                return Err(ClusteringError::invalid_config(format!(
                    "distance_threshold must be a positive finite number, got {t}"
                )))
            }
            _ => {}
        }
        if max_iterations == 0 {
            return Err(ClusteringError::invalid_config(
                "max_cluster_iterations must be > 0",
            ));
        }
        Ok(Self {
            bound,
            max_iterations,
        })
    }

    pub fn with_max_items(max_items: usize) -> Result<Self> {
        Self::new(
            ClusterBound::MaxItems(max_items),
            DEFAULT_MAX_CLUSTER_ITERATIONS,
        )
    }

    pub fn bound(&self) -> ClusterBound {
        self.bound
    }

    /// Cluster `current ++ peer` (both normalized, same width).
    ///
    /// When either side is empty a single degenerate cluster is returned and
    /// the caller decides whether to skip the pair.
    pub fn build(&self, current: ArrayView2<f32>, peer: ArrayView2<f32>) -> Result<ClusterAssignment> {
        let (n1, n2) = (current.nrows(), peer.nrows());
        if n1 == 0 || n2 == 0 {
            log::debug!("Degenerate pair ({n1} vs {n2} items), single cluster");
            return Ok(ClusterAssignment {
                labels: vec![0; n1 + n2],
                n_current: n1,
                outcome: BuildOutcome::Degenerate,
            });
        }
        if current.ncols() != peer.ncols() {
            return Err(VectorStoreError::InvalidDimension {
                expected: current.ncols(),
                actual: peer.ncols(),
            }
            .into());
        }

        let merged = concatenate(Axis(0), &[current.view(), peer.view()])?;
        let tree = Dendrogram::build(merged.view());

        let (labels, outcome) = match self.bound {
            ClusterBound::DistanceThreshold(threshold) => {
                let labels = tree.cut_threshold(f64::from(threshold));
                (labels, BuildOutcome::Threshold)
            }
            ClusterBound::MaxItems(ceiling) => self.converge(&tree, ceiling),
        };

        let assignment = ClusterAssignment {
            labels,
            n_current: n1,
            outcome,
        };
        log::info!(
            "Clustered {} items into {} clusters (largest {}, {:?})",
            n1 + n2,
            assignment.n_clusters(),
            assignment.largest(),
            assignment.outcome
        );
        Ok(assignment)
    }

    /// Raise the cluster count until the largest cluster fits `ceiling`,
    /// more clusters stop helping, or the budget runs out.
    fn converge(&self, tree: &Dendrogram, ceiling: usize) -> (Vec<usize>, BuildOutcome) {
        let n_items = tree.n_points();
        let mut n_clusters = n_items.div_ceil(ceiling).max(1);
        let mut previous: Option<Attempt> = None;
        let mut attempts = 0;

        loop {
            attempts += 1;
            log::info!(
                "Attempt {attempts}: creating {n_clusters} clusters for {n_items} total items"
            );
            let labels = tree.cut_count(n_clusters);
            let largest = largest_cluster(&labels);

            if largest <= ceiling {
                log::info!("Success: largest cluster has {largest} items (max: {ceiling})");
                return (labels, BuildOutcome::Converged { attempts });
            }

            if let Some(prev) = previous.take() {
                if largest >= prev.largest {
                    log::warn!(
                        "No improvement after raising cluster count ({largest} >= {}), \
                         keeping previous labels with an oversized cluster",
                        prev.largest
                    );
                    return (
                        prev.labels,
                        BuildOutcome::FellBack {
                            attempts,
                            largest: prev.largest,
                        },
                    );
                }
            }

            if attempts >= self.max_iterations {
                log::warn!(
                    "Gave up after {attempts} attempts: largest cluster has {largest} items \
                     (max: {ceiling})"
                );
                return (labels, BuildOutcome::GaveUp { attempts, largest });
            }

            n_clusters += 1;
            if n_clusters >= n_items {
                log::warn!(
                    "Reached maximum possible clusters ({n_items} items), keeping cluster of \
                     {largest} items (max: {ceiling})"
                );
                return (labels, BuildOutcome::GaveUp { attempts, largest });
            }

            log::info!("Largest cluster has {largest} items, exceeding max of {ceiling}");
            previous = Some(Attempt { labels, largest });
        }
    }
}

fn largest_cluster(labels: &[usize]) -> usize {
    let mut counts = vec![0usize; labels.iter().max().map_or(0, |m| m + 1)];
    for &label in labels {
        counts[label] += 1;
    }
    counts.into_iter().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use serendipity_vector_store::normalized_matrix;

    fn unit_circle(angles: &[f32]) -> Array2<f32> {
        let rows: Vec<Vec<f32>> = angles.iter().map(|a| vec![a.cos(), a.sin()]).collect();
        normalized_matrix(&rows, 2).unwrap()
    }

    #[test]
    fn five_and_five_with_ceiling_four() {
        let current = unit_circle(&[0.0, 0.05, 2.0, 2.05, 4.0]);
        let peer = unit_circle(&[0.1, 2.1, 4.05, 4.1, 1.0]);
        let builder = BoundedClusterBuilder::with_max_items(4).unwrap();
        let assignment = builder.build(current.view(), peer.view()).unwrap();

        assert_eq!(assignment.labels.len(), 10);
        assert!(assignment.n_clusters() >= 3);
        assert!(assignment.largest() <= 4);
        match assignment.outcome {
            BuildOutcome::Converged { attempts } => assert!(attempts <= 5),
            other => panic!("expected convergence, got {other:?}"),
        }
    }

    #[test]
    fn empty_side_is_degenerate() {
        let current = unit_circle(&[0.0, 1.0]);
        let peer = Array2::<f32>::zeros((0, 2));
        let assignment = BoundedClusterBuilder::with_max_items(4)
            .unwrap()
            .build(current.view(), peer.view())
            .unwrap();
        assert_eq!(assignment.outcome, BuildOutcome::Degenerate);
        assert_eq!(assignment.labels, vec![0, 0]);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let current = array![[1.0_f32, 0.0]];
        let peer = array![[1.0_f32, 0.0, 0.0]];
        let builder = BoundedClusterBuilder::with_max_items(4).unwrap();
        assert!(builder.build(current.view(), peer.view()).is_err());
    }

    #[test]
    fn identical_points_give_up_with_a_record() {
        // Ward cannot split identical points in a useful order; any ceiling
        // violation must be reported through the outcome.
        let current = Array2::from_elem((6, 2), 0.5_f32);
        let peer = Array2::from_elem((6, 2), 0.5_f32);
        let builder = BoundedClusterBuilder::new(ClusterBound::MaxItems(1), 2).unwrap();
        let assignment = builder.build(current.view(), peer.view()).unwrap();
        assert!(
            assignment.largest() <= 1 || !assignment.outcome.within_ceiling(),
            "{assignment:?}"
        );
    }

    #[test]
    fn threshold_mode_ignores_ceiling() {
        let current = unit_circle(&[0.0, 0.01]);
        let peer = unit_circle(&[3.0, 3.01]);
        let builder = BoundedClusterBuilder::new(ClusterBound::DistanceThreshold(0.5), 5).unwrap();
        let assignment = builder.build(current.view(), peer.view()).unwrap();
        assert_eq!(assignment.outcome, BuildOutcome::Threshold);
        assert_eq!(assignment.labels, vec![0, 0, 1, 1]);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(BoundedClusterBuilder::new(ClusterBound::MaxItems(0), 5).is_err());
        assert!(BoundedClusterBuilder::new(ClusterBound::MaxItems(3), 0).is_err());
        assert!(BoundedClusterBuilder::new(ClusterBound::DistanceThreshold(-1.0), 5).is_err());
    }
}
