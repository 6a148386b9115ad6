/// How the builder finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Largest cluster fits the ceiling
    Converged { attempts: usize },
    /// More clusters stopped helping; previous attempt's labels were kept
    FellBack { attempts: usize, largest: usize },
    /// Retry budget or item count exhausted with an oversized cluster
    GaveUp { attempts: usize, largest: usize },
    /// Distance-threshold mode, no size ceiling
    Threshold,
    /// One side had no items; no cross-account pairing is possible
    Degenerate,
}

impl BuildOutcome {
    /// Whether the size ceiling is known to hold.
    pub fn within_ceiling(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Items of one label, split back into the two input sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPartition {
    pub label: usize,
    /// Row positions within the current account's input
    pub current: Vec<usize>,
    /// Row positions within the peer account's input
    pub peer: Vec<usize>,
}

impl ClusterPartition {
    pub fn len(&self) -> usize {
        self.current.len() + self.peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Both sides are represented.
    pub fn is_mixed(&self) -> bool {
        !self.current.is_empty() && !self.peer.is_empty()
    }
}

/// Labels for the merged `current ++ peer` item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub labels: Vec<usize>,
    pub n_current: usize,
    pub outcome: BuildOutcome,
}

impl ClusterAssignment {
    pub fn n_clusters(&self) -> usize {
        self.labels.iter().max().map_or(0, |m| m + 1)
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn largest(&self) -> usize {
        self.sizes().into_iter().max().unwrap_or(0)
    }

    /// Split labels back into per-side row positions, ordered by label.
    pub fn partitions(&self) -> Vec<ClusterPartition> {
        let mut parts: Vec<ClusterPartition> = (0..self.n_clusters())
            .map(|label| ClusterPartition {
                label,
                current: Vec::new(),
                peer: Vec::new(),
            })
            .collect();
        for (pos, &label) in self.labels.iter().enumerate() {
            if pos < self.n_current {
                parts[label].current.push(pos);
            } else {
                parts[label].peer.push(pos - self.n_current);
            }
        }
        parts
    }
}
