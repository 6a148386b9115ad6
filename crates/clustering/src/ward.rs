//! Ward (minimum-variance) agglomerative clustering.
//!
//! The full dendrogram is built once with the nearest-neighbor-chain
//! algorithm and can then be cut at any cluster count or distance threshold
//! without re-clustering.

use ndarray::ArrayView2;

/// One merge step of the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Representative point of the first merged cluster
    pub left: usize,
    /// Representative point of the second merged cluster
    pub right: usize,
    /// Ward linkage distance at which the merge happens
    pub height: f64,
}

/// Complete Ward hierarchy over a point set.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    n_points: usize,
    /// Merges sorted by ascending height
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Build the hierarchy over the rows of `points`.
    pub fn build(points: ArrayView2<f32>) -> Self {
        let n = points.nrows();
        let mut merges = nn_chain(points);
        merges.sort_by(|a, b| a.height.total_cmp(&b.height));
        Self {
            n_points: n,
            merges,
        }
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Labels for exactly `n_clusters` clusters (clamped to `1..=n_points`).
    pub fn cut_count(&self, n_clusters: usize) -> Vec<usize> {
        if self.n_points == 0 {
            return Vec::new();
        }
        let target = n_clusters.clamp(1, self.n_points);
        self.apply(self.n_points - target)
    }

    /// Labels after applying every merge strictly below `threshold`.
    pub fn cut_threshold(&self, threshold: f64) -> Vec<usize> {
        let steps = self
            .merges
            .iter()
            .take_while(|m| m.height < threshold)
            .count();
        self.apply(steps)
    }

    fn apply(&self, steps: usize) -> Vec<usize> {
        let mut sets = DisjointSet::new(self.n_points);
        for merge in self.merges.iter().take(steps) {
            sets.union(merge.left, merge.right);
        }
        sets.labels()
    }
}

/// Nearest-neighbor chain over squared Euclidean distances with the
/// Lance-Williams Ward update. Merges come out in chain order, not height order.
fn nn_chain(points: ArrayView2<f32>) -> Vec<Merge> {
    let n = points.nrows();
    if n < 2 {
        return Vec::new();
    }

    let mut dist = vec![0.0_f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = points
                .row(i)
                .iter()
                .zip(points.row(j).iter())
                .map(|(a, b)| {
                    let diff = f64::from(*a) - f64::from(*b);
                    diff * diff
                })
                .sum();
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    let mut merges = Vec::with_capacity(n - 1);

    for _ in 0..(n - 1) {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|&a| a) {
                chain.push(first);
            }
        }

        let (a, b) = loop {
            let a = chain[chain.len() - 1];
            let prev = if chain.len() >= 2 {
                Some(chain[chain.len() - 2])
            } else {
                None
            };

            // Prefer the previous chain element on ties so the chain terminates.
            let mut best = prev;
            let mut best_d = prev.map_or(f64::INFINITY, |p| ordered(dist[a * n + p]));
            for x in 0..n {
                if !active[x] || x == a {
                    continue;
                }
                let d = ordered(dist[a * n + x]);
                if best.is_none() || d < best_d {
                    best_d = d;
                    best = Some(x);
                }
            }

            match best {
                Some(b) if Some(b) == prev => break (a, b),
                Some(b) => chain.push(b),
                None => {
                    log::warn!("Ward chain found no merge partner for point {a}, stopping early");
                    return merges;
                }
            }
        };
        chain.pop();
        chain.pop();

        let d_ab = dist[a * n + b];
        let (keep, drop) = if a < b { (a, b) } else { (b, a) };
        let (size_a, size_b) = (size[a] as f64, size[b] as f64);

        for k in 0..n {
            if !active[k] || k == a || k == b {
                continue;
            }
            let size_k = size[k] as f64;
            let updated = ((size_a + size_k) * dist[a * n + k] + (size_b + size_k) * dist[b * n + k]
                - size_k * d_ab)
                / (size_a + size_b + size_k);
            dist[keep * n + k] = updated;
            dist[k * n + keep] = updated;
        }

        active[drop] = false;
        size[keep] += size[drop];
        merges.push(Merge {
            left: keep,
            right: drop,
            height: ordered(d_ab).max(0.0).sqrt(),
        });
    }

    merges
}

/// NaN distances rank after every real distance.
fn ordered(d: f64) -> f64 {
    if d.is_nan() {
        f64::INFINITY
    } else {
        d
    }
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }

    /// Dense labels numbered by first appearance in point order.
    fn labels(&mut self) -> Vec<usize> {
        let n = self.parent.len();
        let mut by_root = vec![usize::MAX; n];
        let mut next = 0;
        (0..n)
            .map(|i| {
                let root = self.find(i);
                if by_root[root] == usize::MAX {
                    by_root[root] = next;
                    next += 1;
                }
                by_root[root]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    #[test]
    fn separates_obvious_groups() {
        let points = array![
            [0.0_f32, 0.0],
            [10.0, 10.0],
            [0.1, 0.0],
            [10.0, 10.1],
            [0.0, 0.1],
        ];
        let tree = Dendrogram::build(points.view());
        assert_eq!(tree.merges().len(), 4);
        assert_eq!(tree.cut_count(2), vec![0, 1, 0, 1, 0]);
        assert_eq!(tree.cut_count(1), vec![0, 0, 0, 0, 0]);
        assert_eq!(tree.cut_count(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn merge_heights_are_monotone() {
        let points = array![[0.0_f32], [1.0], [3.0], [7.0], [15.0], [16.0]];
        let tree = Dendrogram::build(points.view());
        for pair in tree.merges().windows(2) {
            assert!(pair[0].height <= pair[1].height);
        }
        // Ward height for two singletons equals their Euclidean distance.
        assert!((tree.merges()[0].height - 1.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_cut_stops_at_large_gaps() {
        let points = array![[0.0_f32], [0.2], [5.0], [5.2]];
        let tree = Dendrogram::build(points.view());
        assert_eq!(tree.cut_threshold(1.0), vec![0, 0, 1, 1]);
        assert_eq!(tree.cut_threshold(0.0), vec![0, 1, 2, 3]);
        assert_eq!(tree.cut_threshold(f64::INFINITY), vec![0, 0, 0, 0]);
    }

    #[test]
    fn tiny_inputs() {
        let empty = ndarray::Array2::<f32>::zeros((0, 3));
        assert!(Dendrogram::build(empty.view()).cut_count(3).is_empty());

        let single = array![[1.0_f32, 2.0]];
        assert_eq!(Dendrogram::build(single.view()).cut_count(4), vec![0]);
    }

    #[test]
    fn non_finite_points_do_not_stop_the_merge() {
        let points = array![[f32::NAN, 0.0], [0.0, 1.0], [0.0, 1.1], [f32::INFINITY, 0.0]];
        let tree = Dendrogram::build(points.view());
        assert_eq!(tree.merges().len(), 3);
        assert!(tree.merges().iter().all(|m| !m.height.is_nan()));
        assert_eq!(tree.cut_count(1), vec![0, 0, 0, 0]);
        assert_eq!(tree.cut_count(3)[1], tree.cut_count(3)[2]);
    }
}
