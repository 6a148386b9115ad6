use crate::error::{Result, ScoringError};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serendipity_protocol::BalanceScore;
use serendipity_vector_store::{match_similarity, MatchStrategy};

/// Per-term weights applied after standardization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceWeights {
    pub imbalance: f64,
    pub magnitude_factor: f64,
    pub distance: f64,
}

impl Default for BalanceWeights {
    fn default() -> Self {
        Self {
            imbalance: 1.0,
            magnitude_factor: 1.0,
            distance: 1.0,
        }
    }
}

impl BalanceWeights {
    fn as_array(&self) -> [f64; 3] {
        [self.imbalance, self.magnitude_factor, self.distance]
    }
}

/// Unstandardized balance terms of one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBalance {
    pub imbalance: f64,
    pub magnitude_factor: f64,
    pub distance: f64,
}

impl RawBalance {
    fn as_array(&self) -> [f64; 3] {
        [self.imbalance, self.magnitude_factor, self.distance]
    }
}

/// Computes raw balance terms for two sides of a cluster.
#[derive(Debug, Clone)]
pub struct BalanceScorer {
    weights: BalanceWeights,
    magnitude_enabled: bool,
    /// Sets larger than this use the sampled distance
    exact_match_max_items: usize,
    sample_size: usize,
    seed: u64,
}

impl BalanceScorer {
    pub fn new(
        weights: BalanceWeights,
        magnitude_enabled: bool,
        exact_match_max_items: usize,
        sample_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if sample_size == 0 {
            return Err(ScoringError::InvalidConfig(
                "sample_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            weights,
            magnitude_enabled,
            exact_match_max_items,
            sample_size,
            seed,
        })
    }

    pub fn weights(&self) -> BalanceWeights {
        self.weights
    }

    /// Raw terms for the unconsumed items of both sides.
    ///
    /// Returns `None` when either side is empty: the cluster is exhausted.
    pub fn raw(&self, current: ArrayView2<f32>, peer: ArrayView2<f32>) -> Result<Option<RawBalance>> {
        let (n1, n2) = (current.nrows(), peer.nrows());
        if n1 == 0 || n2 == 0 {
            return Ok(None);
        }

        let imbalance = (n1 as f64 / n2 as f64).ln().abs();
        let magnitude_factor = if self.magnitude_enabled {
            1.0 / (n1 + n2) as f64
        } else {
            0.0
        };

        let strategy = if n1.max(n2) <= self.exact_match_max_items {
            MatchStrategy::Exact
        } else {
            MatchStrategy::Sampled {
                sample_size: self.sample_size,
            }
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let similarity = match_similarity(current, peer, strategy, &mut rng)?;

        Ok(Some(RawBalance {
            imbalance,
            magnitude_factor,
            distance: 1.0 - f64::from(similarity),
        }))
    }

    /// Fit standardization on a cohort and return a scorer bound to it.
    pub fn fit_cohort(&self, cohort: &[RawBalance]) -> CohortScorer {
        CohortScorer {
            scorer: self.clone(),
            standardizer: Standardizer::fit(cohort),
        }
    }
}

/// Per-component z-scoring fitted once per cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: [f64; 3],
    scale: [f64; 3],
}

impl Standardizer {
    /// Population mean and standard deviation per component. Components with
    /// zero variance keep unit scale.
    pub fn fit(samples: &[RawBalance]) -> Self {
        if samples.is_empty() {
            return Self {
                mean: [0.0; 3],
                scale: [1.0; 3],
            };
        }
        let n = samples.len() as f64;
        let mut mean = [0.0; 3];
        for sample in samples {
            for (m, v) in mean.iter_mut().zip(sample.as_array()) {
                *m += v / n;
            }
        }
        let mut var = [0.0; 3];
        for sample in samples {
            for ((acc, v), m) in var.iter_mut().zip(sample.as_array()).zip(mean) {
                *acc += (v - m).powi(2) / n;
            }
        }
        let scale = var.map(|v| {
            let sd = v.sqrt();
            if sd > f64::EPSILON {
                sd
            } else {
                1.0
            }
        });
        Self { mean, scale }
    }

    pub fn transform(&self, raw: &RawBalance) -> [f64; 3] {
        let values = raw.as_array();
        [0, 1, 2].map(|i| (values[i] - self.mean[i]) / self.scale[i])
    }
}

/// Balance scorer bound to one cohort's standardization.
#[derive(Debug, Clone)]
pub struct CohortScorer {
    scorer: BalanceScorer,
    standardizer: Standardizer,
}

impl CohortScorer {
    /// Weighted standardized score; the exhausted sentinel when a side is empty.
    pub fn score_raw(&self, raw: Option<RawBalance>) -> BalanceScore {
        let Some(raw) = raw else {
            return BalanceScore::exhausted();
        };
        let [imbalance, magnitude_factor, distance] = self.standardizer.transform(&raw);
        let total = self
            .scorer
            .weights
            .as_array()
            .iter()
            .zip([imbalance, magnitude_factor, distance])
            .map(|(w, z)| w * z)
            .sum();
        BalanceScore {
            total,
            imbalance,
            magnitude_factor,
            distance,
            exhausted: false,
        }
    }

    pub fn score(&self, current: ArrayView2<f32>, peer: ArrayView2<f32>) -> Result<BalanceScore> {
        Ok(self.score_raw(self.scorer.raw(current, peer)?))
    }

    pub fn standardizer(&self) -> &Standardizer {
        &self.standardizer
    }
}
