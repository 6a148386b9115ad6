use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use serendipity_clustering::{ClusterBound, DEFAULT_MAX_CLUSTER_ITERATIONS};
use serendipity_scoring::BalanceWeights;
use serendipity_vector_store::MatchStrategy;
use std::collections::BTreeMap;
use std::path::Path;

/// How account-to-account similarity is computed when ranking peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerSimilarity {
    /// Optimal assignment over every item pair
    Exact,
    /// Nearest-neighbor average over a fixed-size sample
    Sampled,
}

/// What the validator does with an index claimed by two paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Abort the account's run
    Fail,
    /// Keep the first claim, drop later ones
    DropLater,
}

/// Configuration for one discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Number of best-matching peers paired with each account
    pub top_k_peers: usize,

    /// Ceiling on items per cluster; `None` switches to threshold mode
    pub max_items_per_cluster: Option<usize>,

    /// Ward distance cutoff used when no ceiling is set
    pub distance_threshold: Option<f32>,

    /// Retry budget of the bounded cluster builder
    pub max_cluster_iterations: usize,

    /// Per-term weights of the balance score
    pub weights: BalanceWeights,

    /// Include the inverse-size term in the balance score
    pub magnitude_enabled: bool,

    /// Share of the path quota per category; non-positive entries are skipped
    pub category_ratios: BTreeMap<String, f64>,

    /// Paths per match group across all categories
    pub overall_path_quota: usize,

    /// Sample size of the approximate similarity
    pub sample_size: usize,

    pub peer_similarity: PeerSimilarity,

    /// Largest side for which the balance scorer runs the exact assignment
    pub exact_match_max_items: usize,

    /// Consecutive rejections after which a cluster is dropped
    pub max_rejections_per_cluster: usize,

    pub duplicate_policy: DuplicatePolicy,

    /// Category of clusters whose items carry no tag
    pub default_category: String,

    /// Seed of every sampling RNG
    pub seed: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_k_peers: 10,
            max_items_per_cluster: Some(100),
            distance_threshold: None,
            max_cluster_iterations: DEFAULT_MAX_CLUSTER_ITERATIONS,
            weights: BalanceWeights::default(),
            magnitude_enabled: false,
            category_ratios: BTreeMap::from([
                ("coding".to_string(), 0.0),
                ("humanistic".to_string(), 0.7),
                ("practical".to_string(), 0.3),
            ]),
            overall_path_quota: 20,
            sample_size: 100,
            peer_similarity: PeerSimilarity::Sampled,
            exact_match_max_items: 256,
            max_rejections_per_cluster: 3,
            duplicate_policy: DuplicatePolicy::DropLater,
            default_category: "practical".to_string(),
            seed: 42,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match (self.max_items_per_cluster, self.distance_threshold) {
            (Some(0), _) => {
                return Err(DiscoveryError::config("max_items_per_cluster must be > 0"));
            }
            (None, None) => {
                return Err(DiscoveryError::config(
                    "either max_items_per_cluster or distance_threshold must be set",
                ));
            }
            (_, Some(t)) if !(t.is_finite() && t > 0.0) => {
                return Err(DiscoveryError::config(format!(
                    "distance_threshold must be a positive finite number, got {t}"
                )));
            }
            _ => {}
        }

        if self.max_cluster_iterations == 0 {
            return Err(DiscoveryError::config("max_cluster_iterations must be > 0"));
        }
        if self.sample_size == 0 {
            return Err(DiscoveryError::config("sample_size must be > 0"));
        }
        if self.max_rejections_per_cluster == 0 {
            return Err(DiscoveryError::config(
                "max_rejections_per_cluster must be > 0",
            ));
        }
        if self.default_category.trim().is_empty() {
            return Err(DiscoveryError::config("default_category must not be empty"));
        }

        let w = self.weights;
        if ![w.imbalance, w.magnitude_factor, w.distance]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(DiscoveryError::config("weights must be finite"));
        }
        if let Some((name, ratio)) = self
            .category_ratios
            .iter()
            .find(|(_, r)| !r.is_finite())
        {
            return Err(DiscoveryError::config(format!(
                "category ratio for {name} must be finite, got {ratio}"
            )));
        }

        Ok(())
    }

    /// A set threshold wins over the ceiling.
    pub fn cluster_bound(&self) -> ClusterBound {
        match (self.distance_threshold, self.max_items_per_cluster) {
            (Some(threshold), _) => ClusterBound::DistanceThreshold(threshold),
            (None, Some(max_items)) => ClusterBound::MaxItems(max_items),
            (None, None) => ClusterBound::MaxItems(100),
        }
    }

    pub fn peer_strategy(&self) -> MatchStrategy {
        match self.peer_similarity {
            PeerSimilarity::Exact => MatchStrategy::Exact,
            PeerSimilarity::Sampled => MatchStrategy::Sampled {
                sample_size: self.sample_size,
            },
        }
    }

    /// Categories that take part, highest ratio first (ties by name).
    pub fn ordered_categories(&self) -> Vec<(String, f64)> {
        let mut categories: Vec<(String, f64)> = self
            .category_ratios
            .iter()
            .filter(|(_, ratio)| **ratio > 0.0)
            .map(|(name, ratio)| (name.clone(), *ratio))
            .collect();
        categories.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        categories
    }

    /// Paths a category may claim: `ceil(overall * ratio)`.
    pub fn category_quota(&self, ratio: f64) -> usize {
        if ratio <= 0.0 {
            return 0;
        }
        (self.overall_path_quota as f64 * ratio).ceil() as usize
    }
}
