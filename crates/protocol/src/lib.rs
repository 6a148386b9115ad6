//! # Serendipity Protocol
//!
//! Data model shared by every stage of cross-account path discovery.
//!
//! ```text
//! Item (per account, stable id)
//!     │
//!     ├──> RowItem (transient row index, one per run occurrence)
//!     │
//!     ├──> Cluster members (current side + peer side)
//!     │
//!     └──> PathRecord (row indices) ──> ResolvedPath (stable ids)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Transient per-run row index. Never persisted.
pub type RowIndex = usize;

/// Match group id, assigned in peer-ranking order.
pub type MatchGroupId = u32;

/// Cluster id, unique within one account run.
pub type ClusterId = u32;

/// Score returned for a cluster with nothing left to offer on one side.
///
/// Large but finite so sorting and arithmetic stay well-defined.
pub const EXHAUSTED_SCORE: f64 = 9999.9;

pub const DEFAULT_PATH_TITLE: &str = "Serendipitous Connection";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One conversational record owned by one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub summary: String,

    /// Free-form timestamp, shown verbatim to the oracle
    #[serde(default)]
    pub timestamp: Option<String>,

    pub embedding: Vec<f32>,

    /// Optional category tag (e.g. "humanistic", "practical")
    #[serde(default)]
    pub category: Option<String>,
}

/// Which account of a match group an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Current,
    Peer,
}

/// An item occurrence inside one run, addressed by its row index.
#[derive(Debug, Clone)]
pub struct RowItem {
    pub row: RowIndex,
    pub side: Side,
    pub item: Arc<Item>,
}

/// Priority of a cluster. Lower is more promising.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceScore {
    pub total: f64,
    pub imbalance: f64,
    pub magnitude_factor: f64,
    pub distance: f64,
    /// One side has no unconsumed items left
    #[serde(default)]
    pub exhausted: bool,
}

impl BalanceScore {
    pub fn exhausted() -> Self {
        Self {
            total: EXHAUSTED_SCORE,
            imbalance: EXHAUSTED_SCORE,
            magnitude_factor: EXHAUSTED_SCORE,
            distance: EXHAUSTED_SCORE,
            exhausted: true,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Raw components in a fixed order: imbalance, magnitude, distance.
    pub fn components(&self) -> [f64; 3] {
        [self.imbalance, self.magnitude_factor, self.distance]
    }
}

impl Default for BalanceScore {
    fn default() -> Self {
        Self {
            total: 0.0,
            imbalance: 0.0,
            magnitude_factor: 0.0,
            distance: 0.0,
            exhausted: false,
        }
    }
}

/// The three partitions of a path, as row indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathIndices {
    pub common: Vec<RowIndex>,
    pub unique_current: Vec<RowIndex>,
    pub unique_peer: Vec<RowIndex>,
}

impl PathIndices {
    pub fn iter(&self) -> impl Iterator<Item = RowIndex> + '_ {
        self.common
            .iter()
            .chain(self.unique_current.iter())
            .chain(self.unique_peer.iter())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.common.len() + self.unique_current.len() + self.unique_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A path is coherent only when all three partitions are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.common.is_empty() && !self.unique_current.is_empty() && !self.unique_peer.is_empty()
    }
}

/// Free-text fields proposed by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathNarrative {
    pub title: String,
    pub description: String,
    pub current_branches: String,
    pub peer_branches: String,
    pub current_call_to_action: String,
    pub peer_call_to_action: String,
    pub is_sensitive: bool,
}

/// One accepted connection, still addressed by row indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub path_id: String,
    pub current_account: AccountId,
    pub peer_account: AccountId,
    pub match_group_id: MatchGroupId,
    pub cluster_id: ClusterId,
    pub category: String,
    pub iteration: u32,
    pub indices: PathIndices,
    pub narrative: PathNarrative,
    pub balance_score: BalanceScore,
    pub oracle_output: String,
    pub created_at: u64,
}

/// A path whose row indices were remapped to stable item ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPath {
    #[serde(flatten)]
    pub record: PathRecord,
    pub common_ids: Vec<String>,
    pub current_ids: Vec<String>,
    pub peer_ids: Vec<String>,
    pub current_path_length: usize,
    pub peer_path_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exhausted_score_is_finite_and_detected() {
        let score = BalanceScore::exhausted();
        assert!(score.total.is_finite());
        assert!(score.is_exhausted());
        assert!(!BalanceScore::default().is_exhausted());
    }

    #[test]
    fn path_indices_completeness() {
        let mut indices = PathIndices {
            common: vec![1, 2],
            unique_current: vec![3],
            unique_peer: vec![],
        };
        assert!(!indices.is_complete());
        indices.unique_peer.push(7);
        assert!(indices.is_complete());
        assert_eq!(indices.iter().collect::<Vec<_>>(), vec![1, 2, 3, 7]);
        assert_eq!(indices.len(), 4);
    }

    #[test]
    fn item_deserializes_with_optional_fields() {
        let item: Item =
            serde_json::from_str(r#"{"id":"c-1","embedding":[0.1,0.2]}"#).expect("item");
        assert_eq!(item.id, "c-1");
        assert_eq!(item.category, None);
        assert_eq!(item.title, "");
    }

    #[test]
    fn account_id_is_transparent() {
        let id = AccountId::from("alice");
        assert_eq!(serde_json::to_string(&id).expect("json"), "\"alice\"");
        assert_eq!(id.to_string(), "alice");
    }
}
