use crate::exclusion::ExclusionSet;
use ndarray::{Array2, ArrayView2, Axis};
use serendipity_clustering::ClusterAssignment;
use serendipity_protocol::{AccountId, ClusterId, Item, MatchGroupId, RowIndex, RowItem, Side};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Row index to stable item id, built once per account run.
///
/// Row indices are handed out consecutively, so the table is a plain vector.
#[derive(Debug, Clone, Default)]
pub struct RowTable {
    ids: Vec<String>,
    next_cluster: ClusterId,
}

impl RowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_row(&mut self, item: &Item) -> RowIndex {
        self.ids.push(item.id.clone());
        self.ids.len() - 1
    }

    pub fn alloc_cluster(&mut self) -> ClusterId {
        let id = self.next_cluster;
        self.next_cluster += 1;
        id
    }

    pub fn resolve(&self, row: RowIndex) -> Option<&str> {
        self.ids.get(row).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One account's items with their normalized embedding matrix.
#[derive(Debug, Clone)]
pub struct AccountItems {
    pub account: AccountId,
    pub items: Vec<Arc<Item>>,
    pub vectors: Array2<f32>,
}

impl AccountItems {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }
}

/// A cluster's members on both sides, ready for scheduling.
#[derive(Debug, Clone)]
pub struct ClusterWork {
    pub id: ClusterId,
    pub category: String,
    pub current: Vec<RowItem>,
    pub peer: Vec<RowItem>,
    /// Normalized rows aligned with `current`
    pub current_vectors: Array2<f32>,
    /// Normalized rows aligned with `peer`
    pub peer_vectors: Array2<f32>,
}

/// Members not yet consumed by an accepted path.
#[derive(Debug)]
pub struct Remaining<'a> {
    pub current: Vec<&'a RowItem>,
    pub peer: Vec<&'a RowItem>,
    pub current_vectors: Array2<f32>,
    pub peer_vectors: Array2<f32>,
}

impl Remaining<'_> {
    pub fn is_exhausted(&self) -> bool {
        self.current.is_empty() || self.peer.is_empty()
    }
}

impl ClusterWork {
    pub fn len(&self) -> usize {
        self.current.len() + self.peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self, exclusions: &ExclusionSet) -> Remaining<'_> {
        let (current, current_vectors) =
            unconsumed(&self.current, self.current_vectors.view(), exclusions);
        let (peer, peer_vectors) = unconsumed(&self.peer, self.peer_vectors.view(), exclusions);
        Remaining {
            current,
            peer,
            current_vectors,
            peer_vectors,
        }
    }
}

fn unconsumed<'a>(
    rows: &'a [RowItem],
    vectors: ArrayView2<f32>,
    exclusions: &ExclusionSet,
) -> (Vec<&'a RowItem>, Array2<f32>) {
    let positions: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| !exclusions.contains(r.row))
        .map(|(pos, _)| pos)
        .collect();
    let kept = positions.iter().map(|&pos| &rows[pos]).collect();
    (kept, vectors.select(Axis(0), &positions))
}

/// The pairing of the current account with one ranked peer.
#[derive(Debug, Clone)]
pub struct MatchGroup {
    pub id: MatchGroupId,
    pub current_account: AccountId,
    pub peer_account: AccountId,
    pub peer_similarity: f32,
    pub clusters: Vec<ClusterWork>,
}

impl MatchGroup {
    /// Turn a cluster assignment into scheduled work, allocating run-unique
    /// row indices and cluster ids from `table`.
    pub fn from_assignment(
        id: MatchGroupId,
        current: &AccountItems,
        peer: &AccountItems,
        peer_similarity: f32,
        assignment: &ClusterAssignment,
        default_category: &str,
        table: &mut RowTable,
    ) -> Self {
        let clusters = assignment
            .partitions()
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| {
                let cluster_id = table.alloc_cluster();
                let current_rows = rows_for(&part.current, &current.items, Side::Current, table);
                let peer_rows = rows_for(&part.peer, &peer.items, Side::Peer, table);
                let category = majority_category(
                    current_rows.iter().chain(peer_rows.iter()).map(|r| r.item.as_ref()),
                    default_category,
                );
                ClusterWork {
                    id: cluster_id,
                    category,
                    current_vectors: current.vectors.select(Axis(0), &part.current),
                    peer_vectors: peer.vectors.select(Axis(0), &part.peer),
                    current: current_rows,
                    peer: peer_rows,
                }
            })
            .collect();

        Self {
            id,
            current_account: current.account.clone(),
            peer_account: peer.account.clone(),
            peer_similarity,
            clusters,
        }
    }

    pub fn item_count(&self) -> usize {
        self.clusters.iter().map(ClusterWork::len).sum()
    }
}

fn rows_for(
    positions: &[usize],
    items: &[Arc<Item>],
    side: Side,
    table: &mut RowTable,
) -> Vec<RowItem> {
    positions
        .iter()
        .map(|&pos| {
            let item = Arc::clone(&items[pos]);
            RowItem {
                row: table.alloc_row(&item),
                side,
                item,
            }
        })
        .collect()
}

/// Most frequent tag among `items`; ties go to the lexicographically
/// smallest tag. Untagged items do not vote.
pub fn majority_category<'a>(items: impl Iterator<Item = &'a Item>, default: &str) -> String {
    let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
    for tag in items.filter_map(|item| item.category.as_deref()) {
        let tag = tag.trim();
        if !tag.is_empty() {
            *votes.entry(tag).or_default() += 1;
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (tag, count) in votes {
        match best {
            Some((_, top)) if count <= top => {}
            _ => best = Some((tag, count)),
        }
    }
    best.map_or_else(|| default.to_string(), |(tag, _)| tag.to_string())
}
