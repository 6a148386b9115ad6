use crate::scheduler::ScheduleStats;
use serde::Serialize;
use serendipity_protocol::{AccountId, MatchGroupId};

/// Summary of one match group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchGroupReport {
    pub match_group_id: MatchGroupId,
    pub peer_account: AccountId,
    pub peer_similarity: f32,
    pub clusters: usize,
    pub items: usize,
    pub paths: usize,
    pub duplicates_removed: usize,
    #[serde(flatten)]
    pub stats: ScheduleStats,
}

/// Summary of one account's run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub account: AccountId,
    /// Set when the account had no usable items
    pub skipped: bool,
    pub items: usize,
    pub peers_considered: usize,
    pub match_groups: Vec<MatchGroupReport>,
    pub paths_emitted: usize,
}

impl RunReport {
    pub fn skipped(account: AccountId) -> Self {
        Self {
            account,
            skipped: true,
            items: 0,
            peers_considered: 0,
            match_groups: Vec::new(),
            paths_emitted: 0,
        }
    }

    pub fn oracle_calls(&self) -> usize {
        self.match_groups.iter().map(|g| g.stats.oracle_calls).sum()
    }

    pub fn accepted(&self) -> usize {
        self.match_groups.iter().map(|g| g.stats.accepted).sum()
    }

    pub fn rejected(&self) -> usize {
        self.match_groups.iter().map(|g| g.stats.rejected).sum()
    }

    pub fn clusters(&self) -> usize {
        self.match_groups.iter().map(|g| g.clusters).sum()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.match_groups.iter().map(|g| g.duplicates_removed).sum()
    }
}
