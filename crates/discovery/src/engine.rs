use crate::collaborators::{CancelFlag, ItemSource, Oracle, PathSink, PeerDirectory};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::report::{MatchGroupReport, RunReport};
use crate::scheduler::{PathScheduler, ScheduleResult};
use crate::validator;
use crate::work::{AccountItems, MatchGroup, RowTable};
use serendipity_clustering::{BoundedClusterBuilder, BuildOutcome};
use serendipity_protocol::{AccountId, MatchGroupId, ResolvedPath};
use serendipity_scoring::{AccountMatcher, PeerRanking, PeerScore};
use serendipity_vector_store::normalized_matrix;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A ranked peer with its loaded items.
#[derive(Debug, Clone)]
pub struct RankedPeer {
    pub score: PeerScore,
    pub items: Arc<AccountItems>,
}

/// Top-k ranking that only holds items for peers still in the ranking.
struct PeerPool {
    ranking: PeerRanking,
    loaded: HashMap<AccountId, Arc<AccountItems>>,
}

impl PeerPool {
    fn new(ranking: PeerRanking) -> Self {
        Self {
            ranking,
            loaded: HashMap::new(),
        }
    }

    fn offer(&mut self, score: PeerScore, items: Arc<AccountItems>) {
        let account = score.account.clone();
        self.loaded.insert(account, items);
        if let Some(dropped) = self.ranking.offer(score) {
            self.loaded.remove(&dropped.account);
        }
    }

    #[cfg(test)]
    fn retained(&self) -> usize {
        self.loaded.len()
    }

    fn into_ranked(mut self) -> Vec<RankedPeer> {
        self.ranking
            .into_sorted()
            .into_iter()
            .filter_map(|score| {
                self.loaded
                    .remove(&score.account)
                    .map(|items| RankedPeer { score, items })
            })
            .collect()
    }
}

/// Runs path discovery for accounts against their best-matching peers.
#[derive(Clone)]
pub struct DiscoveryEngine {
    config: Arc<DiscoveryConfig>,
    items: Arc<dyn ItemSource>,
    peers: Arc<dyn PeerDirectory>,
    oracle: Arc<dyn Oracle>,
    sink: Arc<dyn PathSink>,
}

impl DiscoveryEngine {
    pub fn new(
        config: DiscoveryConfig,
        items: Arc<dyn ItemSource>,
        peers: Arc<dyn PeerDirectory>,
        oracle: Arc<dyn Oracle>,
        sink: Arc<dyn PathSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            items,
            peers,
            oracle,
            sink,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Load and normalize an account's items.
    ///
    /// `None` when the account has no usable items; the caller skips it.
    pub async fn load_account(&self, account: &AccountId) -> Result<Option<Arc<AccountItems>>> {
        let loaded = match self.items.load_items(account).await {
            Ok(items) => items,
            Err(e) => {
                log::warn!("Skipping {account}: {e}");
                return Ok(None);
            }
        };
        let total = loaded.len();
        let items: Vec<_> = loaded
            .into_iter()
            .filter(|item| {
                !item.embedding.is_empty() && item.embedding.iter().all(|v| v.is_finite())
            })
            .map(Arc::new)
            .collect();
        if items.len() < total {
            log::warn!(
                "{account}: ignoring {} items with missing or non-finite embeddings",
                total - items.len()
            );
        }
        let Some(dimension) = items.first().map(|item| item.embedding.len()) else {
            log::info!("Skipping {account}: no items with usable embeddings");
            return Ok(None);
        };

        let rows: Vec<&[f32]> = items.iter().map(|item| item.embedding.as_slice()).collect();
        let vectors = match normalized_matrix(&rows, dimension) {
            Ok(vectors) => vectors,
            Err(e) => {
                log::warn!("Skipping {account}: {e}");
                return Ok(None);
            }
        };
        Ok(Some(Arc::new(AccountItems {
            account: account.clone(),
            items,
            vectors,
        })))
    }

    /// Rank the account's peers and keep the top `top_k_peers`, best first.
    ///
    /// Peers are loaded one at a time; peers without data or with a
    /// different embedding width are skipped.
    pub async fn rank_peers(&self, current: &Arc<AccountItems>) -> Result<Vec<RankedPeer>> {
        let matcher = AccountMatcher::new(
            self.config.top_k_peers,
            self.config.peer_strategy(),
            self.config.seed,
        )?;
        let candidates = self.peers.peers_of(&current.account).await?;
        log::info!(
            "{}: ranking {} candidate peers",
            current.account,
            candidates.len()
        );

        let mut pool = PeerPool::new(matcher.ranking());
        for candidate in candidates {
            if candidate == current.account {
                continue;
            }
            let Some(peer) = self.load_account(&candidate).await? else {
                continue;
            };
            if peer.dimension() != current.dimension() {
                log::warn!(
                    "Skipping peer {candidate}: embedding width {} differs from {}",
                    peer.dimension(),
                    current.dimension()
                );
                continue;
            }

            let similarity = {
                let matcher = matcher.clone();
                let current = Arc::clone(current);
                let peer = Arc::clone(&peer);
                tokio::task::spawn_blocking(move || {
                    matcher.score_peer(current.vectors.view(), peer.vectors.view())
                })
                .await
                .map_err(|e| DiscoveryError::TaskFailed(e.to_string()))?
            };
            match similarity {
                Ok(similarity) => pool.offer(
                    PeerScore {
                        account: candidate,
                        similarity,
                    },
                    peer,
                ),
                Err(e) => log::warn!("Skipping peer {candidate}: {e}"),
            }
        }

        Ok(pool.into_ranked())
    }

    /// Cluster the current account against each ranked peer.
    ///
    /// Row indices and cluster ids are unique across all returned groups.
    pub async fn build_match_groups(
        &self,
        current: &Arc<AccountItems>,
        ranked: &[RankedPeer],
    ) -> Result<(Vec<MatchGroup>, RowTable)> {
        let builder = BoundedClusterBuilder::new(
            self.config.cluster_bound(),
            self.config.max_cluster_iterations,
        )?;
        let mut table = RowTable::new();
        let mut groups = Vec::with_capacity(ranked.len());

        for (rank, peer) in ranked.iter().enumerate() {
            let assignment = {
                let builder = builder.clone();
                let current = Arc::clone(current);
                let peer_items = Arc::clone(&peer.items);
                tokio::task::spawn_blocking(move || {
                    builder.build(current.vectors.view(), peer_items.vectors.view())
                })
                .await
                .map_err(|e| DiscoveryError::TaskFailed(e.to_string()))??
            };
            if assignment.outcome == BuildOutcome::Degenerate {
                log::info!("Skipping peer {}: no cross-account pairing", peer.score.account);
                continue;
            }

            let group = MatchGroup::from_assignment(
                rank as MatchGroupId,
                current,
                &peer.items,
                peer.score.similarity,
                &assignment,
                &self.config.default_category,
                &mut table,
            );
            log::debug!(
                "Match group {} ({} -> {}): {} clusters over {} items",
                group.id,
                group.current_account,
                group.peer_account,
                group.clusters.len(),
                group.item_count()
            );
            groups.push(group);
        }

        Ok((groups, table))
    }

    /// Cluster one specific pair of accounts.
    pub async fn cluster_pair(
        &self,
        account: &AccountId,
        peer: &AccountId,
    ) -> Result<Option<MatchGroup>> {
        let (Some(current), Some(other)) =
            (self.load_account(account).await?, self.load_account(peer).await?)
        else {
            return Ok(None);
        };
        let ranked = RankedPeer {
            score: PeerScore {
                account: peer.clone(),
                similarity: 0.0,
            },
            items: other,
        };
        let (mut groups, _) = self.build_match_groups(&current, &[ranked]).await?;
        Ok(groups.pop())
    }

    /// Discover and persist paths for one account.
    ///
    /// Match groups are scheduled concurrently; any failing group aborts
    /// this account's run and nothing is persisted.
    pub async fn run_account(&self, account: &AccountId, cancel: &CancelFlag) -> Result<RunReport> {
        let Some(current) = self.load_account(account).await? else {
            return Ok(RunReport::skipped(account.clone()));
        };
        let ranked = self.rank_peers(&current).await?;
        let peers_considered = ranked.len();
        let (groups, table) = self.build_match_groups(&current, &ranked).await?;
        drop(ranked);

        let mut tasks = JoinSet::new();
        let mut reports: HashMap<MatchGroupId, MatchGroupReport> = HashMap::new();
        for group in groups {
            reports.insert(
                group.id,
                MatchGroupReport {
                    match_group_id: group.id,
                    peer_account: group.peer_account.clone(),
                    peer_similarity: group.peer_similarity,
                    clusters: group.clusters.len(),
                    items: group.item_count(),
                    paths: 0,
                    duplicates_removed: 0,
                    stats: Default::default(),
                },
            );
            let scheduler = PathScheduler::new(
                Arc::clone(&self.config),
                Arc::clone(&self.oracle),
                cancel.clone(),
            )?;
            tasks.spawn(async move { scheduler.run(&group).await });
        }

        let mut results: Vec<ScheduleResult> = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| DiscoveryError::TaskFailed(e.to_string()))??;
            results.push(result);
        }
        results.sort_by_key(|r| r.match_group_id);

        let mut resolved: Vec<ResolvedPath> = Vec::new();
        for result in results {
            let (paths, removed) = validator::finalize(
                result.match_group_id,
                result.paths,
                &table,
                self.config.duplicate_policy,
            )?;
            if let Some(report) = reports.get_mut(&result.match_group_id) {
                report.paths = paths.len();
                report.duplicates_removed = removed;
                report.stats = result.stats;
            }
            resolved.extend(paths);
        }

        if !resolved.is_empty() {
            self.sink.persist(&resolved).await?;
        }

        let mut match_groups: Vec<MatchGroupReport> = reports.into_values().collect();
        match_groups.sort_by_key(|r| r.match_group_id);
        log::info!(
            "{account}: {} paths across {} match groups",
            resolved.len(),
            match_groups.len()
        );
        Ok(RunReport {
            account: account.clone(),
            skipped: false,
            items: current.len(),
            peers_considered,
            match_groups,
            paths_emitted: resolved.len(),
        })
    }

    /// Run several accounts in parallel. Each result is independent.
    pub async fn run_accounts(
        &self,
        accounts: Vec<AccountId>,
        cancel: &CancelFlag,
    ) -> Vec<(AccountId, Result<RunReport>)> {
        let mut tasks = JoinSet::new();
        for (pos, account) in accounts.iter().cloned().enumerate() {
            let engine = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = engine.run_account(&account, &cancel).await;
                (pos, result)
            });
        }

        let mut results: Vec<Option<Result<RunReport>>> = accounts.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, result)) => {
                    if let Err(e) = &result {
                        log::error!("Run for {} failed: {e}", accounts[pos]);
                    }
                    results[pos] = Some(result);
                }
                Err(e) => log::error!("Account task failed: {e}"),
            }
        }

        accounts
            .into_iter()
            .zip(results)
            .map(|(account, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(DiscoveryError::TaskFailed(format!("run for {account} did not complete")))
                });
                (account, result)
            })
            .collect()
    }
}
