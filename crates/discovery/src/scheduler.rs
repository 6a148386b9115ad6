use crate::collaborators::{CancelFlag, Oracle, OracleFailure};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::exclusion::ExclusionSet;
use crate::oracle::{interpret_reply, OracleRequest, Outcome, Proposal, RejectReason};
use crate::work::{ClusterWork, MatchGroup};
use serde::Serialize;
use serendipity_protocol::{BalanceScore, ClusterId, MatchGroupId, PathRecord};
use serendipity_scoring::{BalanceScorer, CohortScorer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters of one match group's scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleStats {
    pub oracle_calls: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub oracle_failures: usize,
    /// Clusters dropped because a side ran out before an oracle call
    pub skipped: usize,
    /// Clusters dropped by the rejection guard
    pub abandoned: usize,
}

/// Everything one match group produced.
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub match_group_id: MatchGroupId,
    pub paths: Vec<PathRecord>,
    pub exclusions: ExclusionSet,
    pub stats: ScheduleStats,
}

/// Whether a cohort still has clusters to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortState {
    Active,
    Exhausted,
}

#[derive(Debug)]
struct ActiveCluster<'g> {
    work: &'g ClusterWork,
    score: BalanceScore,
    rejections: usize,
}

/// Clusters of one category competing for that category's quota.
#[derive(Debug)]
pub struct Cohort<'g> {
    category: String,
    quota: usize,
    emitted: usize,
    scorer: CohortScorer,
    active: Vec<ActiveCluster<'g>>,
}

impl Cohort<'_> {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn state(&self) -> CohortState {
        if self.active.is_empty() {
            CohortState::Exhausted
        } else {
            CohortState::Active
        }
    }

    pub fn quota_reached(&self) -> bool {
        self.emitted >= self.quota
    }

    pub fn active_clusters(&self) -> Vec<ClusterId> {
        self.active.iter().map(|c| c.work.id).collect()
    }

    /// Lowest score first, ties by cluster id.
    fn next_position(&self) -> Option<usize> {
        self.active
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.score
                    .total
                    .total_cmp(&b.score.total)
                    .then_with(|| a.work.id.cmp(&b.work.id))
            })
            .map(|(pos, _)| pos)
    }
}

/// What one scheduler step did.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The cluster had an empty side after exclusion; no oracle call
    Skipped { cluster_id: ClusterId },
    Accepted(Box<PathRecord>),
    Rejected {
        cluster_id: ClusterId,
        reason: RejectReason,
    },
    /// Nothing left to select
    Idle,
}

/// Sequential path discovery over one match group.
pub struct PathScheduler {
    config: Arc<DiscoveryConfig>,
    scorer: BalanceScorer,
    oracle: Arc<dyn Oracle>,
    cancel: CancelFlag,
    iterations: HashMap<ClusterId, u32>,
    stats: ScheduleStats,
}

impl PathScheduler {
    pub fn new(
        config: Arc<DiscoveryConfig>,
        oracle: Arc<dyn Oracle>,
        cancel: CancelFlag,
    ) -> Result<Self> {
        let scorer = BalanceScorer::new(
            config.weights,
            config.magnitude_enabled,
            config.exact_match_max_items,
            config.sample_size,
            config.seed,
        )?;
        Ok(Self {
            config,
            scorer,
            oracle,
            cancel,
            iterations: HashMap::new(),
            stats: ScheduleStats::default(),
        })
    }

    /// Run every category in descending ratio order until the quotas are
    /// spent or the clusters run dry.
    pub async fn run(mut self, group: &MatchGroup) -> Result<ScheduleResult> {
        let overall = self.config.overall_path_quota;
        let mut exclusions = ExclusionSet::new();
        let mut paths: Vec<PathRecord> = Vec::new();

        for (category, ratio) in self.config.ordered_categories() {
            if paths.len() >= overall {
                log::info!(
                    "Match group {}: overall quota of {overall} paths reached",
                    group.id
                );
                break;
            }
            let quota = self.config.category_quota(ratio);
            let mut cohort = self.open_cohort(group, &category, quota, &exclusions)?;
            log::debug!(
                "Match group {}: category {category} (ratio {ratio}, quota {quota}) with {} clusters",
                group.id,
                cohort.active.len()
            );

            while cohort.state() == CohortState::Active
                && !cohort.quota_reached()
                && paths.len() < overall
            {
                let (next, step) = self.step(group, &mut cohort, exclusions).await?;
                exclusions = next;
                if let Step::Accepted(record) = step {
                    paths.push(*record);
                }
            }

            if cohort.state() == CohortState::Exhausted {
                log::info!(
                    "Match group {}: category {category} exhausted after {} paths",
                    group.id,
                    cohort.emitted
                );
            }
        }

        log::info!(
            "Match group {} ({} -> {}): {} paths from {} oracle calls",
            group.id,
            group.current_account,
            group.peer_account,
            paths.len(),
            self.stats.oracle_calls
        );

        Ok(ScheduleResult {
            match_group_id: group.id,
            paths,
            exclusions,
            stats: self.stats,
        })
    }

    /// Score a category's clusters and fit the cohort standardization.
    /// Clusters with nothing to offer are left out before fitting.
    pub fn open_cohort<'g>(
        &self,
        group: &'g MatchGroup,
        category: &str,
        quota: usize,
        exclusions: &ExclusionSet,
    ) -> Result<Cohort<'g>> {
        let mut scored = Vec::new();
        for work in group.clusters.iter().filter(|c| c.category == category) {
            let remaining = work.remaining(exclusions);
            match self
                .scorer
                .raw(remaining.current_vectors.view(), remaining.peer_vectors.view())?
            {
                Some(raw) => scored.push((work, raw)),
                None => log::debug!("Cluster {} has nothing to offer, not scheduled", work.id),
            }
        }

        let raws: Vec<_> = scored.iter().map(|(_, raw)| *raw).collect();
        let scorer = self.scorer.fit_cohort(&raws);
        let active = scored
            .into_iter()
            .map(|(work, raw)| ActiveCluster {
                work,
                score: scorer.score_raw(Some(raw)),
                rejections: 0,
            })
            .collect();

        Ok(Cohort {
            category: category.to_string(),
            quota,
            emitted: 0,
            scorer,
            active,
        })
    }

    /// One iteration: select, ask, validate, record, rescore.
    ///
    /// Takes the exclusion set by value and returns its successor, which is
    /// always a superset.
    pub async fn step(
        &mut self,
        group: &MatchGroup,
        cohort: &mut Cohort<'_>,
        exclusions: ExclusionSet,
    ) -> Result<(ExclusionSet, Step)> {
        if self.cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        let Some(pos) = cohort.next_position() else {
            return Ok((exclusions, Step::Idle));
        };
        let work = cohort.active[pos].work;
        let selected_score = cohort.active[pos].score;

        let request = {
            let remaining = work.remaining(&exclusions);
            if remaining.is_exhausted() {
                cohort.active.swap_remove(pos);
                self.stats.skipped += 1;
                log::debug!("Cluster {} exhausted before request, dropped", work.id);
                return Ok((exclusions, Step::Skipped { cluster_id: work.id }));
            }
            OracleRequest::build(&remaining)
        };

        let reply = self
            .oracle
            .complete_batch(vec![request.prompt.clone()])
            .await
            .into_iter()
            .next()
            .unwrap_or(Err(OracleFailure::Missing));
        self.stats.oracle_calls += 1;

        let oracle_output = reply.as_ref().cloned().unwrap_or_default();
        let (exclusions, step) = match interpret_reply(reply, &request) {
            Outcome::Accepted(proposal) => {
                let record = self.record(
                    group,
                    work,
                    &cohort.category,
                    selected_score,
                    proposal,
                    oracle_output,
                );
                self.stats.accepted += 1;
                cohort.emitted += 1;
                cohort.active[pos].rejections = 0;
                log::debug!(
                    "Cluster {}: accepted path {} ({} items)",
                    work.id,
                    record.path_id,
                    record.indices.len()
                );
                let next = exclusions.extended(record.indices.iter());
                (next, Step::Accepted(Box::new(record)))
            }
            Outcome::Rejected(reason) => {
                self.stats.rejected += 1;
                cohort.active[pos].rejections += 1;
                match &reason {
                    RejectReason::OracleFailed(failure) => {
                        self.stats.oracle_failures += 1;
                        log::warn!("Cluster {}: oracle failed: {failure}", work.id);
                    }
                    RejectReason::Unparseable(details) => {
                        log::warn!("Cluster {}: unparseable oracle reply: {details}", work.id);
                    }
                    RejectReason::NoPath | RejectReason::IncompletePartition => {
                        log::debug!("Cluster {}: no path ({reason:?})", work.id);
                    }
                }
                (
                    exclusions,
                    Step::Rejected {
                        cluster_id: work.id,
                        reason,
                    },
                )
            }
        };

        let remaining = work.remaining(&exclusions);
        let rescored = cohort
            .scorer
            .score(remaining.current_vectors.view(), remaining.peer_vectors.view())?;
        if rescored.is_exhausted() {
            log::debug!("Cluster {} exhausted, removed from scheduling", work.id);
            cohort.active.swap_remove(pos);
        } else if cohort.active[pos].rejections >= self.config.max_rejections_per_cluster {
            log::warn!(
                "Cluster {} abandoned after {} consecutive rejections",
                work.id,
                cohort.active[pos].rejections
            );
            self.stats.abandoned += 1;
            cohort.active.swap_remove(pos);
        } else {
            cohort.active[pos].score = rescored;
        }

        Ok((exclusions, step))
    }

    fn record(
        &mut self,
        group: &MatchGroup,
        work: &ClusterWork,
        category: &str,
        balance_score: BalanceScore,
        proposal: Proposal,
        oracle_output: String,
    ) -> PathRecord {
        let iteration = self.iterations.entry(work.id).or_insert(0);
        let record = PathRecord {
            path_id: path_id(group, work.id, *iteration),
            current_account: group.current_account.clone(),
            peer_account: group.peer_account.clone(),
            match_group_id: group.id,
            cluster_id: work.id,
            category: category.to_string(),
            iteration: *iteration,
            indices: proposal.indices,
            narrative: proposal.narrative,
            balance_score,
            oracle_output,
            created_at: unix_seconds(),
        };
        *iteration += 1;
        record
    }
}

/// Deterministic id of the `iteration`-th path of a cluster.
pub fn path_id(group: &MatchGroup, cluster_id: ClusterId, iteration: u32) -> String {
    let mut hasher = Sha256::new();
    for part in [
        group.current_account.as_str(),
        group.peer_account.as_str(),
        &group.id.to_string(),
        &cluster_id.to_string(),
        &iteration.to_string(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
