use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serendipity_discovery::{
    CancelFlag, DiscoveryConfig, DiscoveryEngine, DiscoveryError, MemoryItemSource, MemorySink,
    Oracle, OracleReply, PathSink, PeerSimilarity, Result,
};
use serendipity_protocol::{AccountId, Item, ResolvedPath};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Proposes a path whenever both sides offer at least two items: the first
/// item of each side is common, the second is unique.
struct PairingOracle;

fn offered(section: &str) -> Vec<usize> {
    section
        .lines()
        .filter_map(|line| line.strip_prefix("ID: "))
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

#[async_trait]
impl Oracle for PairingOracle {
    async fn complete_batch(&self, prompts: Vec<String>) -> Vec<OracleReply> {
        prompts
            .iter()
            .map(|prompt| {
                let (first, second) = prompt
                    .split_once("USER 2 CONVERSATIONS:\n")
                    .unwrap_or((prompt.as_str(), ""));
                let (current, peer) = (offered(first), offered(second));
                if current.len() < 2 || peer.len() < 2 {
                    return Ok("{}".to_string());
                }
                Ok(serde_json::json!({
                    "title": "🔗 Shared thread",
                    "common": [current[0], peer[0]],
                    "unique_1": [current[1]],
                    "unique_2": [peer[1]],
                    "common_background": "Both explore the same topic.",
                    "branches_1": ["- one way"],
                    "branches_2": "- another way",
                    "is_sensitive": false
                })
                .to_string())
            })
            .collect()
    }
}

/// Rejects writes for one account.
struct PickySink {
    inner: MemorySink,
    refuse: AccountId,
}

#[async_trait]
impl PathSink for PickySink {
    async fn persist(&self, paths: &[ResolvedPath]) -> Result<()> {
        if paths.iter().any(|p| p.record.current_account == self.refuse) {
            return Err(DiscoveryError::Sink("refused".to_string()));
        }
        self.inner.persist(paths).await
    }
}

/// Three well-separated topics, two items per topic.
fn account_items(prefix: &str, offset: f32) -> Vec<Item> {
    let mut items = Vec::new();
    for topic in 0..3 {
        for k in 0..2 {
            let mut embedding = vec![0.0_f32; 3];
            embedding[topic] = 1.0;
            embedding[(topic + 1) % 3] = 0.01 * (k as f32 + offset);
            items.push(Item {
                id: format!("{prefix}-{topic}-{k}"),
                title: format!("{prefix} topic {topic}"),
                summary: format!("Notes on topic {topic}"),
                timestamp: Some("2024-05-01 10:00".to_string()),
                embedding,
                category: Some("humanistic".to_string()),
            });
        }
    }
    items
}

fn source() -> Arc<MemoryItemSource> {
    Arc::new(
        MemoryItemSource::new()
            .with_account("alice", account_items("alice", 0.0))
            .with_account("bob", account_items("bob", 2.0))
            .with_account("dave", Vec::new()),
    )
}

fn config() -> DiscoveryConfig {
    DiscoveryConfig {
        top_k_peers: 2,
        max_items_per_cluster: Some(4),
        peer_similarity: PeerSimilarity::Exact,
        category_ratios: BTreeMap::from([("humanistic".to_string(), 1.0)]),
        overall_path_quota: 5,
        ..Default::default()
    }
}

fn engine(sink: Arc<dyn PathSink>) -> DiscoveryEngine {
    let source = source();
    DiscoveryEngine::new(config(), source.clone(), source, Arc::new(PairingOracle), sink).unwrap()
}

#[tokio::test]
async fn run_account_emits_disjoint_resolved_paths() {
    let sink = Arc::new(MemorySink::new());
    let report = engine(sink.clone())
        .run_account(&AccountId::from("alice"), &CancelFlag::new())
        .await
        .unwrap();

    assert!(!report.skipped);
    assert_eq!(report.items, 6);
    assert_eq!(report.peers_considered, 1);
    assert_eq!(report.match_groups.len(), 1);
    assert_eq!(report.clusters(), 3);
    assert_eq!(report.paths_emitted, 3);
    assert_eq!(report.accepted(), 3);
    assert_eq!(report.duplicates_removed(), 0);

    let paths = sink.paths().await;
    assert_eq!(paths.len(), 3);

    let mut seen = HashSet::new();
    for path in &paths {
        assert_eq!(path.record.peer_account, AccountId::from("bob"));
        assert_eq!(path.record.category, "humanistic");
        assert!(path.current_ids.iter().all(|id| id.starts_with("alice-")));
        assert!(path.peer_ids.iter().all(|id| id.starts_with("bob-")));
        assert_eq!(path.common_ids.len(), path.record.indices.common.len());
        assert_eq!(path.current_path_length, 3);
        assert_eq!(path.peer_path_length, 3);
        assert_eq!(path.record.narrative.current_branches, "- one way");

        // Each path stays inside one topic.
        let topics: HashSet<&str> = path
            .common_ids
            .iter()
            .chain(&path.current_ids)
            .chain(&path.peer_ids)
            .map(|id| &id[id.find('-').unwrap() + 1..id.rfind('-').unwrap()])
            .collect();
        assert_eq!(topics.len(), 1, "{path:?}");

        for id in path.common_ids.iter().chain(&path.current_ids).chain(&path.peer_ids) {
            assert!(seen.insert(id.clone()), "{id} used twice");
        }
    }
}

#[tokio::test]
async fn empty_account_is_skipped() {
    let report = engine(Arc::new(MemorySink::new()))
        .run_account(&AccountId::from("dave"), &CancelFlag::new())
        .await
        .unwrap();
    assert!(report.skipped);
    assert_eq!(report.paths_emitted, 0);
}

#[tokio::test]
async fn cancelled_run_persists_nothing() {
    let sink = Arc::new(MemorySink::new());
    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = engine(sink.clone())
        .run_account(&AccountId::from("alice"), &cancel)
        .await;
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    assert!(sink.paths().await.is_empty());
}

#[tokio::test]
async fn one_failing_account_does_not_affect_others() {
    let sink = Arc::new(PickySink {
        inner: MemorySink::new(),
        refuse: AccountId::from("bob"),
    });
    let accounts = vec![
        AccountId::from("alice"),
        AccountId::from("bob"),
        AccountId::from("dave"),
    ];
    let results = engine(sink.clone())
        .run_accounts(accounts.clone(), &CancelFlag::new())
        .await;

    let order: Vec<AccountId> = results.iter().map(|(a, _)| a.clone()).collect();
    assert_eq!(order, accounts);
    assert_eq!(results[0].1.as_ref().unwrap().paths_emitted, 3);
    assert!(matches!(results[1].1, Err(DiscoveryError::Sink(_))));
    assert!(results[2].1.as_ref().unwrap().skipped);

    let stored = sink.inner.paths().await;
    assert_eq!(stored.len(), 3);
    assert!(stored
        .iter()
        .all(|p| p.record.current_account == AccountId::from("alice")));
}

#[tokio::test]
async fn rank_peers_skips_mismatched_widths() {
    let mut narrow = account_items("carol", 1.0);
    for item in &mut narrow {
        item.embedding.truncate(2);
    }
    let source = Arc::new(
        MemoryItemSource::new()
            .with_account("alice", account_items("alice", 0.0))
            .with_account("bob", account_items("bob", 2.0))
            .with_account("carol", narrow),
    );
    let engine = DiscoveryEngine::new(
        config(),
        source.clone(),
        source,
        Arc::new(PairingOracle),
        Arc::new(MemorySink::new()),
    )
    .unwrap();

    let current = engine
        .load_account(&AccountId::from("alice"))
        .await
        .unwrap()
        .unwrap();
    let ranked = engine.rank_peers(&current).await.unwrap();
    let ids: Vec<&str> = ranked.iter().map(|p| p.score.account.as_str()).collect();
    assert_eq!(ids, vec!["bob"]);
    assert!(ranked[0].score.similarity > 0.9);
}

#[tokio::test]
async fn non_finite_embeddings_are_dropped_not_fatal() {
    let mut alice = account_items("alice", 0.0);
    alice.push(Item {
        id: "alice-overflow".to_string(),
        title: "Overflowed vector".to_string(),
        summary: String::new(),
        timestamp: None,
        embedding: serde_json::from_str("[1e39, 0.0, 0.0]").unwrap(),
        category: Some("humanistic".to_string()),
    });
    let source = Arc::new(
        MemoryItemSource::new()
            .with_account("alice", alice)
            .with_account("bob", account_items("bob", 2.0)),
    );
    let sink = Arc::new(MemorySink::new());
    let engine = DiscoveryEngine::new(
        config(),
        source.clone(),
        source,
        Arc::new(PairingOracle),
        sink.clone(),
    )
    .unwrap();

    let report = engine
        .run_account(&AccountId::from("alice"), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.items, 6);
    assert_eq!(report.paths_emitted, 3);
    assert!(sink
        .paths()
        .await
        .iter()
        .all(|p| !p.current_ids.contains(&"alice-overflow".to_string())));
}

#[tokio::test]
async fn top_one_peer_keeps_only_the_best_match() {
    let mut far = account_items("erin", 0.0);
    for item in &mut far {
        item.embedding.iter_mut().for_each(|v| *v = -*v);
    }
    let source = Arc::new(
        MemoryItemSource::new()
            .with_account("alice", account_items("alice", 0.0))
            .with_account("bob", account_items("bob", 2.0))
            .with_account("carol", account_items("carol", 30.0))
            .with_account("erin", far),
    );
    let engine = DiscoveryEngine::new(
        DiscoveryConfig {
            top_k_peers: 1,
            ..config()
        },
        source.clone(),
        source,
        Arc::new(PairingOracle),
        Arc::new(MemorySink::new()),
    )
    .unwrap();

    let current = engine
        .load_account(&AccountId::from("alice"))
        .await
        .unwrap()
        .unwrap();
    let ranked = engine.rank_peers(&current).await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].score.account, AccountId::from("bob"));
    assert_eq!(ranked[0].items.account, AccountId::from("bob"));
}
