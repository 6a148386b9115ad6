use crate::collaborators::{ItemSource, Oracle, OracleReply, PathSink, PeerDirectory};
use crate::error::Result;
use async_trait::async_trait;
use serendipity_protocol::{AccountId, Item, ResolvedPath};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::Mutex;

/// Accounts held in memory. Serves both items and peer enumeration.
#[derive(Debug, Clone, Default)]
pub struct MemoryItemSource {
    accounts: BTreeMap<AccountId, Vec<Item>>,
}

impl MemoryItemSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: impl Into<AccountId>, items: Vec<Item>) -> Self {
        self.insert(account, items);
        self
    }

    pub fn insert(&mut self, account: impl Into<AccountId>, items: Vec<Item>) {
        self.accounts.insert(account.into(), items);
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.accounts.keys()
    }
}

#[async_trait]
impl ItemSource for MemoryItemSource {
    async fn load_items(&self, account: &AccountId) -> Result<Vec<Item>> {
        Ok(self.accounts.get(account).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PeerDirectory for MemoryItemSource {
    async fn peers_of(&self, account: &AccountId) -> Result<Vec<AccountId>> {
        Ok(self
            .accounts
            .iter()
            .filter(|(id, items)| *id != account && !items.is_empty())
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// Collects persisted paths.
#[derive(Debug, Default)]
pub struct MemorySink {
    paths: Mutex<Vec<ResolvedPath>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn paths(&self) -> Vec<ResolvedPath> {
        self.paths.lock().await.clone()
    }
}

#[async_trait]
impl PathSink for MemorySink {
    async fn persist(&self, paths: &[ResolvedPath]) -> Result<()> {
        self.paths.lock().await.extend_from_slice(paths);
        Ok(())
    }
}

/// Oracle that replays canned replies in order, then answers `{}`.
///
/// Every prompt it receives is recorded.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<OracleReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: impl IntoIterator<Item = OracleReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete_batch(&self, prompts: Vec<String>) -> Vec<OracleReply> {
        let mut replies = self.replies.lock().await;
        let out = prompts
            .iter()
            .map(|_| replies.pop_front().unwrap_or_else(|| Ok("{}".to_string())))
            .collect();
        self.prompts.lock().await.extend(prompts);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::OracleFailure;
    use pretty_assertions::assert_eq;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            title: String::new(),
            summary: String::new(),
            timestamp: None,
            embedding: vec![1.0, 0.0],
            category: None,
        }
    }

    #[tokio::test]
    async fn peers_exclude_self_and_empty_accounts() {
        let source = MemoryItemSource::new()
            .with_account("a", vec![item("1")])
            .with_account("b", vec![item("2")])
            .with_account("c", vec![]);
        let peers = source.peers_of(&AccountId::from("a")).await.unwrap();
        assert_eq!(peers, vec![AccountId::from("b")]);
        assert!(source
            .load_items(&AccountId::from("zzz"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn scripted_oracle_replays_then_answers_empty() {
        let oracle = ScriptedOracle::new([Err(OracleFailure::Timeout)]);
        let replies = oracle
            .complete_batch(vec!["p1".to_string(), "p2".to_string()])
            .await;
        assert_eq!(replies, vec![Err(OracleFailure::Timeout), Ok("{}".to_string())]);
        assert_eq!(oracle.prompts().await.len(), 2);
    }
}
