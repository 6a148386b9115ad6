//! Seams to the outside world: item storage, peer enumeration, the
//! language-model oracle and durable path storage.

use crate::error::Result;
use async_trait::async_trait;
use serendipity_protocol::{AccountId, Item, ResolvedPath};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Yields an account's items with populated embeddings.
///
/// An empty list means the account has no materialized data and is skipped.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn load_items(&self, account: &AccountId) -> Result<Vec<Item>>;
}

/// Lists the other accounts with available data.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Never contains `account` itself.
    async fn peers_of(&self, account: &AccountId) -> Result<Vec<AccountId>>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleFailure {
    #[error("oracle transport failed: {0}")]
    Transport(String),

    #[error("oracle timed out")]
    Timeout,

    #[error("oracle returned no completion")]
    Missing,
}

/// One completion string or a failure marker.
pub type OracleReply = std::result::Result<String, OracleFailure>;

/// Language-model completion backend.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// One reply per prompt, in prompt order.
    async fn complete_batch(&self, prompts: Vec<String>) -> Vec<OracleReply>;
}

/// Durable storage for finalized paths.
#[async_trait]
pub trait PathSink: Send + Sync {
    async fn persist(&self, paths: &[ResolvedPath]) -> Result<()>;
}

/// Cooperative cancellation flag shared by every task of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
