use serendipity_protocol::{AccountId, MatchGroupId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Item source error for {account}: {reason}")]
    Source { account: AccountId, reason: String },

    #[error("Path sink error: {0}")]
    Sink(String),

    #[error("Data integrity violation in match group {match_group_id}: {details}")]
    DataIntegrity {
        match_group_id: MatchGroupId,
        details: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Match group task failed: {0}")]
    TaskFailed(String),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] serendipity_vector_store::VectorStoreError),

    #[error("Clustering error: {0}")]
    ClusteringError(#[from] serendipity_clustering::ClusteringError),

    #[error("Scoring error: {0}")]
    ScoringError(#[from] serendipity_scoring::ScoringError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl DiscoveryError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn integrity(match_group_id: MatchGroupId, details: impl Into<String>) -> Self {
        Self::DataIntegrity {
            match_group_id,
            details: details.into(),
        }
    }

    pub fn source_failed(account: &AccountId, reason: impl Into<String>) -> Self {
        Self::Source {
            account: account.clone(),
            reason: reason.into(),
        }
    }
}
