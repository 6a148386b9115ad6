use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoringError>;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] serendipity_vector_store::VectorStoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
