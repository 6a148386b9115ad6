use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusteringError>;

#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] serendipity_vector_store::VectorStoreError),

    #[error("Shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClusteringError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
