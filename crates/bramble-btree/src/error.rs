use bramble_store::StoreError;

/// Errors from building or traversing trees.
#[derive(Debug, thiserror::Error)]
pub enum BTreeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid object size limits: {0}")]
    InvalidLimits(String),
}

pub type BTreeResult<T> = Result<T, BTreeError>;
