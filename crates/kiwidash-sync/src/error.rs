use kiwidash_core::ValidationError;
use kiwidash_db::DbError;
use kiwidash_ingest::IngestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] IngestError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] DbError),

    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SyncError {
    /// Stable machine-readable code reported to callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Upstream(IngestError::InvalidRange { .. })
            | SyncError::Persistence(DbError::Validation(_))
            | SyncError::Validation(_)
            | SyncError::InvalidRequest(_) => "validation_error",
            SyncError::Upstream(_) => "upstream_error",
            SyncError::Persistence(_) => "persistence_error",
        }
    }
}
