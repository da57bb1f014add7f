//! Error types for the store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown column '{column}' for table {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("store document corrupt: {0}")]
    Corrupt(String),
}
