//! Error types for Chimera

use thiserror::Error;

use crate::types::MemoryId;

/// Result type alias for Chimera operations
pub type Result<T> = std::result::Result<T, ChimeraError>;

/// Main error type for Chimera
#[derive(Error, Debug)]
pub enum ChimeraError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Memory not found: {0}")]
    NotFound(MemoryId),

    #[error("Search index has not been fit; run a rebuild first")]
    IndexUnfit,

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChimeraError {
    /// Whether the error originated in the record store
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            ChimeraError::StoreUnavailable(_)
                | ChimeraError::Database(_)
                | ChimeraError::Serialization(_)
                | ChimeraError::Io(_)
        )
    }

    /// Get error code for the calling layer
    pub fn code(&self) -> i64 {
        match self {
            ChimeraError::NotFound(_) => -32001,
            ChimeraError::Validation(_) => -32602,
            ChimeraError::IndexUnfit => -32010,
            ChimeraError::StoreUnavailable(_) => -32011,
            ChimeraError::Config(_) => -32012,
            _ => -32000,
        }
    }
}
