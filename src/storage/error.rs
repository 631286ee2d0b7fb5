use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by record store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Structured backend did not become ready in time or could not be opened.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Another connection holds a lock the operation needs.
    #[error("Backend blocked by another connection: {0}")]
    Blocked(String),

    #[error("Schema version {found} is newer than supported version {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored record {key} is malformed: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Record store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::Blocked(err.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

impl StoreError {
    /// Whether the structured backend should be abandoned for the fallback.
    pub fn warrants_fallback(&self) -> bool {
        matches!(
            self,
            StoreError::BackendUnavailable(_)
                | StoreError::Blocked(_)
                | StoreError::UnsupportedSchemaVersion { .. }
                | StoreError::Sqlite(_)
                | StoreError::Io(_)
        )
    }
}
