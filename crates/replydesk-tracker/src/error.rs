use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Follow-up not found: {0}")]
    NotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The console only runs statements SQLite classifies as read-only.
    #[error("Only read-only statements are allowed in the SQL console: {0}")]
    ReadOnly(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
