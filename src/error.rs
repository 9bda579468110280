//! Error types for the reminder assistant.

/// Top-level error type for the scheduling and task subsystems.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    /// Configuration error (fatal at startup).
    #[error("config error: {0}")]
    Config(String),

    /// Task or user storage error.
    #[error("store error: {0}")]
    Store(String),

    /// Send-ledger read or write error.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Scheduler error (lease, job bookkeeping).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// User-supplied timezone is not a known IANA zone.
    #[error("unknown timezone `{0}`")]
    InvalidTimezone(String),

    /// Task draft failed validation.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Chat command could not be parsed.
    #[error("invalid command: {0}")]
    Command(String),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NudgeError>;
