//! Error type shared by the store, the remote functions client and config.
//!
//! Advisory components (duplicate detection, notification matching, rate
//! limiting) never surface these to their callers; they log and degrade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// SQLite open, migration or query failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Transport-level failure talking to the remote functions endpoint.
    #[error("{0}")]
    Http(String),

    /// The remote endpoint answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or inconsistent configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The local chat limiter refused the send.
    #[error("chat send limit reached, retry in {retry_in_secs}s")]
    SendLimited { retry_in_secs: u64 },

    /// The connection mutex was poisoned by a panicking holder.
    #[error("database lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// True when the remote side asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Status { status: 429, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
