use thiserror::Error;

/// Application error kinds.
///
/// The scheduler's retry/degrade policy is keyed off these variants:
/// transient fetch failures are retried, permanent ones drop the exchange
/// for the symbol, store corruption halts scheduling.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("transient fetch failure: {0}")]
    TransientFetch(String),

    #[error("permanent fetch failure: {0}")]
    PermanentFetch(String),

    #[error("store I/O: {0}")]
    StoreIo(String),

    #[error("store corruption: {0}")]
    StoreCorruption(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl ScanError {
    /// Whether this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::TransientFetch(_))
    }

    /// Whether this error must halt the scheduler entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::StoreCorruption(_) | ScanError::Config(_))
    }

    /// Classify an HTTP status code into a fetch error.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        if status.as_u16() == 429 || status.is_server_error() {
            ScanError::TransientFetch(format!("{}: HTTP {}", context, status))
        } else {
            ScanError::PermanentFetch(format!("{}: HTTP {}", context, status))
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return ScanError::from_status(status, "request");
        }
        if e.is_timeout() || e.is_connect() {
            ScanError::TransientFetch(e.to_string())
        } else if e.is_decode() {
            ScanError::PermanentFetch(format!("malformed response: {}", e))
        } else {
            ScanError::TransientFetch(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::DatabaseCorrupt
                    || err.code == rusqlite::ErrorCode::NotADatabase =>
            {
                ScanError::StoreCorruption(e.to_string())
            }
            _ => ScanError::StoreIo(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::Internal(format!("payload encoding: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
