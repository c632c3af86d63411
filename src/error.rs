use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Failures of a single company build.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("company not found: {0}")]
    NotFound(String),

    /// Expected markup node absent or in the wrong shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Expansion command string that does not look like `func(parent[, section][, this])`.
    #[error("malformed expansion trigger: {0:?}")]
    MalformedTrigger(String),

    #[error("malformed expansion payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },

    #[error("duplicate {table} row for {label:?}")]
    PersistenceConflict { table: String, label: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Errors that only cost one expanded row group, not the whole section.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedTrigger(_) | Self::MalformedPayload { .. })
    }
}
