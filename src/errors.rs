use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),
}

impl DbError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedQuery(msg.into())
    }

    /// True for the two failure kinds a caller is expected to recover from.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedQuery(_) | Self::NoSuchDocument(_))
    }
}
