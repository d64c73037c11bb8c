use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} returned by {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("failed to parse page {url}: {message}")]
    Page { url: String, message: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("batch has no result for inscription {uid}")]
    MissingResult { uid: String },

    #[error("results are not in order, last id: {last}, current id: {current}")]
    OutOfOrder { last: i64, current: i64 },

    #[error("collection {tick} holds an unusable public key: {message}")]
    CorruptPublicKey { tick: String, message: String },

    #[error("batch aborted after {applied} applied records: {source}")]
    BatchAborted {
        applied: usize,
        #[source]
        source: Box<IndexerError>,
    },

    #[error("indexer is stopping")]
    Stopped,
}

impl IndexerError {
    pub fn page(url: impl Into<String>, message: impl Into<String>) -> Self {
        IndexerError::Page {
            url: url.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
