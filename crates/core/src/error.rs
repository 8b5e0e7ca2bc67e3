use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid programme record {id}: {field} {reason}")]
    InvalidRecord {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store not available yet: {0}")]
    NotReady(String),

    #[error("chunk not found: {id}")]
    NotFound { id: String },

    #[error("{operation} failed: {source}")]
    Stage {
        operation: String,
        #[source]
        source: Box<SearchError>,
    },
}

impl SearchError {
    pub fn is_not_found(&self) -> bool {
        match self {
            SearchError::NotFound { .. } => true,
            SearchError::Stage { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
