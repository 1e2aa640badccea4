use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("url has no file name: {0}")]
    MissingFileName(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("indexer '{indexer}' failed: {}", failures.join("; "))]
    IndexerFailed {
        indexer: String,
        failures: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
}

/// Failures of the embedding and chat deployments.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("docx packaging failed: {0}")]
    Docx(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
