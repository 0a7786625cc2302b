use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkRotError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("malformed HTML: {0}")]
    MalformedHtml(String),

    #[error("visited-set error: {0}")]
    VisitedSet(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
