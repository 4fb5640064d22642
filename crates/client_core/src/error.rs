use shared::error::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url {url}: {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("client task is no longer running")]
    Closed,
}

impl ClientError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidServerUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
