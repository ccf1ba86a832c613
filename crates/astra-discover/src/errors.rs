use astra_core::DiscoveryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("invalid discovery config: {0}")]
    InvalidConfig(String),

    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("location service rejected registration: {0}")]
    Rejected(String),
}

impl From<DiscoverError> for DiscoveryError {
    fn from(e: DiscoverError) -> Self {
        match e {
            DiscoverError::Rejected(reason) => DiscoveryError::Rejected(reason),
            other => DiscoveryError::Unavailable(other.to_string()),
        }
    }
}
