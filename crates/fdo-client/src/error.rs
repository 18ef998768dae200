//! FDO client errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FdoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Owner or manufacturer service answered with a non-2xx status
    #[error("Failed to perform {method} API call to {url} with status code {status}")]
    Api {
        method: String,
        url: String,
        status: u16,
    },

    /// A call that must return data returned nothing
    #[error("Empty response: {0}")]
    EmptyBody(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
