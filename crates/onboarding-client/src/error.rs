//! Error types for the device onboarding client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnboardingError {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC call failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The onboarding service answered, but not with something usable
    #[error("{0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("client-auth script failed: {0}")]
    Script(String),

    #[error("max retries reached")]
    MaxRetriesReached,

    #[error("onboarding cancelled")]
    Cancelled,
}

impl OnboardingError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
