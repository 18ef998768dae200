//! Controller-specific error types.
//!
//! `ControllerError` covers startup and wiring; `ProvisioningError` is what the
//! reconcilers and the workflow orchestrator return while driving a device.

use auth_service::AuthError;
use fdo_client::FdoError;
use inventory_client::InventoryError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur while starting or running the onboarding manager.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Inventory API error
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Credential service error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// FDO owner/manufacturer client error
    #[error("FDO error: {0}")]
    Fdo(#[from] FdoError),

    /// Artifact service client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Outcome of a provisioning step that did not complete.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Work was started or is still running; check again later
    #[error("operation in progress: {0}")]
    InProgress(String),

    /// Unrecoverable failure, the instance goes to ERROR
    #[error("provisioning aborted: {0}")]
    Aborted(String),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    #[error("FDO error: {0}")]
    Fdo(#[from] FdoError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Artifact service lookup failed
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Workflow or template could not be built or read back
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Input that no retry will fix (missing OS, bad repo URL, ...)
    #[error("{0}")]
    Malformed(String),
}

impl ProvisioningError {
    pub fn in_progress(msg: impl Into<String>) -> Self {
        Self::InProgress(msg.into())
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress(_))
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Whether the error carries a recognised failure class
    ///
    /// Unclassified errors come from local input problems and are not retried.
    #[must_use]
    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}
