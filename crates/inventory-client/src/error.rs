//! Inventory client errors

use thiserror::Error;

/// Errors that can occur when talking to the inventory service
#[derive(Debug, Error)]
pub enum InventoryError {
    /// HTTP request/response error (connection refused, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Inventory returned an unexpected error status
    #[error("Inventory API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid credentials
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller is not allowed to touch the resource
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid request (bad filter, bad field mask, missing mandatory fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Inventory is temporarily unable to serve the request
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A resource of a different kind came back than the one asked for
    #[error("Unexpected resource kind: expected {expected}, got {actual}")]
    UnexpectedKind {
        expected: &'static str,
        actual: &'static str,
    },
}

impl InventoryError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Map an HTTP status returned by the inventory into an error
    pub(crate) fn from_status(status: reqwest::StatusCode, context: String) -> Self {
        match status.as_u16() {
            400 | 422 => Self::InvalidRequest(context),
            401 => Self::Unauthenticated(context),
            403 => Self::PermissionDenied(context),
            404 => Self::NotFound(context),
            409 => Self::AlreadyExists(context),
            408 | 429 | 502 | 503 | 504 => Self::Unavailable(context),
            _ => Self::Api(context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        let ctx = || "GET /x".to_string();
        assert!(InventoryError::from_status(StatusCode::NOT_FOUND, ctx()).is_not_found());
        assert!(InventoryError::from_status(StatusCode::CONFLICT, ctx()).is_already_exists());
        assert!(InventoryError::from_status(StatusCode::UNAUTHORIZED, ctx()).is_unauthenticated());
        assert!(InventoryError::from_status(StatusCode::FORBIDDEN, ctx()).is_permission_denied());
        assert!(matches!(
            InventoryError::from_status(StatusCode::SERVICE_UNAVAILABLE, ctx()),
            InventoryError::Unavailable(_)
        ));
        assert!(matches!(
            InventoryError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ctx()),
            InventoryError::Api(_)
        ));
    }
}
