//! Error classification
//!
//! Turns a reconcile-time failure into a [`Directive`]. `None` means the call
//! succeeded and the reconciler should carry on.

use crate::engine::Directive;
use crate::error::ProvisioningError;
use inventory_client::InventoryError;

/// Policy for inventory (ResourceStore) calls
///
/// Errors no retry can fix are acknowledged; everything else is retried with
/// backoff.
pub fn handle_inventory_error<T>(result: Result<T, InventoryError>) -> Result<T, Directive> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if is_terminal_inventory_error(&e) => {
            tracing::debug!("Acknowledging inventory error: {}", e);
            Err(Directive::Ack)
        }
        Err(e) => Err(Directive::retry(e)),
    }
}

fn is_terminal_inventory_error(e: &InventoryError) -> bool {
    e.is_not_found() || e.is_already_exists() || e.is_unauthenticated() || e.is_permission_denied()
}

/// Policy for provisioning steps
pub fn handle_provisioning_error(result: Result<(), ProvisioningError>) -> Option<Directive> {
    let err = result.err()?;
    if err.is_in_progress() {
        return Some(Directive::retry(err));
    }
    if err.is_aborted() {
        return Some(Directive::fail(err));
    }
    if err.is_classified() {
        return Some(Directive::retry(err));
    }
    tracing::warn!("Acknowledging unrecoverable provisioning input error: {}", err);
    Some(Directive::Ack)
}
