//! Per-kind reconcilers
//!
//! Each reconciler loads one inventory resource, compares its desired and
//! current state and drives the side effects needed to converge them. The
//! returned [`Directive`] tells the engine whether to stop, retry or give up.
//!
//! - `host`: deletion cascade and invalidation of hosts
//! - `instance`: OS provisioning, deletion and invalidation of instances
//! - `os`: resolution of OS artifact URLs

pub mod host;
pub mod instance;
pub mod os;


pub use host::HostReconciler;
pub use instance::InstanceReconciler;
pub use os::OsReconciler;

use crate::engine::Directive;

/// Collapse an early-exit directive and the final one
pub(crate) fn settle(result: Result<Directive, Directive>) -> Directive {
    result.unwrap_or_else(|directive| directive)
}
