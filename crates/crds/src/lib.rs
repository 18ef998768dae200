//! Tinkerbell CRD Definitions
//!
//! Kubernetes Custom Resource Definitions the onboarding manager reads and writes
//! to drive device provisioning through Tinkerbell.

pub mod hardware;
pub mod template;
pub mod workflow;

pub use hardware::*;
pub use template::*;
pub use workflow::*;
