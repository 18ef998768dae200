//! Onboarding Manager
//!
//! Control plane that takes edge devices from "registered in the inventory" to
//! "running the requested OS":
//! - Host: credential revocation and sub-resource cleanup on deletion or invalidation
//! - Instance: device initialization, FDO ownership handshake and OS installation
//!   through Tinkerbell workflows
//! - OS: resolution of image and overlay script URLs
//!
//! Every reconciliation is driven by a kind-agnostic reconcile engine fed from
//! inventory events, a periodic reconcile-all and a Tinkerbell workflow watch.

mod artifacts;
mod backoff;
mod classifier;
mod config;
mod controller;
mod engine;
mod error;
mod handshake;
mod reconciler;
mod status;
mod watcher;
mod workflow;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Onboarding Manager");

    let config = Config::from_env()?;
    config.log();

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
