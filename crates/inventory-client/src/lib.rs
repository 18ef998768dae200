//! Inventory (ResourceStore) client
//!
//! Typed CRUD, field-masked updates and change subscriptions over the edge
//! inventory: hosts, instances, operating systems and host sub-resources
//! (NICs, IP addresses, storage, USB and GPU devices) plus providers.
//!
//! # Example
//!
//! ```no_run
//! use inventory_client::{FieldMask, HostState, InventoryClient, InventoryClientTrait, fields};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InventoryClient::new(
//!     "http://inventory:8080".to_string(),
//!     None,
//!     inventory_client::client::DEFAULT_TIMEOUT,
//! )?;
//!
//! let mut host = client.get_host("tenant-a", "host-1a2b3c4d").await?;
//! host.current_state = HostState::Onboarded;
//! client.update_host(&host, &FieldMask::new([fields::CURRENT_STATE])).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod field_mask;
pub mod models;
#[path = "trait.rs"]
pub mod inventory_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::InventoryClient;
pub use common::HttpClient;
pub use common::filter::Filter;
pub use error::InventoryError;
pub use field_mask::FieldMask;
pub use models::*;
pub use inventory_trait::InventoryClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockInventoryClient, MockOp};
