//! FdoClient trait for mocking

use crate::error::FdoError;

/// Trait for FDO owner/manufacturer operations
#[async_trait::async_trait]
pub trait FdoClientTrait: Send + Sync {
    /// Stage a file on the owner service under `filename`
    async fn send_file_to_owner(&self, filename: &str, content: &str) -> Result<(), FdoError>;

    /// Register a service-info (SVI) instruction set with the owner
    async fn execute_svi(&self, payload: &str) -> Result<(), FdoError>;

    /// TO2 completion time for the device with FDO GUID `guid`, `None` while TO2
    /// has not completed
    async fn get_to2_state(&self, guid: &str) -> Result<Option<String>, FdoError>;

    /// Extend the manufacturer voucher of the device with `serial` to the owner
    /// and register it; returns the FDO GUID
    async fn do_voucher_extension(&self, serial: &str) -> Result<String, FdoError>;
}
