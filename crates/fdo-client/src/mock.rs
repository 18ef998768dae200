//! Mock FdoClient for unit testing

use crate::error::FdoError;
use crate::fdo_trait::FdoClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockFdoClient {
    /// Files staged on the owner, by name
    pub(crate) files: Arc<Mutex<HashMap<String, String>>>,
    pub(crate) svi_payloads: Arc<Mutex<Vec<String>>>,
    /// TO2 completion per FDO GUID
    pub(crate) to2_completed: Arc<Mutex<HashMap<String, String>>>,
    pub(crate) voucher_calls: Arc<Mutex<Vec<String>>>,
    pub(crate) fail_voucher: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockFdoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFdoClient").finish_non_exhaustive()
    }
}

impl MockFdoClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// FDO GUID the mock hands out for a serial number
    pub fn guid_for(serial: &str) -> String {
        format!("fdo-{serial}")
    }

    /// Mark TO2 complete for the device with `serial`
    pub fn complete_to2(&self, serial: &str) {
        self.to2_completed
            .lock()
            .unwrap()
            .insert(Self::guid_for(serial), "2024-01-01 00:00:00".to_string());
    }

    pub fn set_fail_voucher(&self, fail: bool) {
        *self.fail_voucher.lock().unwrap() = fail;
    }

    pub fn file(&self, name: &str) -> Option<String> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn svi_payloads(&self) -> Vec<String> {
        self.svi_payloads.lock().unwrap().clone()
    }

    pub fn voucher_calls(&self) -> Vec<String> {
        self.voucher_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FdoClientTrait for MockFdoClient {
    async fn send_file_to_owner(&self, filename: &str, content: &str) -> Result<(), FdoError> {
        self.files
            .lock()
            .unwrap()
            .insert(filename.to_string(), content.to_string());
        Ok(())
    }

    async fn execute_svi(&self, payload: &str) -> Result<(), FdoError> {
        self.svi_payloads.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn get_to2_state(&self, guid: &str) -> Result<Option<String>, FdoError> {
        Ok(self.to2_completed.lock().unwrap().get(guid).cloned())
    }

    async fn do_voucher_extension(&self, serial: &str) -> Result<String, FdoError> {
        self.voucher_calls.lock().unwrap().push(serial.to_string());
        if *self.fail_voucher.lock().unwrap() {
            return Err(FdoError::Api {
                method: "POST".to_string(),
                url: format!("mock://mfg/vouchers/{serial}"),
                status: 500,
            });
        }
        Ok(Self::guid_for(serial))
    }
}
