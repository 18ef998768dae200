//! FDO owner/manufacturer REST client
//!
//! Both services authenticate the `apiUser` account with an empty password and
//! exchange `text/plain` bodies.

use crate::error::FdoError;
use crate::fdo_trait::FdoClientTrait;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const API_USER: &str = "apiUser";
const CONTENT_TYPE_TEXT_PLAIN: &str = "text/plain";
const CERTIFICATE_ATTESTATION_TYPE: &str = "SECP256R1";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct To2State {
    #[serde(default)]
    to2_completed_on: String,
    #[serde(default)]
    #[allow(dead_code, reason = "reported by the owner, not consumed")]
    to0_expiry: String,
}

/// FDO owner/manufacturer client
#[derive(Debug, Clone)]
pub struct FdoClient {
    client: Client,
    owner_url: String,
    mfg_url: String,
    rv_enabled: bool,
}

impl FdoClient {
    /// Create a new FDO client
    ///
    /// # Arguments
    /// * `owner_url` - owner service API base (e.g., "http://fdo-owner:8042/api/v1")
    /// * `mfg_url` - manufacturer service API base
    /// * `rv_enabled` - start TO0 with the rendezvous server after voucher upload
    pub fn new(owner_url: String, mfg_url: String, rv_enabled: bool) -> Result<Self, FdoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            owner_url: owner_url.trim_end_matches('/').to_string(),
            mfg_url: mfg_url.trim_end_matches('/').to_string(),
            rv_enabled,
        })
    }

    async fn call(&self, method: Method, url: String, body: Option<Vec<u8>>) -> Result<Vec<u8>, FdoError> {
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .basic_auth(API_USER, Some(""));
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_TEXT_PLAIN)
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FdoError::Api {
                method: method.to_string(),
                url,
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_owner_certificate(&self) -> Result<Vec<u8>, FdoError> {
        let url = format!("{}/certificate?alias={}", self.owner_url, CERTIFICATE_ATTESTATION_TYPE);
        let cert = self.call(Method::GET, url, None).await?;
        if cert.is_empty() {
            return Err(FdoError::EmptyBody("owner certificate".to_string()));
        }
        debug!("Got owner certificate");
        Ok(cert)
    }

    async fn get_voucher_extension_from_mfg(&self, owner_cert: Vec<u8>, serial: &str) -> Result<Vec<u8>, FdoError> {
        let url = format!("{}/mfg/vouchers/{}", self.mfg_url, urlencoding::encode(serial));
        let voucher = self.call(Method::POST, url, Some(owner_cert)).await?;
        if voucher.is_empty() {
            return Err(FdoError::EmptyBody(format!("voucher extension for {serial}")));
        }
        debug!("Got voucher extension for serial number {}", serial);
        Ok(voucher)
    }

    async fn upload_voucher_to_owner(&self, voucher: Vec<u8>) -> Result<String, FdoError> {
        let url = format!("{}/owner/vouchers", self.owner_url);
        let guid = self.call(Method::POST, url, Some(voucher)).await?;
        let guid = String::from_utf8_lossy(&guid).trim().to_string();
        if guid.is_empty() {
            return Err(FdoError::EmptyBody("FDO GUID".to_string()));
        }
        debug!("Uploaded voucher extension to owner, got FDO GUID {}", guid);
        Ok(guid)
    }

    async fn start_to0(&self, guid: &str) -> Result<(), FdoError> {
        let url = format!("{}/to0/{}", self.owner_url, guid);
        debug!("Starting TO0 process for FDO GUID {}", guid);
        self.call(Method::GET, url, None).await?;
        Ok(())
    }
}

/// Parse an owner state response; empty body or empty completion time means TO2
/// is still running
fn parse_to2_state(body: &[u8]) -> Result<Option<String>, FdoError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let state: To2State = serde_json::from_slice(body)?;
    if state.to2_completed_on.is_empty() {
        return Ok(None);
    }
    Ok(Some(state.to2_completed_on))
}

#[async_trait::async_trait]
impl FdoClientTrait for FdoClient {
    async fn send_file_to_owner(&self, filename: &str, content: &str) -> Result<(), FdoError> {
        let url = format!(
            "{}/owner/resource?filename={}",
            self.owner_url,
            urlencoding::encode(filename)
        );
        debug!("Sending file {} to FDO owner", filename);
        self.call(Method::POST, url, Some(content.as_bytes().to_vec())).await?;
        Ok(())
    }

    async fn execute_svi(&self, payload: &str) -> Result<(), FdoError> {
        let url = format!("{}/owner/svi", self.owner_url);
        self.call(Method::POST, url, Some(payload.as_bytes().to_vec())).await?;
        debug!("Owner SVI API executed successfully");
        Ok(())
    }

    async fn get_to2_state(&self, guid: &str) -> Result<Option<String>, FdoError> {
        let url = format!("{}/owner/state/{}", self.owner_url, guid);
        let body = self.call(Method::GET, url, None).await?;
        parse_to2_state(&body)
    }

    async fn do_voucher_extension(&self, serial: &str) -> Result<String, FdoError> {
        debug!("Performing voucher extension for serial number {}", serial);

        let owner_cert = self.get_owner_certificate().await?;
        let voucher = self.get_voucher_extension_from_mfg(owner_cert, serial).await?;
        let guid = self.upload_voucher_to_owner(voucher).await?;

        if self.rv_enabled {
            self.start_to0(&guid).await?;
        }
        Ok(guid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to2_state_parsing() {
        assert_eq!(parse_to2_state(b"").unwrap(), None);
        assert_eq!(parse_to2_state(b"  \n").unwrap(), None);
        assert_eq!(parse_to2_state(br#"{"to2CompletedOn": ""}"#).unwrap(), None);
        assert_eq!(
            parse_to2_state(br#"{"to2CompletedOn": "2024-05-01 10:00:00", "to0Expiry": ""}"#).unwrap(),
            Some("2024-05-01 10:00:00".to_string())
        );
        assert!(parse_to2_state(b"not json").is_err());
    }
}
