//! Integration tests for the onboarding client
//!
//! These tests require a running onboarding manager reachable over TLS.
//! Set OBS_SVC, OBM_PORT and CA_CERT environment variables to run.

use onboarding_client::noninteractive::NonInteractiveClient;
use onboarding_client::{CredentialFiles, DeviceInfo};
use tokio_util::sync::CancellationToken;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::test]
#[ignore] // Requires a running onboarding manager
async fn test_unknown_device_requests_fallback() {
    let ca_pem = std::fs::read(env_or("CA_CERT", onboarding_client::DEFAULT_CA_CERT_PATH))
        .expect("Failed to read CA certificate");
    let port: u16 = env_or("OBM_PORT", "443").parse().expect("OBM_PORT must be a port");
    let client = NonInteractiveClient::new(
        env_or("OBS_SVC", "onboarding-stream.localhost"),
        port,
        DeviceInfo {
            mac: "02:00:00:00:00:01".to_string(),
            uuid: uuid_like(),
            serial: "IT-UNKNOWN".to_string(),
            ip: "192.0.2.10".to_string(),
        },
    );
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let result = client
        .onboard(&ca_pem, &CredentialFiles::new(dir.path()), &CancellationToken::new())
        .await;

    println!("Stream result: {:?}", result);
    assert!(result.should_fallback);
}

fn uuid_like() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("00000000-0000-0000-0000-{nanos:012}")
}
