//! Non-interactive (streaming) onboarding
//!
//! The device keeps re-sending its identity on the registration stream until
//! the onboarding manager reports it onboarded, backing off while it sits in
//! the registered state. A NotFound status means the manager does not know the
//! device at all, which is the only case where the interactive path is tried.

use crate::DeviceInfo;
use crate::error::OnboardingError;
use crate::files::CredentialFiles;
use crate::proto::{NodeState, OnboardNodeStreamRequest, OnboardNodeStreamResponse};
use crate::transport::{GrpcRegistrationStream, RegistrationStream, connect};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::Code;
use tracing::{debug, info};

/// Outcome of one streaming onboarding attempt
#[derive(Debug, Default)]
pub struct StreamResult {
    pub client_id: String,
    pub client_secret: String,
    pub project_id: String,
    /// The device is unknown to the manager; try the interactive path
    pub should_fallback: bool,
    pub error: Option<OnboardingError>,
}

impl StreamResult {
    fn failed(error: OnboardingError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    fn fallback(message: String) -> Self {
        Self {
            should_fallback: true,
            error: Some(OnboardingError::Protocol(message)),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Wait between polls while the device is registered but not onboarded.
///
/// Doubles from 2s and starts over at 2s once it would exceed 32s.
#[derive(Debug, Clone)]
pub struct RegistrationBackoff {
    current: Duration,
}

impl RegistrationBackoff {
    pub const BASE: Duration = Duration::from_secs(2);
    pub const MAX: Duration = Duration::from_secs(32);
    /// Upper bound of the random jitter added to each wait
    pub const MAX_JITTER_MS: u64 = 1000;

    pub fn new() -> Self {
        Self { current: Self::BASE }
    }

    /// Delay to apply now, without jitter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current *= 2;
        if self.current > Self::MAX {
            self.current = Self::BASE;
        }
        delay
    }

    fn jitter() -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(0..Self::MAX_JITTER_MS))
    }
}

impl Default for RegistrationBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive the registration state machine over `stream` until it settles
pub async fn run_stream<S: RegistrationStream + ?Sized>(
    stream: &mut S,
    request: &OnboardNodeStreamRequest,
    files: &CredentialFiles,
    cancel: &CancellationToken,
) -> StreamResult {
    let mut backoff = RegistrationBackoff::new();
    loop {
        if let Err(e) = stream.send(request.clone()).await {
            return StreamResult::failed(OnboardingError::protocol(format!(
                "could not send data to server: {e}"
            )));
        }

        let response = match stream.recv().await {
            Ok(Some(response)) => response,
            Ok(None) => return StreamResult::failed(OnboardingError::protocol("stream closed by server")),
            Err(e) => {
                return StreamResult::failed(OnboardingError::protocol(format!(
                    "error receiving response from server: {e}"
                )));
            }
        };

        let status = response.status.clone().unwrap_or_default();
        match Code::from_i32(status.code) {
            Code::Ok => match NodeState::try_from(response.node_state) {
                Ok(NodeState::Registered) => {
                    info!("Edge node registered. Waiting for the edge node to become ready for onboarding...");
                    let delay = backoff.next_delay() + RegistrationBackoff::jitter();
                    debug!("Polling registration again in {:?}", delay);
                    tokio::select! {
                        () = cancel.cancelled() => return StreamResult::failed(OnboardingError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Ok(NodeState::Onboarded) => return onboarded(response, files),
                Ok(NodeState::Unspecified) => {
                    return StreamResult::failed(OnboardingError::protocol(
                        "edge node state is unspecified or unknown",
                    ));
                }
                Err(_) => {
                    return StreamResult::failed(OnboardingError::protocol(format!(
                        "unknown node state: {}",
                        response.node_state
                    )));
                }
            },
            Code::NotFound => return StreamResult::fallback(status.message),
            _ => return StreamResult::failed(OnboardingError::Protocol(status.message)),
        }
    }
}

fn onboarded(response: OnboardNodeStreamResponse, files: &CredentialFiles) -> StreamResult {
    if response.project_id.is_empty() {
        return StreamResult::failed(OnboardingError::protocol("received empty Project ID"));
    }
    if let Err(e) = files.save_project_id(&response.project_id) {
        return StreamResult::failed(OnboardingError::protocol(format!(
            "failed to save Project ID to file: {e}"
        )));
    }
    if response.client_id.is_empty() || response.client_secret.is_empty() {
        return StreamResult::failed(OnboardingError::protocol("received empty clientID or clientSecret"));
    }

    StreamResult {
        client_id: response.client_id,
        client_secret: response.client_secret,
        project_id: response.project_id,
        should_fallback: false,
        error: None,
    }
}

/// Streaming client for the non-interactive onboarding service
#[derive(Debug, Clone)]
pub struct NonInteractiveClient {
    host: String,
    port: u16,
    device: DeviceInfo,
}

impl NonInteractiveClient {
    pub fn new(host: String, port: u16, device: DeviceInfo) -> Self {
        Self { host, port, device }
    }

    /// Connect and run the registration stream to completion
    pub async fn onboard(&self, ca_pem: &[u8], files: &CredentialFiles, cancel: &CancellationToken) -> StreamResult {
        let channel = match connect(&self.host, self.port, ca_pem).await {
            Ok(channel) => channel,
            Err(e) => return StreamResult::failed(OnboardingError::protocol(format!("failed to connect: {e}"))),
        };
        let mut stream = GrpcRegistrationStream::new(channel);
        run_stream(&mut stream, &self.device.stream_request(), files, cancel).await
    }
}
