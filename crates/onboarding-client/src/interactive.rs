//! Interactive (manual) onboarding
//!
//! Used when the onboarding manager does not know the device yet. An operator
//! logs in through the client-auth script on the console, which leaves an
//! access token behind; the device then registers itself with `CreateNodes`.

use crate::DeviceInfo;
use crate::error::OnboardingError;
use crate::files::CredentialFiles;
use crate::transport::NodeRegistrar;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use rand::Rng;
use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Total `CreateNodes` attempts before giving up
pub const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_JITTER_MS: u64 = 1000;

/// Run the client-auth script in its own process group.
///
/// The script talks to the operator on the console, so stdio is inherited. On
/// cancellation the whole process group is killed.
pub async fn run_auth_script(script: &[u8], cancel: &CancellationToken) -> Result<(), OnboardingError> {
    let mut file = tempfile::Builder::new()
        .prefix("client-auth")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(script)?;
    file.flush()?;
    std::fs::set_permissions(file.path(), Permissions::from_mode(0o700))?;

    let mut child = Command::new("/bin/sh")
        .arg(file.path())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()?;
    let pid = child.id();

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if !status.success() {
                return Err(OnboardingError::Script(format!("exited with {status}")));
            }
            info!("client-auth script executed successfully");
            Ok(())
        }
        () = cancel.cancelled() => {
            warn!("client-auth script cancelled, killing process group");
            if let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
                if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                    warn!("Failed to kill client-auth process group {}: {}", pid, e);
                }
            }
            if let Err(e) = child.wait().await {
                warn!("Failed to reap client-auth script: {}", e);
            }
            Err(OnboardingError::Cancelled)
        }
    }
}

/// One `CreateNodes` call; the returned project ID is persisted
pub async fn onboard_once<R: NodeRegistrar + ?Sized>(
    registrar: &R,
    device: &DeviceInfo,
    files: &CredentialFiles,
) -> Result<String, OnboardingError> {
    let response = registrar.create_nodes(device.create_nodes_request()).await?;
    if response.project_id.is_empty() {
        return Err(OnboardingError::protocol("received empty Project ID"));
    }
    files
        .save_project_id(&response.project_id)
        .map_err(|e| OnboardingError::protocol(format!("failed to save Project ID to file: {e}")))?;
    Ok(response.project_id)
}

/// [`onboard_once`] with a fixed delay plus jitter between attempts
pub async fn onboard_with_retry<R: NodeRegistrar + ?Sized>(
    registrar: &R,
    device: &DeviceInfo,
    files: &CredentialFiles,
    cancel: &CancellationToken,
) -> Result<String, OnboardingError> {
    for attempt in 1..=MAX_ATTEMPTS {
        match onboard_once(registrar, device, files).await {
            Ok(project_id) => return Ok(project_id),
            Err(e) => {
                warn!(
                    "There was an error in updating the edge-node details with the onboarding manager: {}",
                    e
                );
            }
        }

        if attempt < MAX_ATTEMPTS {
            info!("Retrying update... attempt {} of {}", attempt + 1, MAX_ATTEMPTS);
            let delay = RETRY_DELAY + Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS));
            tokio::select! {
                () = cancel.cancelled() => return Err(OnboardingError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(OnboardingError::MaxRetriesReached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{CreateNodesRequest, CreateNodesResponse};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers with the queued project IDs, failing once they run out
    struct CountingRegistrar {
        calls: AtomicU32,
        project_ids: Mutex<Vec<String>>,
        requests: Mutex<Vec<CreateNodesRequest>>,
    }

    impl CountingRegistrar {
        fn new(project_ids: &[&str]) -> Self {
            Self {
                calls: AtomicU32::new(0),
                project_ids: Mutex::new(project_ids.iter().rev().map(|s| (*s).to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl NodeRegistrar for CountingRegistrar {
        async fn create_nodes(&self, request: CreateNodesRequest) -> Result<CreateNodesResponse, OnboardingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            match self.project_ids.lock().unwrap().pop() {
                Some(project_id) => Ok(CreateNodesResponse { project_id }),
                None => Err(OnboardingError::Status(tonic::Status::unavailable("onboarding manager down"))),
            }
        }
    }

    fn device() -> DeviceInfo {
        DeviceInfo {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            uuid: "4c4c4544-0035".to_string(),
            serial: "SN123".to_string(),
            ip: "10.0.0.5".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = CountingRegistrar::new(&[]);

        let result = onboard_with_retry(
            &registrar,
            &device(),
            &CredentialFiles::new(dir.path()),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(OnboardingError::MaxRetriesReached)));
        assert_eq!(registrar.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_project_id_counts_as_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = CountingRegistrar::new(&["", "project-a"]);

        let project = onboard_with_retry(
            &registrar,
            &device(),
            &CredentialFiles::new(dir.path()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(project, "project-a");
        assert_eq!(registrar.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("project_id")).unwrap(),
            "project-a"
        );
    }

    #[tokio::test]
    async fn test_request_carries_device_identity() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = CountingRegistrar::new(&["project-a"]);

        onboard_once(&registrar, &device(), &CredentialFiles::new(dir.path()))
            .await
            .unwrap();

        let requests = registrar.requests.lock().unwrap();
        let hw = &requests[0].payload[0].hwdata[0];
        assert_eq!(hw.mac_id, "aa:bb:cc:dd:ee:ff");
        assert_eq!(hw.sut_ip, "10.0.0.5");
        assert_eq!(hw.serialnum, "SN123");
    }

    #[tokio::test]
    async fn test_auth_script_success_and_failure() {
        let cancel = CancellationToken::new();
        run_auth_script(b"exit 0\n", &cancel).await.unwrap();

        let err = run_auth_script(b"exit 3\n", &cancel).await.unwrap_err();
        assert!(matches!(err, OnboardingError::Script(_)));
    }

    #[tokio::test]
    async fn test_auth_script_killed_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run_auth_script(b"sleep 30 &\nsleep 30\n", &cancel).await.unwrap_err();

        assert!(matches!(err, OnboardingError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
