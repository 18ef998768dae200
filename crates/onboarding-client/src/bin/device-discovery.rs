//! Device Discovery agent
//!
//! Runs in the boot environment of a new edge device and onboards it:
//! - streams its identity to the onboarding manager until it is onboarded
//! - falls back to operator login + `CreateNodes` when the device is unknown
//! - leaves credentials and tokens in `/dev/shm` for later boot stages

use anyhow::{Context, Result};
use clap::Parser;
use onboarding_client::{
    CredentialFiles, DEFAULT_CA_CERT_PATH, DeviceInfo, DiscoveryConfig, OnboardingController, sysinfo,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_AUTH_SCRIPT_PATH: &str = "/etc/hook/client-auth.sh";
const HOSTS_FILE: &str = "/etc/hosts";
const IP_DETECT_ATTEMPTS: u32 = 10;
const IP_DETECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Parser)]
#[command(name = "device-discovery", about = "Onboard this device to the edge platform")]
struct Args {
    /// Onboarding manager service address
    #[arg(long, env = "OBM_SVC")]
    obm_svc: String,

    /// Onboarding stream service address
    #[arg(long, env = "OBS_SVC")]
    obs_svc: String,

    /// Onboarding manager port
    #[arg(long, env = "OBM_PORT")]
    obm_port: u16,

    /// Keycloak URL
    #[arg(long, env = "KEYCLOAK_URL")]
    keycloak_url: String,

    /// MAC address of the device (required unless --auto-detect)
    #[arg(long, env = "MAC")]
    mac: Option<String>,

    /// Serial number (auto-detected if not provided)
    #[arg(long, env = "SERIAL")]
    serial: Option<String>,

    /// System UUID (auto-detected if not provided)
    #[arg(long, env = "UUID")]
    uuid: Option<String>,

    /// IP address (auto-detected from the MAC if not provided)
    #[arg(long, env = "IP")]
    ip: Option<String>,

    /// Detect MAC, serial, UUID and IP from the running system
    #[arg(long, env = "AUTO_DETECT")]
    auto_detect: bool,

    /// Additional host mappings, `host1:ip1,host2:ip2`
    #[arg(long, env = "EXTRA_HOSTS")]
    extra_hosts: Option<String>,

    /// CA certificate for all onboarding endpoints
    #[arg(long, env = "CA_CERT", default_value = DEFAULT_CA_CERT_PATH)]
    ca_cert: PathBuf,

    /// Client authentication script for interactive onboarding
    #[arg(long, env = "AUTH_SCRIPT", default_value = DEFAULT_AUTH_SCRIPT_PATH)]
    auth_script: PathBuf,

    /// Directory receiving credentials and tokens
    #[arg(long, env = "TOKEN_DIR", default_value = onboarding_client::files::DEFAULT_TOKEN_DIR)]
    token_dir: PathBuf,

    /// Give up after `--timeout` seconds
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Timeout in seconds when --debug is set
    #[arg(long, env = "TIMEOUT", default_value_t = 300)]
    timeout: u64,
}

async fn resolve_device(args: &Args) -> Result<DeviceInfo> {
    let mac = match (&args.mac, args.auto_detect) {
        (Some(mac), _) => mac.clone(),
        (None, true) => {
            let mac = sysinfo::primary_mac().context("failed to auto-detect MAC address")?;
            info!("Auto-detected MAC address: {}", mac);
            mac
        }
        (None, false) => anyhow::bail!("--mac is required unless --auto-detect is set"),
    };

    let serial = match &args.serial {
        Some(serial) => serial.clone(),
        None => {
            let serial = sysinfo::serial_number().await.context("failed to auto-detect serial number")?;
            info!("Auto-detected serial number: {}", serial);
            serial
        }
    };

    let uuid = match &args.uuid {
        Some(uuid) => uuid.clone(),
        None => {
            let uuid = sysinfo::system_uuid().await.context("failed to auto-detect UUID")?;
            info!("Auto-detected UUID: {}", uuid);
            uuid
        }
    };

    let ip = match &args.ip {
        Some(ip) => ip.clone(),
        None => {
            info!("Waiting for IP address assignment for MAC {}...", mac);
            let ip = sysinfo::ip_for_mac_with_retry(&mac, IP_DETECT_ATTEMPTS, IP_DETECT_DELAY)
                .await
                .with_context(|| format!("failed to auto-detect IP address for MAC {mac}"))?;
            info!("Auto-detected IP address: {}", ip);
            ip.to_string()
        }
    };

    Ok(DeviceInfo { mac, uuid, serial, ip })
}

async fn read_auth_script(path: &Path) -> Vec<u8> {
    match tokio::fs::read(path).await {
        Ok(script) => script,
        Err(e) => {
            // Only needed for the interactive fallback
            warn!("Cannot read client-auth script {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let device = resolve_device(&args).await?;

    if let Some(extra_hosts) = &args.extra_hosts {
        sysinfo::append_extra_hosts(Path::new(HOSTS_FILE), extra_hosts)
            .await
            .context("failed to add extra hosts")?;
    }

    info!("Device Discovery Configuration:");
    info!("  Onboarding Manager: {}:{}", args.obm_svc, args.obm_port);
    info!("  Onboarding Stream: {}:{}", args.obs_svc, args.obm_port);
    info!("  Keycloak URL: {}", args.keycloak_url);
    info!("  MAC Address: {}", device.mac);
    info!("  Serial Number: {}", device.serial);
    info!("  UUID: {}", device.uuid);
    info!("  IP Address: {}", device.ip);
    info!("  Debug Mode: {}", args.debug);
    if args.debug {
        info!("  Timeout: {}s", args.timeout);
    }

    let config = DiscoveryConfig {
        obm_svc: args.obm_svc.clone(),
        obs_svc: args.obs_svc.clone(),
        obm_port: args.obm_port,
        keycloak_url: args.keycloak_url.clone(),
        device,
        ca_cert_path: args.ca_cert.clone(),
        auth_script: read_auth_script(&args.auth_script).await,
    };

    let cancel = CancellationToken::new();
    if args.debug {
        let timeout = Duration::from_secs(args.timeout);
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("Onboarding timed out after {:?}", timeout);
            token.cancel();
        });
    }
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling onboarding");
            token.cancel();
        }
    });

    OnboardingController::new(config, CredentialFiles::new(&args.token_dir))
        .execute(&cancel)
        .await
        .context("device discovery failed")?;

    info!("Device discovery completed successfully");
    Ok(())
}
