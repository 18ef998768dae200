//! Onboarding manager configuration
//!
//! Read once from environment variables at startup and passed by value (or
//! behind an `Arc`) to every component. Nothing reads the environment after
//! [`Config::from_env`] returns.

use crate::error::ControllerError;
use std::env;
use std::time::Duration;
use tracing::info;

const DEFAULT_INVENTORY_URL: &str = "http://inventory.orch-infra:8080";
const DEFAULT_NAMESPACE: &str = "orch-infra";
const DEFAULT_KEYCLOAK_URL: &str = "http://platform-keycloak.orch-platform:8080";
const DEFAULT_FDO_OWNER_URL: &str = "http://fdo-owner-service.orch-infra:58042";
const DEFAULT_FDO_MFG_URL: &str = "http://fdo-mfg-service.orch-infra:58039";
const DEFAULT_ARTIFACT_SERVICE_URL: &str = "http://dkam.orch-infra:5581";
const DEFAULT_IMG_TYPE: &str = "prod_bkc";
const DEFAULT_TINKER_ACTIONS_REGISTRY: &str = "localhost:7443/one-intel-edge/edge-node/tinker-actions";
const DEFAULT_TINKER_ACTION_VERSION: &str = "v1.0.0";
const DEFAULT_DISK_DEVICE: &str = "/dev/sda";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub inventory_url: String,
    pub inventory_timeout: Duration,
    /// Namespace holding Tinkerbell workflows, templates and hardware
    pub namespace: String,

    pub keycloak_url: String,
    pub keycloak_client_secret: String,

    pub fdo_owner_url: String,
    pub fdo_mfg_url: String,
    pub fdo_rv_enabled: bool,

    pub artifact_service_url: String,
    pub artifact_cache_ttl: Duration,

    /// Run device initialization (DI workflow + FDO) before the prod workflow
    pub enable_device_initialization: bool,
    /// Skip credential creation and revocation entirely
    pub disable_credentials_management: bool,

    pub img_type: String,
    pub tinker_actions_registry: String,
    pub tinker_action_version: String,
    pub disk_device: String,

    /// Reconciliations running at once across distinct resources
    pub reconcile_parallelism: usize,
    /// How often every instance and OS resource is re-enqueued
    pub reconcile_period: Duration,
    /// Capacity of the event channel feeding the engine
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inventory_url: DEFAULT_INVENTORY_URL.to_string(),
            inventory_timeout: Duration::from_secs(3),
            namespace: DEFAULT_NAMESPACE.to_string(),
            keycloak_url: DEFAULT_KEYCLOAK_URL.to_string(),
            keycloak_client_secret: String::new(),
            fdo_owner_url: DEFAULT_FDO_OWNER_URL.to_string(),
            fdo_mfg_url: DEFAULT_FDO_MFG_URL.to_string(),
            fdo_rv_enabled: false,
            artifact_service_url: DEFAULT_ARTIFACT_SERVICE_URL.to_string(),
            artifact_cache_ttl: Duration::from_secs(300),
            enable_device_initialization: false,
            disable_credentials_management: false,
            img_type: DEFAULT_IMG_TYPE.to_string(),
            tinker_actions_registry: DEFAULT_TINKER_ACTIONS_REGISTRY.to_string(),
            tinker_action_version: DEFAULT_TINKER_ACTION_VERSION.to_string(),
            disk_device: DEFAULT_DISK_DEVICE.to_string(),
            reconcile_parallelism: 8,
            reconcile_period: Duration::from_secs(3),
            event_buffer: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str| {
            lookup(key).is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        };

        let disable_credentials_management = flag("DISABLE_CREDENTIALS_MANAGEMENT");
        let keycloak_client_secret = lookup("KEYCLOAK_CLIENT_SECRET").unwrap_or_default();
        if keycloak_client_secret.is_empty() && !disable_credentials_management {
            return Err(ControllerError::InvalidConfig(
                "KEYCLOAK_CLIENT_SECRET environment variable is required unless DISABLE_CREDENTIALS_MANAGEMENT is set"
                    .to_string(),
            ));
        }

        let reconcile_parallelism = parse_number(&lookup, "RECONCILE_PARALLELISM", defaults.reconcile_parallelism)?;
        if reconcile_parallelism == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_PARALLELISM must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            inventory_url: string("INVENTORY_URL", DEFAULT_INVENTORY_URL),
            inventory_timeout: Duration::from_secs(parse_number(
                &lookup,
                "INVENTORY_TIMEOUT_SECS",
                defaults.inventory_timeout.as_secs(),
            )?),
            namespace: string("WATCH_NAMESPACE", DEFAULT_NAMESPACE),
            keycloak_url: string("KEYCLOAK_URL", DEFAULT_KEYCLOAK_URL),
            keycloak_client_secret,
            fdo_owner_url: string("FDO_OWNER_URL", DEFAULT_FDO_OWNER_URL),
            fdo_mfg_url: string("FDO_MFG_URL", DEFAULT_FDO_MFG_URL),
            fdo_rv_enabled: flag("ENABLE_RV"),
            artifact_service_url: string("ARTIFACT_SERVICE_URL", DEFAULT_ARTIFACT_SERVICE_URL),
            artifact_cache_ttl: Duration::from_secs(parse_number(
                &lookup,
                "ARTIFACT_CACHE_TTL_SECS",
                defaults.artifact_cache_ttl.as_secs(),
            )?),
            enable_device_initialization: flag("ENABLE_DEVICE_INITIALIZATION"),
            disable_credentials_management,
            img_type: string("IMG_TYPE", DEFAULT_IMG_TYPE),
            tinker_actions_registry: string("TINKER_ACTIONS_REGISTRY", DEFAULT_TINKER_ACTIONS_REGISTRY),
            tinker_action_version: string("TINKER_ACTION_VERSION", DEFAULT_TINKER_ACTION_VERSION),
            disk_device: string("DISK_DEVICE", DEFAULT_DISK_DEVICE),
            reconcile_parallelism,
            reconcile_period: Duration::from_secs(parse_number(
                &lookup,
                "RECONCILE_PERIOD_SECS",
                defaults.reconcile_period.as_secs(),
            )?),
            event_buffer: parse_number(&lookup, "EVENT_BUFFER", defaults.event_buffer)?.max(1),
        })
    }

    /// Log the resolved configuration, secrets excluded
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Inventory URL: {} (timeout {:?})", self.inventory_url, self.inventory_timeout);
        info!("  Namespace: {}", self.namespace);
        info!("  Keycloak URL: {}", self.keycloak_url);
        info!("  FDO owner: {}", self.fdo_owner_url);
        info!("  FDO manufacturer: {} (RV enabled: {})", self.fdo_mfg_url, self.fdo_rv_enabled);
        info!(
            "  Artifact service: {} (cache TTL {:?})",
            self.artifact_service_url, self.artifact_cache_ttl
        );
        info!("  Device initialization: {}", self.enable_device_initialization);
        info!("  Credentials management disabled: {}", self.disable_credentials_management);
        info!("  Image type: {} (disk {})", self.img_type, self.disk_device);
        info!(
            "  Tinker actions: {} ({})",
            self.tinker_actions_registry, self.tinker_action_version
        );
        info!("  Reconcile parallelism: {}", self.reconcile_parallelism);
        info!("  Reconcile period: {:?}", self.reconcile_period);
        info!("  Event buffer: {}", self.event_buffer);
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ControllerError::InvalidConfig(format!("{key} must be a number, got '{raw}'"))),
        None => Ok(default),
    }
}
