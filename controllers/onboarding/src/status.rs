//! Status catalogue
//!
//! Human readable statuses written to hosts and instances, each paired with
//! the indicator the UI uses to colour it.

use inventory_client::{Host, Instance, ResourceStatus, StatusIndicator, now_timestamp};

pub const PROVISIONING_IN_PROGRESS: &str = "Provisioning In Progress";
pub const PROVISIONING_FAILED: &str = "Provisioning Failed";
pub const PROVISIONED: &str = "Provisioned";

pub const INITIALIZATION_IN_PROGRESS: &str = "Device initializing";
pub const INITIALIZATION_DONE: &str = "Device initialized";
pub const INITIALIZATION_FAILED: &str = "Device initialization failed";

pub const ONBOARDING_IN_PROGRESS: &str = "Onboarding";
pub const ONBOARDED: &str = "Onboarded";

pub const REBOOT_IN_PROGRESS: &str = "Rebooting";
pub const REBOOT_DONE: &str = "Rebooted";
pub const REBOOT_FAILED: &str = "Reboot failed";

pub const INVALIDATED: &str = "Invalidated";
pub const UNKNOWN: &str = "Unknown";
pub const DELETING: &str = "Deleting";

pub fn provisioning_in_progress() -> ResourceStatus {
    ResourceStatus::new(PROVISIONING_IN_PROGRESS, StatusIndicator::InProgress)
}

pub fn provisioning_failed() -> ResourceStatus {
    ResourceStatus::new(PROVISIONING_FAILED, StatusIndicator::Error)
}

pub fn provisioning_done() -> ResourceStatus {
    ResourceStatus::new(PROVISIONED, StatusIndicator::Idle)
}

pub fn initialization_in_progress() -> ResourceStatus {
    ResourceStatus::new(INITIALIZATION_IN_PROGRESS, StatusIndicator::InProgress)
}

pub fn initialization_done() -> ResourceStatus {
    ResourceStatus::new(INITIALIZATION_DONE, StatusIndicator::Idle)
}

pub fn initialization_failed() -> ResourceStatus {
    ResourceStatus::new(INITIALIZATION_FAILED, StatusIndicator::Error)
}

pub fn onboarding_in_progress() -> ResourceStatus {
    ResourceStatus::new(ONBOARDING_IN_PROGRESS, StatusIndicator::InProgress)
}

pub fn onboarding_done() -> ResourceStatus {
    ResourceStatus::new(ONBOARDED, StatusIndicator::Idle)
}

pub fn reboot_in_progress() -> ResourceStatus {
    ResourceStatus::new(REBOOT_IN_PROGRESS, StatusIndicator::InProgress)
}

pub fn reboot_done() -> ResourceStatus {
    ResourceStatus::new(REBOOT_DONE, StatusIndicator::Idle)
}

pub fn reboot_failed() -> ResourceStatus {
    ResourceStatus::new(REBOOT_FAILED, StatusIndicator::Error)
}

pub fn invalidated() -> ResourceStatus {
    ResourceStatus::new(INVALIDATED, StatusIndicator::Idle)
}

pub fn deleting() -> ResourceStatus {
    ResourceStatus::new(DELETING, StatusIndicator::InProgress)
}

/// Provisioning and onboarding status of an instance whose host lost its trust
pub fn unknown() -> ResourceStatus {
    ResourceStatus::new(UNKNOWN, StatusIndicator::Idle)
}

/// Set the instance provisioning status; the timestamp moves only on change
pub fn set_provisioning_status(instance: &mut Instance, status: &ResourceStatus) {
    if instance.provisioning_status == status.status && instance.provisioning_status_indicator == status.indicator {
        return;
    }
    instance.provisioning_status = status.status.clone();
    instance.provisioning_status_indicator = status.indicator;
    instance.provisioning_status_timestamp = now_timestamp();
}

/// Set the host onboarding status; the timestamp moves only on change
pub fn set_onboarding_status(host: &mut Host, status: &ResourceStatus) {
    if host.onboarding_status == status.status && host.onboarding_status_indicator == status.indicator {
        return;
    }
    host.onboarding_status = status.status.clone();
    host.onboarding_status_indicator = status.indicator;
    host.onboarding_status_timestamp = now_timestamp();
}

pub fn set_host_status(host: &mut Host, status: &ResourceStatus) {
    host.host_status = status.status.clone();
    host.host_status_indicator = status.indicator;
    host.host_status_timestamp = now_timestamp();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicators() {
        assert_eq!(provisioning_done().indicator, StatusIndicator::Idle);
        assert_eq!(provisioning_failed().indicator, StatusIndicator::Error);
        assert_eq!(deleting().indicator, StatusIndicator::InProgress);
    }

    #[test]
    fn test_details_keep_indicator() {
        let status = provisioning_in_progress().with_details("3/9: Streaming OS image");
        assert_eq!(status.status, "Provisioning In Progress: 3/9: Streaming OS image");
        assert_eq!(status.indicator, StatusIndicator::InProgress);
    }

    #[test]
    fn test_timestamp_moves_only_on_change() {
        let mut instance = Instance::default();
        set_provisioning_status(&mut instance, &provisioning_in_progress());
        assert_eq!(instance.provisioning_status, PROVISIONING_IN_PROGRESS);
        assert_ne!(instance.provisioning_status_timestamp, 0);

        instance.provisioning_status_timestamp = 1;
        set_provisioning_status(&mut instance, &provisioning_in_progress());
        assert_eq!(instance.provisioning_status_timestamp, 1);

        set_provisioning_status(&mut instance, &provisioning_done());
        assert_eq!(instance.provisioning_status_indicator, StatusIndicator::Idle);
        assert_ne!(instance.provisioning_status_timestamp, 1);
    }

    #[test]
    fn test_onboarding_status() {
        let mut host = Host::default();
        set_onboarding_status(&mut host, &onboarding_done());
        assert_eq!(host.onboarding_status, ONBOARDED);
        assert_eq!(host.onboarding_status_indicator, StatusIndicator::Idle);
    }
}
