//! Deterministic names of the Tinkerbell objects created for a device
//!
//! Every name derives from the device GUID (the host UUID), so a restart finds
//! the objects created before it.

pub fn di_workflow_name(guid: &str) -> String {
    format!("workflow-{guid}")
}

pub fn di_template_name(guid: &str) -> String {
    format!("fdodi-{guid}")
}

pub fn reboot_workflow_name(guid: &str) -> String {
    format!("reboot-workflow-{guid}")
}

pub fn reboot_template_name(guid: &str) -> String {
    format!("reboot-{guid}")
}

pub fn prod_workflow_name(guid: &str) -> String {
    format!("workflow-{guid}-prod")
}

/// Kubernetes names cannot contain `_`, image types (`prod_bkc`) can
pub fn prod_template_name(img_type: &str, guid: &str) -> String {
    format!("{}-{guid}-prod", img_type.replace('_', "-"))
}

pub fn hardware_name(guid: &str) -> String {
    format!("machine-{guid}")
}

/// Device GUID a workflow was created for; `None` for foreign workflows
pub fn device_guid(workflow_name: &str) -> Option<&str> {
    let guid = if let Some(rest) = workflow_name.strip_prefix("reboot-workflow-") {
        rest
    } else {
        let rest = workflow_name.strip_prefix("workflow-")?;
        rest.strip_suffix("-prod").unwrap_or(rest)
    };
    (!guid.is_empty()).then_some(guid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: &str = "4c4c4544-0035-3010-8030-b2c04f4a4633";

    #[test]
    fn test_names() {
        assert_eq!(di_workflow_name(GUID), format!("workflow-{GUID}"));
        assert_eq!(di_template_name(GUID), format!("fdodi-{GUID}"));
        assert_eq!(reboot_workflow_name(GUID), format!("reboot-workflow-{GUID}"));
        assert_eq!(reboot_template_name(GUID), format!("reboot-{GUID}"));
        assert_eq!(prod_workflow_name(GUID), format!("workflow-{GUID}-prod"));
        assert_eq!(hardware_name(GUID), format!("machine-{GUID}"));
    }

    #[test]
    fn test_prod_template_name_is_dns_safe() {
        assert_eq!(prod_template_name("prod_bkc", "abc"), "prod-bkc-abc-prod");
        assert_eq!(prod_template_name("tiber-os", "abc"), "tiber-os-abc-prod");
    }

    #[test]
    fn test_device_guid_reverses_workflow_names() {
        for name in [di_workflow_name(GUID), reboot_workflow_name(GUID), prod_workflow_name(GUID)] {
            assert_eq!(device_guid(&name), Some(GUID), "{name}");
        }
        assert_eq!(device_guid("workflow-"), None);
        assert_eq!(device_guid("someone-elses-workflow"), None);
    }
}
