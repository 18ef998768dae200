//! Human readable progress of a running workflow
//!
//! Rendered as `"<n>/<total>: <message>"` from the actions of the workflow's
//! first task and appended to the provisioning status while it runs.

use crds::{Workflow, WorkflowState};

/// Action name to the text shown while the action is current
const ACTION_DETAILS: &[(&str, &str)] = &[
    ("erase-non-removable-disk", "Erasing data from all non-removable disks"),
    ("secure-boot-status-flag-read", "Verifying Secure Boot settings"),
    (
        "profile-pkg-and-node-agents-install-script-download",
        "Downloading installation scripts",
    ),
    ("stream-os-image", "Streaming OS image"),
    (
        "service-script-for-profile-pkg-and-node-agents-install",
        "Installing packages",
    ),
    ("efibootset-for-diskboot", "Setting boot option"),
    ("fde-encryption", "Setting FDE encryption"),
    ("enable-security-features", "Enabling OS security features"),
    ("reboot", "Rebooting"),
    ("add-apt-proxy", "Configuring APT proxy settings"),
    ("system-configuration", "Applying system configuration"),
    ("kernel-upgrade", "Upgrading kernel"),
    ("install-cloud-init", "Installing cloud-init"),
    ("custom-configs", "Copying custom cloud-init configs"),
    ("custom-configs-split", "Installing custom cloud-init configs"),
    ("cloud-init-ds-identity", "Setting up cloud-init"),
];

fn action_detail(name: &str) -> &str {
    ACTION_DETAILS
        .iter()
        .find(|(action, _)| *action == name)
        .map_or(name, |(_, detail)| detail)
}

/// Progress of `workflow`, empty when there is nothing meaningful to show
pub fn status_detail(workflow: &Workflow) -> String {
    if workflow.state() == WorkflowState::Success {
        return String::new();
    }
    let Some(task) = workflow.status.as_ref().and_then(|s| s.tasks.first()) else {
        return String::new();
    };
    let actions = &task.actions;
    let total = actions.len();

    for (index, action) in actions.iter().enumerate() {
        if action.name.is_empty() {
            tracing::warn!("Workflow action with an empty name, invalid workflow");
            return String::new();
        }
        let last = index + 1 == total;
        let detail = action_detail(&action.name);
        let message = match action.state() {
            WorkflowState::Success if !last => continue,
            WorkflowState::Failed if action.message.is_empty() => format!("{detail} failed"),
            WorkflowState::Failed => format!("{detail} failed: {}", action.message),
            WorkflowState::Timeout => format!("{detail} timeout"),
            _ => detail.to_string(),
        };
        return format!("{}/{total}: {message}", index + 1);
    }

    // No actions
    String::new()
}
