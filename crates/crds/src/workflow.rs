//! Workflow CRD
//!
//! A Tinkerbell workflow binds a template to a piece of hardware and reports the
//! progress of every action it executes on the device.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hardware map key used for the single device a workflow targets.
pub const DEVICE_SLOT: &str = "device_1";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "tinkerbell.org",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Name of the Template to run
    #[serde(default)]
    pub template_ref: String,

    /// Name of the Hardware the workflow runs on
    #[serde(default)]
    pub hardware_ref: String,

    /// Logical device slot to MAC address
    #[serde(default)]
    pub hardware_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// Raw workflow state as written by the Tinkerbell controller
    #[serde(default)]
    pub state: String,

    /// Global timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_timeout: Option<i64>,

    /// Tasks executed by this workflow
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,

    #[serde(default, rename = "worker")]
    pub worker_addr: String,

    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub timeout: i64,

    /// Raw action state, same vocabulary as the workflow state
    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default)]
    pub seconds: i64,

    #[serde(default)]
    pub message: String,
}

/// Parsed workflow (or action) state.
///
/// The CRD stores the state as a plain string so that values written by a newer
/// Tinkerbell release still deserialize; unrecognised values land in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    /// No state reported yet
    Unset,
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Other(String),
}

impl WorkflowState {
    pub const PENDING: &'static str = "STATE_PENDING";
    pub const RUNNING: &'static str = "STATE_RUNNING";
    pub const SUCCESS: &'static str = "STATE_SUCCESS";
    pub const FAILED: &'static str = "STATE_FAILED";
    pub const TIMEOUT: &'static str = "STATE_TIMEOUT";

    /// Parse the raw string stored in a workflow or action status
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" => Self::Unset,
            Self::PENDING => Self::Pending,
            Self::RUNNING => Self::Running,
            Self::SUCCESS => Self::Success,
            Self::FAILED => Self::Failed,
            Self::TIMEOUT => Self::Timeout,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = match self {
            Self::Unset => "",
            Self::Pending => Self::PENDING,
            Self::Running => Self::RUNNING,
            Self::Success => Self::SUCCESS,
            Self::Failed => Self::FAILED,
            Self::Timeout => Self::TIMEOUT,
            Self::Other(other) => other,
        };
        f.write_str(raw)
    }
}

impl Workflow {
    /// Current state of the workflow, `Unset` when no status was reported
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.status
            .as_ref()
            .map_or(WorkflowState::Unset, |s| WorkflowState::parse(&s.state))
    }
}

impl Action {
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        WorkflowState::parse(&self.status)
    }
}
