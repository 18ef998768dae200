//! Access to Tinkerbell objects
//!
//! [`WorkflowClient`] is the seam the orchestrator talks through;
//! [`KubeWorkflowClient`] implements it against the Kubernetes API.

use crate::error::ProvisioningError;
use crds::{Hardware, Template, Workflow};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, info};

/// Tinkerbell object operations used while provisioning
///
/// Creation is idempotent: an object that already exists is left untouched.
/// Deletion of an object that does not exist succeeds.
#[async_trait::async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn get_workflow(&self, name: &str) -> Result<Option<Workflow>, ProvisioningError>;
    async fn get_hardware(&self, name: &str) -> Result<Option<Hardware>, ProvisioningError>;

    async fn create_workflow_if_missing(&self, workflow: &Workflow) -> Result<(), ProvisioningError>;
    async fn create_template_if_missing(&self, template: &Template) -> Result<(), ProvisioningError>;
    async fn create_hardware_if_missing(&self, hardware: &Hardware) -> Result<(), ProvisioningError>;

    async fn delete_workflow(&self, name: &str) -> Result<(), ProvisioningError>;
    async fn delete_template(&self, name: &str) -> Result<(), ProvisioningError>;
    async fn delete_hardware(&self, name: &str) -> Result<(), ProvisioningError>;
}

/// Namespaced Kubernetes implementation
#[derive(Clone)]
pub struct KubeWorkflowClient {
    workflows: Api<Workflow>,
    templates: Api<Template>,
    hardware: Api<Hardware>,
}

impl Debug for KubeWorkflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWorkflowClient").finish_non_exhaustive()
    }
}

impl KubeWorkflowClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            workflows: Api::namespaced(client.clone(), namespace),
            templates: Api::namespaced(client.clone(), namespace),
            hardware: Api::namespaced(client, namespace),
        }
    }
}

async fn get<K>(api: &Api<K>, name: &str) -> Result<Option<K>, ProvisioningError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn create_if_missing<K>(api: &Api<K>, obj: &K, kind: &str) -> Result<(), ProvisioningError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.meta().name.clone().unwrap_or_default();
    if get(api, &name).await?.is_some() {
        debug!("Tinkerbell {} {} already exists", kind, name);
        return Ok(());
    }
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => {
            info!("Created Tinkerbell {} {}", kind, name);
            Ok(())
        }
        // Lost a race with another writer
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn delete_if_exists<K>(api: &Api<K>, name: &str, kind: &str) -> Result<(), ProvisioningError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!("Deleted Tinkerbell {} {}", kind, name);
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl WorkflowClient for KubeWorkflowClient {
    async fn get_workflow(&self, name: &str) -> Result<Option<Workflow>, ProvisioningError> {
        get(&self.workflows, name).await
    }

    async fn get_hardware(&self, name: &str) -> Result<Option<Hardware>, ProvisioningError> {
        get(&self.hardware, name).await
    }

    async fn create_workflow_if_missing(&self, workflow: &Workflow) -> Result<(), ProvisioningError> {
        create_if_missing(&self.workflows, workflow, "workflow").await
    }

    async fn create_template_if_missing(&self, template: &Template) -> Result<(), ProvisioningError> {
        create_if_missing(&self.templates, template, "template").await
    }

    async fn create_hardware_if_missing(&self, hardware: &Hardware) -> Result<(), ProvisioningError> {
        create_if_missing(&self.hardware, hardware, "hardware").await
    }

    async fn delete_workflow(&self, name: &str) -> Result<(), ProvisioningError> {
        delete_if_exists(&self.workflows, name, "workflow").await
    }

    async fn delete_template(&self, name: &str) -> Result<(), ProvisioningError> {
        delete_if_exists(&self.templates, name, "template").await
    }

    async fn delete_hardware(&self, name: &str) -> Result<(), ProvisioningError> {
        delete_if_exists(&self.hardware, name, "hardware").await
    }
}

/// In-memory Tinkerbell objects for unit tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use crds::{WorkflowState, WorkflowStatus};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MockWorkflowClient {
        pub(crate) workflows: Arc<Mutex<HashMap<String, Workflow>>>,
        pub(crate) templates: Arc<Mutex<HashMap<String, Template>>>,
        pub(crate) hardware: Arc<Mutex<HashMap<String, Hardware>>>,
        pub(crate) created: Arc<Mutex<Vec<String>>>,
        pub(crate) deleted: Arc<Mutex<Vec<String>>>,
        pub(crate) fail_deletes: Arc<Mutex<bool>>,
    }

    impl Debug for MockWorkflowClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockWorkflowClient").finish_non_exhaustive()
        }
    }

    impl MockWorkflowClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Report `state` for an existing workflow
        pub fn set_workflow_state(&self, name: &str, state: &WorkflowState) {
            self.set_workflow_status(
                name,
                WorkflowStatus {
                    state: state.to_string(),
                    ..WorkflowStatus::default()
                },
            );
        }

        pub fn set_workflow_status(&self, name: &str, status: WorkflowStatus) {
            if let Some(wf) = self.workflows.lock().unwrap().get_mut(name) {
                wf.status = Some(status);
            }
        }

        pub fn set_fail_deletes(&self, fail: bool) {
            *self.fail_deletes.lock().unwrap() = fail;
        }

        pub fn workflow(&self, name: &str) -> Option<Workflow> {
            self.workflows.lock().unwrap().get(name).cloned()
        }

        pub fn template(&self, name: &str) -> Option<Template> {
            self.templates.lock().unwrap().get(name).cloned()
        }

        pub fn has_hardware(&self, name: &str) -> bool {
            self.hardware.lock().unwrap().contains_key(name)
        }

        /// Names of every object created, in call order
        pub fn created(&self) -> Vec<String> {
            self.created.lock().unwrap().clone()
        }

        /// Names passed to any delete call, in call order
        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }

        /// Whether any call was made at all
        pub fn untouched(&self) -> bool {
            self.created().is_empty() && self.deleted().is_empty()
        }

        fn insert<K: Resource + Clone>(&self, map: &Mutex<HashMap<String, K>>, obj: &K) {
            let name = obj.meta().name.clone().unwrap_or_default();
            let mut map = map.lock().unwrap();
            if !map.contains_key(&name) {
                self.created.lock().unwrap().push(name.clone());
                map.insert(name, obj.clone());
            }
        }

        fn remove<K>(&self, map: &Mutex<HashMap<String, K>>, name: &str) -> Result<(), ProvisioningError> {
            self.deleted.lock().unwrap().push(name.to_string());
            if *self.fail_deletes.lock().unwrap() {
                return Err(ProvisioningError::Workflow(format!("delete of {name} failed")));
            }
            map.lock().unwrap().remove(name);
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl WorkflowClient for MockWorkflowClient {
        async fn get_workflow(&self, name: &str) -> Result<Option<Workflow>, ProvisioningError> {
            Ok(self.workflow(name))
        }

        async fn get_hardware(&self, name: &str) -> Result<Option<Hardware>, ProvisioningError> {
            Ok(self.hardware.lock().unwrap().get(name).cloned())
        }

        async fn create_workflow_if_missing(&self, workflow: &Workflow) -> Result<(), ProvisioningError> {
            self.insert(&self.workflows, workflow);
            Ok(())
        }

        async fn create_template_if_missing(&self, template: &Template) -> Result<(), ProvisioningError> {
            self.insert(&self.templates, template);
            Ok(())
        }

        async fn create_hardware_if_missing(&self, hardware: &Hardware) -> Result<(), ProvisioningError> {
            self.insert(&self.hardware, hardware);
            Ok(())
        }

        async fn delete_workflow(&self, name: &str) -> Result<(), ProvisioningError> {
            self.remove(&self.workflows, name)
        }

        async fn delete_template(&self, name: &str) -> Result<(), ProvisioningError> {
            self.remove(&self.templates, name)
        }

        async fn delete_hardware(&self, name: &str) -> Result<(), ProvisioningError> {
            self.remove(&self.hardware, name)
        }
    }
}
