//! Unit tests for the workflow orchestrator

#[cfg(test)]
mod tests {
    use crate::error::ProvisioningError;
    use crate::status;
    use crate::test_utils::*;
    use crate::workflow::names;
    use crds::{Action, Task, WorkflowState, WorkflowStatus};
    use inventory_client::{Instance, InstanceState, StatusIndicator};

    fn instance() -> Instance {
        create_test_instance(InstanceState::Running, InstanceState::Unspecified)
    }

    #[tokio::test]
    async fn test_prod_workflow_is_created_and_reported_in_progress() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();

        let err = orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap_err();

        assert!(err.is_in_progress());
        assert_eq!(
            mocks.workflows.created(),
            vec![
                names::hardware_name(GUID),
                format!("prod-bkc-{GUID}-prod"),
                names::prod_workflow_name(GUID),
            ]
        );
        // Without device initialization the prod path issues credentials itself
        assert_eq!(mocks.auth.created(), vec![GUID]);
        assert_eq!(instance.provisioning_status, status::PROVISIONING_IN_PROGRESS);

        let wf = mocks.workflows.workflow(&names::prod_workflow_name(GUID)).unwrap();
        assert_eq!(wf.spec.template_ref, format!("prod-bkc-{GUID}-prod"));
    }

    #[tokio::test]
    async fn test_second_pass_does_not_recreate_objects() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();

        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;
        let err = orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap_err();

        assert!(err.is_in_progress());
        assert_eq!(mocks.workflows.created().len(), 3);
    }

    #[tokio::test]
    async fn test_running_workflow_reports_status_detail() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();
        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;

        mocks.workflows.set_workflow_status(
            &names::prod_workflow_name(GUID),
            WorkflowStatus {
                state: WorkflowState::RUNNING.to_string(),
                tasks: vec![Task {
                    name: "os-installation".to_string(),
                    actions: vec![
                        Action {
                            name: "erase-non-removable-disk".to_string(),
                            status: WorkflowState::SUCCESS.to_string(),
                            ..Action::default()
                        },
                        Action {
                            name: "stream-os-image".to_string(),
                            status: WorkflowState::RUNNING.to_string(),
                            ..Action::default()
                        },
                        Action {
                            name: "reboot".to_string(),
                            ..Action::default()
                        },
                    ],
                    ..Task::default()
                }],
                ..WorkflowStatus::default()
            },
        );

        let err = orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap_err();

        assert!(err.is_in_progress());
        assert_eq!(
            instance.provisioning_status,
            "Provisioning In Progress: 2/3: Streaming OS image"
        );
        assert_eq!(instance.provisioning_status_indicator, StatusIndicator::InProgress);
    }

    #[tokio::test]
    async fn test_successful_workflow_sets_running_and_current_os() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();
        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;
        mocks
            .workflows
            .set_workflow_state(&names::prod_workflow_name(GUID), &WorkflowState::Success);

        orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap();

        assert_eq!(instance.current_state, InstanceState::Running);
        assert_eq!(instance.provisioning_status, status::PROVISIONED);
        assert_eq!(instance.current_os.as_ref().unwrap().resource_id, OS_ID);

        let host = instance.host.as_deref().unwrap();
        assert_eq!(host.host_status, status::REBOOT_IN_PROGRESS);
        assert_eq!(host.host_status_indicator, StatusIndicator::InProgress);
    }

    #[tokio::test]
    async fn test_running_workflow_leaves_host_status_alone() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();
        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;
        mocks
            .workflows
            .set_workflow_state(&names::prod_workflow_name(GUID), &WorkflowState::Running);

        let err = orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap_err();

        assert!(err.is_in_progress());
        assert_eq!(instance.host.as_deref().unwrap().host_status, "");
    }

    #[tokio::test]
    async fn test_failed_workflow_aborts() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();
        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;

        for state in [WorkflowState::Failed, WorkflowState::Timeout] {
            mocks
                .workflows
                .set_workflow_state(&names::prod_workflow_name(GUID), &state);
            let err = orchestrator
                .check_status_or_run_prod(&device, &mut instance)
                .await
                .unwrap_err();

            assert!(err.is_aborted());
            assert_eq!(instance.current_state, InstanceState::Error);
            assert_eq!(instance.provisioning_status, status::PROVISIONING_FAILED);
        }
    }

    #[tokio::test]
    async fn test_unknown_workflow_state_is_an_error() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();
        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;
        mocks.workflows.set_workflow_state(
            &names::prod_workflow_name(GUID),
            &WorkflowState::Other("STATE_PAUSED".to_string()),
        );

        let err = orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::Workflow(ref msg) if msg.contains("STATE_PAUSED")));
    }

    #[tokio::test]
    async fn test_success_without_hardware_is_an_error() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();
        let _ = orchestrator.check_status_or_run_prod(&device, &mut instance).await;
        mocks
            .workflows
            .set_workflow_state(&names::prod_workflow_name(GUID), &WorkflowState::Success);
        mocks
            .workflows
            .hardware
            .lock()
            .unwrap()
            .remove(&names::hardware_name(GUID));

        let err = orchestrator
            .check_status_or_run_prod(&device, &mut instance)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::Workflow(_)));
    }

    #[tokio::test]
    async fn test_di_steps_are_skipped_when_disabled() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));
        let device = create_test_device();
        let mut instance = instance();

        orchestrator.check_status_or_run_di(&device, &mut instance).await.unwrap();
        orchestrator
            .check_status_or_run_reboot(&device, &mut instance)
            .await
            .unwrap();

        assert!(mocks.workflows.untouched());
    }

    #[tokio::test]
    async fn test_di_workflow_lifecycle() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(true));
        let device = create_test_device();
        let mut instance = instance();

        let err = orchestrator
            .check_status_or_run_di(&device, &mut instance)
            .await
            .unwrap_err();
        assert!(err.is_in_progress());
        assert!(mocks.workflows.template(&names::di_template_name(GUID)).is_some());
        assert_eq!(
            instance.host.as_ref().unwrap().onboarding_status,
            status::INITIALIZATION_IN_PROGRESS
        );

        mocks
            .workflows
            .set_workflow_state(&names::di_workflow_name(GUID), &WorkflowState::Success);
        orchestrator.check_status_or_run_di(&device, &mut instance).await.unwrap();
        assert_eq!(
            instance.host.as_ref().unwrap().onboarding_status,
            status::INITIALIZATION_DONE
        );

        mocks
            .workflows
            .set_workflow_state(&names::di_workflow_name(GUID), &WorkflowState::Failed);
        let err = orchestrator
            .check_status_or_run_di(&device, &mut instance)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(
            instance.host.as_ref().unwrap().onboarding_status,
            status::INITIALIZATION_FAILED
        );
    }

    #[tokio::test]
    async fn test_reboot_failure_aborts() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(true));
        let device = create_test_device();
        let mut instance = instance();

        let err = orchestrator
            .check_status_or_run_reboot(&device, &mut instance)
            .await
            .unwrap_err();
        assert!(err.is_in_progress());
        assert_eq!(
            instance.host.as_ref().unwrap().onboarding_status,
            status::REBOOT_IN_PROGRESS
        );

        mocks
            .workflows
            .set_workflow_state(&names::reboot_workflow_name(GUID), &WorkflowState::Timeout);
        let err = orchestrator
            .check_status_or_run_reboot(&device, &mut instance)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(instance.host.as_ref().unwrap().onboarding_status, status::REBOOT_FAILED);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_everything() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(true));
        let device = create_test_device();

        orchestrator.cleanup(&device).await.unwrap();

        assert_eq!(
            mocks.workflows.deleted(),
            vec![
                format!("prod-bkc-{GUID}-prod"),
                names::prod_workflow_name(GUID),
                names::reboot_template_name(GUID),
                names::reboot_workflow_name(GUID),
                names::di_template_name(GUID),
                names::di_workflow_name(GUID),
                names::hardware_name(GUID),
            ]
        );
    }

    #[tokio::test]
    async fn test_cleanup_without_di_keeps_to_prod_objects() {
        let mocks = Mocks::new();
        let orchestrator = mocks.orchestrator(&test_config(false));

        orchestrator.cleanup(&create_test_device()).await.unwrap();

        assert_eq!(mocks.workflows.deleted().len(), 3);
    }
}
