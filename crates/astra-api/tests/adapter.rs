mod common;

use astra_api::{ApiError, ApiHandler};
use astra_model::{Command, CommandStatus, ComponentId, ConfigData, LifecycleState, RunId};

use common::{adapter, key, mount, slew};

#[tokio::test(start_paused = true)]
async fn submitted_command_runs_to_completion() {
    let api = adapter(true).await;

    let run = api.submit_command(&mount(), slew(45.0), None).await.unwrap();
    assert_eq!(api.tracked_runs(), 1);
    assert_eq!(api.await_completion(&run).await.unwrap(), CommandStatus::Completed(run));
    assert_eq!(api.command_status(&run).await.unwrap(), CommandStatus::Completed(run));

    assert_eq!(api.prune(), 1);
    assert!(matches!(
        api.command_status(&run).await,
        Err(ApiError::RunNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_a_running_command() {
    let api = adapter(true).await;

    let run = api.submit_command(&mount(), slew(-1.0), None).await.unwrap();
    assert!(!api.command_status(&run).await.unwrap().is_terminal());

    assert!(api.cancel_command(&run).await.unwrap());
    assert_eq!(api.await_completion(&run).await.unwrap(), CommandStatus::Cancelled(run));
    assert!(!api.cancel_command(&run).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn rejected_command_gets_no_run() {
    let api = adapter(true).await;

    let wrong = Command::setup(ConfigData::new(key("tcs.mount.park")));
    let err = api.submit_command(&mount(), wrong, None).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)), "{err}");
    assert_eq!(api.tracked_runs(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_targets_are_reported() {
    let api = adapter(true).await;

    let err = api
        .submit_command(&ComponentId::new("tcs", "dome"), slew(1.0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ComponentNotFound(_)));

    let err = api.command_status(&RunId::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::RunNotFound(_)));
    let err = api.cancel_command(&RunId::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::RunNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn component_without_controller_is_unavailable() {
    let api = adapter(false).await;

    let err = api.submit_command(&mount(), slew(1.0), None).await.unwrap_err();
    assert!(matches!(err, ApiError::Unavailable(_)));

    let status = api.container_status().await.unwrap();
    assert_eq!(status.state_of(&mount()), Some(&LifecycleState::Uninitialized));
}

#[tokio::test(start_paused = true)]
async fn container_status_reports_running_component() {
    let api = adapter(true).await;

    let status = api.container_status().await.unwrap();
    assert_eq!(status.name, "tcs");
    assert!(status.all_in(&LifecycleState::Running));
}
