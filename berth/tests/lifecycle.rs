//! Container lifecycle orchestration against a scripted runtime.

use berth::wait::LogWaitStrategy;
use berth::{Berth, BerthError, BerthOptions, ContainerRequest, ContainerStatus};
use berth_test_utils::{ImageProbe, MockRuntime};
use std::sync::Arc;
use std::time::Duration;

async fn session(mock: &Arc<MockRuntime>) -> Berth {
    berth_test_utils::init_tracing();
    Berth::with_session(
        mock.clone().into_session(),
        BerthOptions {
            reaper_disabled: true,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

fn ready_request() -> ContainerRequest {
    ContainerRequest::new("redis:7.2".parse().unwrap())
        .with_exposed_port(6379)
        .with_extra_host("db.local", "10.0.0.9")
        .with_wait(LogWaitStrategy::contains("Ready to accept connections"))
}

#[tokio::test]
async fn start_runs_full_lifecycle_and_labels_session() {
    let mock = Arc::new(MockRuntime::new());
    let id = MockRuntime::nth_id(1);
    mock.script_logs(&id, vec!["Ready to accept connections".to_string()]);

    let berth = session(&mock).await;
    let container = berth.start(ready_request()).await.unwrap();

    assert_eq!(container.status(), ContainerStatus::Running);
    assert_eq!(mock.started_ids(), vec!["mock-1".to_string()]);

    let spec = mock.created_spec(&id).unwrap();
    assert_eq!(
        spec.labels.get("berth.session-id").map(String::as_str),
        Some(berth.session_id())
    );
    assert_eq!(
        spec.labels.get("berth.managed").map(String::as_str),
        Some("true")
    );
    assert_eq!(spec.extra_hosts, vec!["db.local:10.0.0.9".to_string()]);

    // An ephemeral host port was resolved for the exposed port.
    let port = container.host_port(6379).unwrap();
    assert!(port >= 32768);
    assert!(container.host_port(9999).is_err());
}

#[tokio::test]
async fn stop_and_remove_are_idempotent() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_logs(&MockRuntime::nth_id(1), vec!["ready".to_string()]);

    let berth = session(&mock).await;
    let mut container = berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap())
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await
        .unwrap();

    container.stop().await.unwrap();
    container.stop().await.unwrap();
    assert_eq!(mock.stopped_ids().len(), 1);
    assert_eq!(container.status(), ContainerStatus::Stopped);

    container.remove().await.unwrap();
    container.remove().await.unwrap();
    assert_eq!(mock.removed_ids().len(), 1);
    assert_eq!(container.status(), ContainerStatus::Removed);

    // A removed container cannot be restarted.
    assert!(matches!(
        container.restart().await,
        Err(BerthError::InvalidState(_))
    ));
}

#[tokio::test]
async fn restart_rewaits_and_invalidates_ports() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_logs(&MockRuntime::nth_id(1), vec!["ready".to_string()]);

    let berth = session(&mock).await;
    let mut container = berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap())
                .with_exposed_port(6379)
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await
        .unwrap();

    let before = container.host_port(6379).unwrap();
    // Stable across repeated queries while the container runs.
    assert_eq!(container.host_port(6379).unwrap(), before);

    container.restart().await.unwrap();
    assert_eq!(mock.restarted_ids().len(), 1);
    assert_eq!(container.status(), ContainerStatus::Running);

    // The daemon handed out a fresh ephemeral port on restart.
    let after = container.host_port(6379).unwrap();
    assert_ne!(before, after);
}

#[tokio::test]
async fn failed_wait_removes_container_and_keeps_diagnosis() {
    let mock = Arc::new(MockRuntime::new());
    // The log line never appears, so the wait runs out its deadline.
    let berth = session(&mock).await;
    let result = berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap())
                .with_wait(
                    LogWaitStrategy::contains("never")
                        .with_poll_interval(Duration::from_millis(20))
                        .with_startup_timeout(Duration::from_millis(200)),
                ),
        )
        .await;

    // Readiness failures surface unwrapped, not as a stage error.
    assert!(matches!(result, Err(BerthError::WaitTimeout { .. })));
    // The partial container was force-removed.
    assert_eq!(mock.removed_ids(), vec![("mock-1".to_string(), true)]);
}

#[tokio::test]
async fn container_exit_during_wait_reports_logs() {
    let mock = Arc::new(MockRuntime::new());
    let id = MockRuntime::nth_id(1);
    mock.script_exited(&id, 137);
    mock.script_logs(&id, vec!["OOM killed".to_string()]);

    let berth = session(&mock).await;
    let result = berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap()).with_wait(
                LogWaitStrategy::contains("never")
                    .with_poll_interval(Duration::from_millis(20))
                    .with_startup_timeout(Duration::from_secs(5))
                    .with_abort_on_container_exit(),
            ),
        )
        .await;

    match result {
        Err(BerthError::ContainerExited { logs, .. }) => assert!(logs.contains("OOM killed")),
        other => panic!("expected ContainerExited, got {other:?}"),
    }
    assert_eq!(mock.removed_ids(), vec![("mock-1".to_string(), true)]);
}

#[tokio::test]
async fn missing_image_is_pulled_before_create() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_image("busybox:latest", [ImageProbe::Absent]);
    mock.script_logs(&MockRuntime::nth_id(1), vec!["ready".to_string()]);

    let berth = session(&mock).await;
    berth
        .start(
            ContainerRequest::new("busybox".parse().unwrap())
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await
        .unwrap();

    assert_eq!(mock.pulled_images(), vec!["busybox:latest".to_string()]);
}

#[tokio::test]
async fn auto_pull_disabled_fails_on_absent_image() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_image("busybox:latest", [ImageProbe::Absent]);

    let berth = session(&mock).await;
    let result = berth
        .start(
            ContainerRequest::new("busybox".parse().unwrap())
                .without_auto_pull()
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await;

    assert!(matches!(result, Err(BerthError::ImageAbsent(_))));
    assert!(mock.pulled_images().is_empty());
    // Nothing was created.
    assert_eq!(mock.created_count(), 0);
}

#[tokio::test]
async fn network_creation_is_labeled_and_removal_idempotent() {
    let mock = Arc::new(MockRuntime::new());
    let berth = session(&mock).await;

    let mut network = berth.create_network("testnet").await.unwrap();
    assert_eq!(network.name(), "testnet");
    assert_eq!(mock.created_networks(), vec!["testnet".to_string()]);

    network.remove().await.unwrap();
    network.remove().await.unwrap();
    assert_eq!(mock.removed_networks().len(), 1);
}
