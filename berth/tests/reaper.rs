//! Reaper sidecar protocol, with a local listener standing in for ryuk.

use berth::constants::labels;
use berth::wait::LogWaitStrategy;
use berth::{Berth, BerthOptions, ContainerRequest, HostBinding};
use berth_test_utils::MockRuntime;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Accept one connection and answer `ACK` to every line, recording lines.
async fn spawn_ack_listener(seen: Arc<Mutex<Vec<String>>>) -> u16 {
    berth_test_utils::init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.lock().await.push(line);
            if write.write_all(b"ACK\n").await.is_err() {
                return;
            }
        }
    });
    port
}

fn sidecar_ports(control_port: u16, listener_port: u16) -> HashMap<String, Vec<HostBinding>> {
    let mut ports = HashMap::new();
    ports.insert(
        format!("{control_port}/tcp"),
        vec![HostBinding {
            host_ip: "127.0.0.1".to_string(),
            host_port: listener_port,
        }],
    );
    ports
}

#[tokio::test]
async fn session_filter_registered_once_across_containers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener_port = spawn_ack_listener(seen.clone()).await;

    let mock = Arc::new(MockRuntime::new());
    // mock-1 is the requested container; mock-2 is the reaper sidecar.
    mock.script_logs(&MockRuntime::nth_id(1), vec!["ready".to_string()]);
    mock.script_logs(&MockRuntime::nth_id(3), vec!["ready".to_string()]);
    mock.script_ports(
        &MockRuntime::nth_id(2),
        vec![sidecar_ports(8080, listener_port)],
    );

    let berth = Berth::with_session(mock.clone().into_session(), BerthOptions::default())
        .await
        .unwrap();

    berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap())
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await
        .unwrap();
    berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap())
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await
        .unwrap();

    // One sidecar, one filter line, despite two registrations.
    let lines = seen.lock().await.clone();
    assert_eq!(
        lines,
        vec![format!(
            "label={}={}",
            labels::SESSION_ID,
            berth.session_id()
        )]
    );
    // Exactly three containers: two requested plus one sidecar.
    assert_eq!(mock.created_count(), 3);

    // The sidecar itself never carries the session label.
    let sidecar = mock.created_spec(&MockRuntime::nth_id(2)).unwrap();
    assert!(sidecar.labels.contains_key(labels::REAPER));
    assert!(!sidecar.labels.contains_key(labels::SESSION_ID));
    assert!(
        sidecar
            .binds
            .iter()
            .any(|b| b.contains("/var/run/docker.sock"))
    );
}

#[tokio::test]
async fn disabled_reaper_starts_no_sidecar() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_logs(&MockRuntime::nth_id(1), vec!["ready".to_string()]);

    let berth = Berth::with_session(
        mock.clone().into_session(),
        BerthOptions {
            reaper_disabled: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    berth
        .start(
            ContainerRequest::new("redis:7.2".parse().unwrap())
                .with_wait(LogWaitStrategy::contains("ready")),
        )
        .await
        .unwrap();

    assert_eq!(mock.created_count(), 1);
}
