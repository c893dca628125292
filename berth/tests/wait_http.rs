//! HTTP wait strategy against a real local responder.

use berth::wait::{HttpWaitStrategy, WaitStrategy, WaitTarget};
use berth::{BerthError, BoundPorts, ContainerId, ContainerInspect, HealthStatus, HostBinding, RuntimeStatus};
use berth_test_utils::MockRuntime;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve scripted HTTP responses, one per connection, repeating the last.
async fn spawn_responder(responses: Vec<(u16, String)>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut remaining = responses;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let (status, body) = if remaining.len() > 1 {
                remaining.remove(0)
            } else {
                remaining[0].clone()
            };
            // Drain the request head before answering.
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let reply = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
        }
    });
    port
}

/// A wait target whose port 80 maps to the given local port.
fn target_on(mock: Arc<MockRuntime>, host_port: u16) -> WaitTarget {
    berth_test_utils::init_tracing();
    let mut ports = HashMap::new();
    ports.insert(
        "80/tcp".to_string(),
        vec![HostBinding {
            host_ip: "127.0.0.1".to_string(),
            host_port,
        }],
    );
    let inspect = ContainerInspect {
        status: RuntimeStatus::Running,
        exit_code: None,
        health: Some(HealthStatus::None),
        ip_address: Some("172.17.0.2".to_string()),
        ports,
    };
    WaitTarget {
        client: mock,
        id: ContainerId::new("c0ffee"),
        host: "127.0.0.1".to_string(),
        ports: BoundPorts::from_inspect(&inspect, "127.0.0.1"),
    }
}

fn fast(strategy: HttpWaitStrategy) -> HttpWaitStrategy {
    strategy
        .with_poll_interval(Duration::from_millis(20))
        .with_startup_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn succeeds_on_2xx_without_predicates() {
    let port = spawn_responder(vec![(200, "ok".to_string())]).await;
    let target = target_on(Arc::new(MockRuntime::new()), port);
    fast(HttpWaitStrategy::new("/health", 80))
        .wait_until_ready(&target)
        .await
        .unwrap();
}

#[tokio::test]
async fn retries_until_service_stops_failing() {
    let port = spawn_responder(vec![
        (503, "warming up".to_string()),
        (503, "warming up".to_string()),
        (200, "ok".to_string()),
    ])
    .await;
    let target = target_on(Arc::new(MockRuntime::new()), port);
    fast(HttpWaitStrategy::new("/", 80))
        .wait_until_ready(&target)
        .await
        .unwrap();
}

#[tokio::test]
async fn all_predicates_must_hold_on_the_same_response() {
    let port = spawn_responder(vec![
        (200, "starting".to_string()),
        (200, r#"{"status":"green"}"#.to_string()),
    ])
    .await;
    let target = target_on(Arc::new(MockRuntime::new()), port);
    fast(
        HttpWaitStrategy::new("/cluster/health", 80)
            .for_status_code(200)
            .for_response_predicate(|body| body.contains("green")),
    )
    .wait_until_ready(&target)
    .await
    .unwrap();
}

#[tokio::test]
async fn status_predicate_accepts_non_2xx() {
    let port = spawn_responder(vec![(401, "auth required".to_string())]).await;
    let target = target_on(Arc::new(MockRuntime::new()), port);
    fast(HttpWaitStrategy::new("/", 80).for_status_code(401))
        .wait_until_ready(&target)
        .await
        .unwrap();
}

#[tokio::test]
async fn wrong_status_times_out() {
    let port = spawn_responder(vec![(404, "not here".to_string())]).await;
    let target = target_on(Arc::new(MockRuntime::new()), port);
    let result = fast(HttpWaitStrategy::new("/", 80))
        .with_startup_timeout(Duration::from_millis(300))
        .wait_until_ready(&target)
        .await;
    assert!(matches!(result, Err(BerthError::WaitTimeout { .. })));
}

#[tokio::test]
async fn connection_refused_is_retried_not_fatal() {
    // Bind and immediately drop to get a port nothing listens on, then
    // start a responder there after a delay.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await;
    });

    let target = target_on(Arc::new(MockRuntime::new()), port);
    fast(HttpWaitStrategy::new("/", 80))
        .wait_until_ready(&target)
        .await
        .unwrap();
}

#[tokio::test]
async fn container_exit_aborts_with_log_tail() {
    // Nothing listens on this port; the strategy would retry forever.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let mock = Arc::new(MockRuntime::new());
    let id = ContainerId::new("c0ffee");
    mock.script_exited(&id, 1);
    mock.script_logs(&id, vec!["bind: address already in use".to_string()]);

    let target = target_on(mock, port);
    let result = fast(HttpWaitStrategy::new("/", 80).with_abort_on_container_exit())
        .wait_until_ready(&target)
        .await;
    match result {
        Err(BerthError::ContainerExited { logs, .. }) => {
            assert!(logs.contains("address already in use"));
        }
        other => panic!("expected ContainerExited, got {other:?}"),
    }
}

/// Accept connections but never answer the first `stalls` of them,
/// keeping their sockets open; later connections answer 200.
async fn spawn_stalling_responder(stalls: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        let mut seen = 0usize;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            seen += 1;
            if seen <= stalls {
                held.push(socket);
                continue;
            }
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    });
    port
}

#[tokio::test]
async fn hanging_attempt_is_cut_by_read_timeout_and_retried() {
    let port = spawn_stalling_responder(2).await;
    let target = target_on(Arc::new(MockRuntime::new()), port);

    let started = std::time::Instant::now();
    fast(HttpWaitStrategy::new("/", 80).with_read_timeout(Duration::from_millis(200)))
        .wait_until_ready(&target)
        .await
        .unwrap();

    // Two stalled attempts cost one read timeout each, not the whole
    // startup budget.
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn probe_dials_runtime_host_not_binding_address() {
    let port = spawn_responder(vec![(200, "ok".to_string())]).await;

    // The daemon reports a binding address that is not dialable from
    // here; the probe must use the runtime host instead.
    let mut ports = HashMap::new();
    ports.insert(
        "80/tcp".to_string(),
        vec![HostBinding {
            host_ip: "203.0.113.7".to_string(),
            host_port: port,
        }],
    );
    let inspect = ContainerInspect {
        status: RuntimeStatus::Running,
        exit_code: None,
        health: Some(HealthStatus::None),
        ip_address: None,
        ports,
    };
    let target = WaitTarget {
        client: Arc::new(MockRuntime::new()),
        id: ContainerId::new("c0ffee"),
        host: "127.0.0.1".to_string(),
        ports: BoundPorts::from_inspect(&inspect, "127.0.0.1"),
    };

    fast(HttpWaitStrategy::new("/", 80))
        .with_read_timeout(Duration::from_millis(200))
        .wait_until_ready(&target)
        .await
        .unwrap();
}

#[tokio::test]
async fn unbound_probe_port_fails_immediately() {
    let target = target_on(Arc::new(MockRuntime::new()), 1);
    let result = fast(HttpWaitStrategy::new("/", 8080))
        .wait_until_ready(&target)
        .await;
    assert!(matches!(result, Err(BerthError::PortNotBound(8080))));
}
