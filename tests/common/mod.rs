//! Shared utilities for lifecycle integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::Path, routing::get, Router};
use serve_lifecycle::config::ServerConfig;
use serve_lifecycle::lifecycle::{
    Coordinator, LifecycleError, LifecycleReport, LifecycleState, TerminationTrigger,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Loopback config on an ephemeral port with a short shutdown deadline.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.shutdown.deadline = Duration::from_millis(500);
    config
}

/// `GET /ping` answers at once; `GET /sleep/{ms}` answers after `ms` milliseconds.
pub fn test_router() -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong\n" }))
        .route(
            "/sleep/{ms}",
            get(|Path(ms): Path<u64>| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                "done"
            }),
        )
}

/// A coordinator running on a background task.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub trigger: TerminationTrigger,
    pub forced: CancellationToken,
    pub state: watch::Receiver<LifecycleState>,
    pub task: JoinHandle<Result<LifecycleReport, LifecycleError>>,
}

impl RunningServer {
    /// Wait for the run to finish.
    pub async fn finish(self) -> LifecycleReport {
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("run finished in time")
            .expect("run task did not panic")
            .expect("signal handlers installed")
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a coordinator and wait for its listener to be bound.
pub async fn start(config: ServerConfig, router: Router) -> RunningServer {
    let coordinator = Coordinator::new(config, router);
    let mut ready = coordinator.ready();
    let trigger = coordinator.termination_trigger();
    let forced = coordinator.forced_exit();
    let state = coordinator.state();
    let task = tokio::spawn(coordinator.run_with_report());

    let bound = tokio::time::timeout(Duration::from_secs(5), ready.wait_for(Option::is_some))
        .await
        .expect("listener bound in time")
        .expect("runner alive");
    let addr: Option<SocketAddr> = *bound;

    RunningServer {
        addr: addr.expect("bound address"),
        trigger,
        forced,
        state,
        task,
    }
}

/// HTTP client without pooling, so no idle connection outlives a request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Whether anything still accepts connections on `addr`.
pub async fn accepts_connections(addr: SocketAddr) -> bool {
    TcpStream::connect(addr).await.is_ok()
}

/// Send a raw keep-alive `GET` and read until `expected` has arrived.
pub async fn raw_get(stream: &mut TcpStream, path: &str, expected: &str) -> String {
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !String::from_utf8_lossy(&received).contains(expected) {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("response in time")
            .unwrap();
        assert!(n > 0, "connection closed before the response completed");
        received.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&received).into_owned()
}

/// Read until the peer closes; fails if that takes longer than `within`.
pub async fn wait_for_close(stream: &mut TcpStream, within: Duration) {
    let mut rest = Vec::new();
    tokio::time::timeout(within, stream.read_to_end(&mut rest))
        .await
        .expect("server closed the connection in time")
        .ok();
}
