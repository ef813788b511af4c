//! Per-connection serving and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Drive one HTTP/1.1 or HTTP/2 connection with the request handler
//! - Apply read, write and idle timeouts
//! - Run each request handler as a tracked task
//! - Drain the connection gracefully when the server stops

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceExt};

use crate::config::TimeoutConfig;
use crate::net::listener::ConnectionPermit;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Protocol settings shared by every connection of one listener.
#[derive(Clone)]
pub(crate) struct ConnectionSettings {
    builder: auto::Builder<TokioExecutor>,
    write_timeout: Duration,
    idle_timeout: Duration,
}

impl ConnectionSettings {
    pub(crate) fn new(timeouts: &TimeoutConfig) -> Self {
        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.read);
        builder.http2().timer(TokioTimer::new());

        Self {
            builder,
            write_timeout: timeouts.write,
            idle_timeout: timeouts.idle,
        }
    }
}

/// Request activity on one connection, used to detect idleness.
struct Activity {
    epoch: Instant,
    /// Milliseconds since `epoch` at the last request start or finish.
    last_active_ms: AtomicU64,
    in_flight: AtomicUsize,
    quiet: Notify,
}

impl Activity {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_active_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            quiet: Notify::new(),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_active_ms.fetch_max(elapsed, Ordering::AcqRel);
    }

    fn last_active(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_active_ms.load(Ordering::Acquire))
    }

    fn begin(self: &Arc<Self>) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        RequestGuard {
            activity: Arc::clone(self),
        }
    }

    /// Completes once no request has been in flight for `timeout`.
    async fn idle_for(&self, timeout: Duration) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) > 0 {
                self.quiet.notified().await;
                continue;
            }
            let deadline = self.last_active() + timeout;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// Marks one request as in flight until dropped.
struct RequestGuard {
    activity: Arc<Activity>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.activity.touch();
        if self.activity.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.activity.quiet.notify_one();
        }
    }
}

/// Serve one accepted connection until it closes.
///
/// When `stop` is cancelled, or the connection has been idle for the idle
/// timeout, the connection is asked to finish in-flight requests and close.
///
/// Each request's handler runs as its own task on `requests`. A handler that
/// misses the write timeout gets a 503 sent in its place but keeps running,
/// and stays on `requests` until it returns.
pub(crate) async fn serve_connection<H>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: H,
    settings: Arc<ConnectionSettings>,
    stop: CancellationToken,
    requests: TaskTracker,
    _permit: ConnectionPermit,
) where
    H: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    H::Future: Send + 'static,
{
    let id = ConnectionId::new();
    let activity = Arc::new(Activity::new());
    let write_timeout = settings.write_timeout;

    let service = {
        let activity = Arc::clone(&activity);
        hyper::service::service_fn(move |request: Request<Incoming>| {
            let guard = activity.begin();
            let call = handler.clone().oneshot(request.map(Body::new));
            let mut running = requests.spawn(async move {
                let _guard = guard;
                call.await
            });
            async move {
                match tokio::time::timeout(write_timeout, &mut running).await {
                    Ok(Ok(Ok(response))) => Ok::<_, Infallible>(response),
                    Ok(Ok(Err(never))) => match never {},
                    Ok(Err(e)) => {
                        tracing::error!(connection_id = %id, error = %e, "Request handler failed");
                        Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                    }
                    Err(_) => {
                        tracing::warn!(
                            connection_id = %id,
                            timeout = ?write_timeout,
                            "Response not ready before write timeout"
                        );
                        Ok(StatusCode::SERVICE_UNAVAILABLE.into_response())
                    }
                }
            }
        })
    };

    tracing::trace!(connection_id = %id, peer_addr = %peer, "Connection opened");

    let conn = settings
        .builder
        .serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %id, error = %e, "Connection error");
                }
                break;
            }
            () = stop.cancelled(), if !draining => {
                tracing::trace!(connection_id = %id, "Draining connection");
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
            () = activity.idle_for(settings.idle_timeout), if !draining => {
                tracing::debug!(connection_id = %id, "Closing idle connection");
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
        }
    }

    tracing::trace!(connection_id = %id, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_waits_for_in_flight_requests() {
        let activity = Arc::new(Activity::new());
        let guard = activity.begin();

        let idle = tokio::spawn({
            let activity = Arc::clone(&activity);
            async move { activity.idle_for(Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!idle.is_finished(), "a request is still in flight");

        drop(guard);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!idle.is_finished(), "idle period restarts when the request ends");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(idle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_without_requests() {
        let activity = Activity::new();
        let started = Instant::now();
        activity.idle_for(Duration::from_secs(3)).await;
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
