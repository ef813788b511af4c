//! The listener runner: binds, serves until told to stop, reports how it ended.
//!
//! # Data Flow
//! ```text
//! ListenerRunner::spawn
//!     → accept task: bind → publish address → accept loop
//!         → one tracked task per connection (connection.rs)
//!             → one tracked task per request handler
//!     → RunnerHandle (outcome watch, stop token, connection and request trackers)
//! ```
//!
//! The accept task owns the listener. It drops it before publishing a
//! terminal [`ServeOutcome`], so a terminal outcome always means the port
//! is closed.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::Service;

use crate::config::{ListenerConfig, TimeoutConfig};
use crate::lifecycle::outcome::{ServeError, ServeOutcome, ShutdownError};
use crate::net::connection::{serve_connection, ConnectionSettings};
use crate::net::listener::Listener;

/// Builder for one serving run.
pub struct ListenerRunner {
    listener: ListenerConfig,
    timeouts: TimeoutConfig,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl ListenerRunner {
    pub fn new(listener: ListenerConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            listener,
            timeouts,
            bound: watch::channel(None).0,
        }
    }

    /// Publish the bound address on `bound` instead of a private channel.
    pub fn report_bound_to(mut self, bound: watch::Sender<Option<SocketAddr>>) -> Self {
        self.bound = bound;
        self
    }

    /// Start serving `handler` on a new task.
    ///
    /// Binding happens on that task; a bind failure is reported through the
    /// handle as `ServeOutcome::Failed`, never returned here.
    pub fn spawn<H>(self, handler: H) -> RunnerHandle
    where
        H: Service<Request<Body>, Response = Response, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        H::Future: Send + 'static,
    {
        let (outcome_tx, outcome_rx) = watch::channel(ServeOutcome::Running);
        let stop = CancellationToken::new();
        let connections = TaskTracker::new();
        let requests = TaskTracker::new();
        let bound = self.bound.subscribe();

        let task = tokio::spawn(run(
            self,
            handler,
            stop.clone(),
            Trackers {
                connections: connections.clone(),
                requests: requests.clone(),
            },
            outcome_tx,
        ));

        RunnerHandle {
            outcome: outcome_rx,
            bound,
            stop,
            connections,
            requests,
            abort: task.abort_handle(),
            task: Some(task),
        }
    }
}

#[derive(Clone)]
struct Trackers {
    connections: TaskTracker,
    requests: TaskTracker,
}

async fn run<H>(
    runner: ListenerRunner,
    handler: H,
    stop: CancellationToken,
    trackers: Trackers,
    outcome: watch::Sender<ServeOutcome>,
) where
    H: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    H::Future: Send + 'static,
{
    let result = match Listener::bind(&runner.listener).await {
        Ok(listener) => {
            runner.bound.send_replace(Some(listener.local_addr()));
            let settings = Arc::new(ConnectionSettings::new(&runner.timeouts));
            accept_loop(&listener, &handler, &settings, &stop, &trackers).await
        }
        Err(e) => {
            tracing::error!(error = %e, "Listener failed to start");
            e.into()
        }
    };

    match &result {
        ServeOutcome::Failed(e) => tracing::error!(error = %e, "Server error"),
        _ => tracing::info!("Listener closed"),
    }
    outcome.send_replace(result);
}

async fn accept_loop<H>(
    listener: &Listener,
    handler: &H,
    settings: &Arc<ConnectionSettings>,
    stop: &CancellationToken,
    trackers: &Trackers,
) -> ServeOutcome
where
    H: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    H::Future: Send + 'static,
{
    loop {
        let accepted = tokio::select! {
            biased;
            () = stop.cancelled() => return ServeOutcome::ClosedNormally,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer, permit)) => {
                trackers.connections.spawn(serve_connection(
                    stream,
                    peer,
                    handler.clone(),
                    Arc::clone(settings),
                    stop.clone(),
                    trackers.requests.clone(),
                    permit,
                ));
            }
            Err(e) => return ServeOutcome::Failed(Arc::new(e)),
        }
    }
}

/// Control over a running listener.
///
/// Owned by whoever started the run; the shutdown supervisor borrows it to
/// stop the listener.
pub struct RunnerHandle {
    outcome: watch::Receiver<ServeOutcome>,
    bound: watch::Receiver<Option<SocketAddr>>,
    stop: CancellationToken,
    connections: TaskTracker,
    requests: TaskTracker,
    task: Option<JoinHandle<()>>,
    abort: AbortHandle,
}

impl RunnerHandle {
    /// Wait until the runner reports a terminal outcome.
    pub async fn terminated(&mut self) -> ServeOutcome {
        match self.outcome.wait_for(ServeOutcome::is_terminal).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => ServeError::Aborted.into(),
        }
    }

    /// Latest reported outcome, `Running` until the listener stops.
    pub fn outcome(&self) -> ServeOutcome {
        self.outcome.borrow().clone()
    }

    /// The bound address, once binding succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.borrow()
    }

    /// Number of connections still being served.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Number of request handlers still running, including those whose
    /// response already went out as a write timeout.
    pub fn active_requests(&self) -> usize {
        self.requests.len()
    }

    /// Stop accepting and ask every connection to finish. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the accept task, every connection and every request handler
    /// to finish.
    ///
    /// Call after [`RunnerHandle::stop`]. Connections and handlers are always
    /// waited for, even when the accept task failed.
    pub async fn drain(&mut self) -> Result<(), ShutdownError> {
        let accept = match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        };

        self.connections.close();
        self.connections.wait().await;
        self.requests.close();
        self.requests.wait().await;

        accept.map_err(ShutdownError::from)
    }

    /// Cancel the accept task, releasing the listener without waiting.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
