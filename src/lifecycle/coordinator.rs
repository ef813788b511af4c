//! The lifecycle coordinator: one server run from bind to classified result.
//!
//! # State Machine
//! ```text
//! Starting ──▶ Running ──▶ StoppingGraceful ──▶ Stopped
//!    │            │
//!    │            └─ first of { runner stopped, termination requested }
//!    └─ signal handlers + listener runner started
//! ```
//! Shutdown is always performed, even when the runner stopped on its own,
//! so the listener is released exactly once before a result is returned.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::lifecycle::outcome::{LifecycleError, LifecycleResult, ServeOutcome, ShutdownOutcome};
use crate::lifecycle::shutdown::ShutdownSupervisor;
use crate::lifecycle::signals::{SignalWatcher, TerminationTrigger};
use crate::net::runner::ListenerRunner;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    StoppingGraceful,
    Stopped,
}

/// What ended the `Running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// A termination signal or manual trigger arrived first.
    Terminated,
    /// The runner stopped on its own first.
    ServeStopped,
}

/// Everything a finished run observed, alongside its result.
#[derive(Debug)]
pub struct LifecycleReport {
    pub cause: StopCause,
    /// Serve outcome at the moment the run stopped waiting.
    pub serve: ServeOutcome,
    pub shutdown: ShutdownOutcome,
    pub result: LifecycleResult,
}

/// Runs a request handler under the configured lifecycle.
pub struct Coordinator<H> {
    config: ServerConfig,
    handler: H,
    span: tracing::Span,
    trigger: TerminationTrigger,
    forced: CancellationToken,
    ready: watch::Sender<Option<SocketAddr>>,
    state: watch::Sender<LifecycleState>,
}

impl<H> Coordinator<H>
where
    H: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    H::Future: Send + 'static,
{
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let span = tracing::info_span!(
            "lifecycle",
            bind_address = %config.listener.bind_address
        );
        Self {
            config,
            handler,
            span,
            trigger: TerminationTrigger::new(),
            forced: CancellationToken::new(),
            ready: watch::channel(None).0,
            state: watch::channel(LifecycleState::Starting).0,
        }
    }

    /// Log every lifecycle event inside `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Handle for requesting termination without an OS signal.
    pub fn termination_trigger(&self) -> TerminationTrigger {
        self.trigger.clone()
    }

    /// Cancelled when a repeated signal asks for an immediate exit.
    ///
    /// The coordinator never exits the process; callers decide.
    pub fn forced_exit(&self) -> CancellationToken {
        self.forced.clone()
    }

    /// The bound listener address, `None` until binding succeeds.
    pub fn ready(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.ready.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Run to completion and return the classified result.
    pub async fn run(self) -> LifecycleResult {
        match self.run_with_report().await {
            Ok(report) => report.result,
            Err(e) => LifecycleResult::Error(e),
        }
    }

    /// Run to completion and return the full report.
    ///
    /// Fails without starting the listener if signal handlers cannot be
    /// installed.
    pub async fn run_with_report(self) -> Result<LifecycleReport, LifecycleError> {
        let span = self.span.clone();
        self.drive().instrument(span).await
    }

    async fn drive(self) -> Result<LifecycleReport, LifecycleError> {
        let Coordinator {
            config,
            handler,
            trigger,
            forced,
            ready,
            state,
            ..
        } = self;

        let watcher = SignalWatcher::install(
            &config.shutdown.signals,
            trigger,
            config.shutdown.force_on_repeat,
            forced,
        )
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to install signal handlers");
            state.send_replace(LifecycleState::Stopped);
            LifecycleError::Signals(e)
        })?;

        let mut runner = ListenerRunner::new(config.listener.clone(), config.timeouts.clone())
            .report_bound_to(ready)
            .spawn(handler);
        transition(&state, LifecycleState::Running);

        let (cause, serve) = tokio::select! {
            biased;
            serve = runner.terminated() => (StopCause::ServeStopped, serve),
            () = watcher.notified() => (StopCause::Terminated, runner.outcome()),
        };

        transition(&state, LifecycleState::StoppingGraceful);
        let shutdown = ShutdownSupervisor::new(config.shutdown.deadline)
            .shutdown(&mut runner)
            .await;
        watcher.revoke();

        let result = LifecycleResult::classify(&serve, &shutdown);
        transition(&state, LifecycleState::Stopped);

        match &result {
            LifecycleResult::Success => tracing::info!("Server shutdown completed successfully"),
            LifecycleResult::ShutdownTimedOut { deadline } => {
                tracing::error!(deadline = ?deadline, "Graceful shutdown timed out")
            }
            LifecycleResult::Error(e) => tracing::error!(error = %e, "Server stopped with error"),
        }

        Ok(LifecycleReport {
            cause,
            serve,
            shutdown,
            result,
        })
    }
}

fn transition(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let previous = state.send_replace(next);
    tracing::debug!(from = ?previous, to = ?next, "Lifecycle transition");
}

/// Serve `handler` with `config` until terminated, then shut down gracefully.
pub async fn run_server<H>(config: ServerConfig, handler: H) -> LifecycleResult
where
    H: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    H::Future: Send + 'static,
{
    Coordinator::new(config, handler).run().await
}
