//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the configured termination signals
//! - Turn the first occurrence (or a manual trigger) into one notification
//! - Optionally escalate a repeated signal into a forced-exit request
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The notification is a cancellation token, so duplicates are no-ops
//! - The watcher task is aborted when revoked or dropped

use std::future::Future;
use std::io;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A process-termination signal the watcher can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationSignal {
    /// SIGHUP
    Hangup,
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
}

impl TerminationSignal {
    pub const ALL: [TerminationSignal; 4] = [
        TerminationSignal::Hangup,
        TerminationSignal::Interrupt,
        TerminationSignal::Terminate,
        TerminationSignal::Quit,
    ];

    /// Conventional signal name, for logs.
    pub fn name(self) -> &'static str {
        match self {
            TerminationSignal::Hangup => "SIGHUP",
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Quit => "SIGQUIT",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            TerminationSignal::Hangup => SignalKind::hangup(),
            TerminationSignal::Interrupt => SignalKind::interrupt(),
            TerminationSignal::Terminate => SignalKind::terminate(),
            TerminationSignal::Quit => SignalKind::quit(),
        }
    }
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A request that the server stop, from any source.
///
/// Cloning shares the same request. Firing more than once has no further effect.
#[derive(Debug, Clone, Default)]
pub struct TerminationTrigger {
    token: CancellationToken,
}

impl TerminationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination.
    pub fn fire(&self) {
        self.token.cancel();
    }

    /// Whether termination has been requested.
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once termination has been requested.
    pub fn fired(&self) -> impl Future<Output = ()> + Send + '_ {
        self.token.cancelled()
    }
}

/// The registered signal streams.
#[cfg(unix)]
struct SignalSet {
    streams: Vec<(TerminationSignal, tokio::signal::unix::Signal)>,
}

#[cfg(unix)]
impl SignalSet {
    fn register(kinds: &[TerminationSignal]) -> io::Result<Self> {
        let mut streams = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if streams.iter().any(|(k, _)| *k == kind) {
                continue;
            }
            streams.push((kind, tokio::signal::unix::signal(kind.kind())?));
        }
        Ok(Self { streams })
    }

    /// Wait for the next occurrence of any registered signal.
    async fn recv(&mut self) -> TerminationSignal {
        use std::task::Poll;

        std::future::poll_fn(|cx| {
            for (kind, stream) in self.streams.iter_mut() {
                if let Poll::Ready(Some(())) = stream.poll_recv(cx) {
                    return Poll::Ready(*kind);
                }
            }
            Poll::Pending
        })
        .await
    }
}

#[cfg(not(unix))]
struct SignalSet {
    ctrl_c: bool,
}

#[cfg(not(unix))]
impl SignalSet {
    fn register(kinds: &[TerminationSignal]) -> io::Result<Self> {
        for kind in kinds {
            if *kind != TerminationSignal::Interrupt {
                tracing::warn!(signal = %kind, "Signal not observable on this platform");
            }
        }
        Ok(Self {
            ctrl_c: kinds.contains(&TerminationSignal::Interrupt),
        })
    }

    async fn recv(&mut self) -> TerminationSignal {
        if self.ctrl_c && tokio::signal::ctrl_c().await.is_ok() {
            return TerminationSignal::Interrupt;
        }
        std::future::pending().await
    }
}

/// Watches for termination signals for the duration of one run.
pub struct SignalWatcher {
    trigger: TerminationTrigger,
    task: JoinHandle<()>,
}

impl SignalWatcher {
    /// Register handlers for `kinds` and start watching.
    ///
    /// The first signal fires `trigger`. When `force_on_repeat` is set, a
    /// signal arriving after termination was requested cancels `forced`.
    pub fn install(
        kinds: &[TerminationSignal],
        trigger: TerminationTrigger,
        force_on_repeat: bool,
        forced: CancellationToken,
    ) -> io::Result<Self> {
        let mut signals = SignalSet::register(kinds)?;

        let task = tokio::spawn({
            let trigger = trigger.clone();
            async move {
                tokio::select! {
                    signal = signals.recv() => {
                        tracing::info!(%signal, "Shutdown signal received");
                        trigger.fire();
                    }
                    () = trigger.fired() => {
                        tracing::info!("Shutdown requested");
                    }
                }

                if !force_on_repeat {
                    return;
                }
                let signal = signals.recv().await;
                tracing::warn!(%signal, "Repeated signal received, requesting forced exit");
                forced.cancel();
            }
        });

        tracing::debug!(signals = ?kinds, "Signal watcher installed");

        Ok(Self { trigger, task })
    }

    /// Completes on the first termination request.
    pub async fn notified(&self) {
        self.trigger.fired().await;
    }

    /// Stop observing signals.
    pub fn revoke(self) {
        self.task.abort();
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
