//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to the two logical streams the lifecycle consumes:
//!   reload and terminate
//! - Stop delivery once shutdown begins
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Sources are injectable; [`ManualSignals`] drives the same streams from
//!   code, which is how tests simulate signals
//! - SIGHUP triggers a listener reload, not shutdown
//! - Reload is a broadcast so every protocol's reload loop sees it

use std::future::Future;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Reload notifications buffered per subscriber. Overflow collapses into a
/// single reload.
const RELOAD_BUFFER: usize = 4;

/// Terminate notifications buffered before the coordinator reads them.
pub(crate) const TERMINATE_BUFFER: usize = 4;

/// Fan-out handle for reload notifications.
#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    tx: broadcast::Sender<()>,
}

impl ReloadNotifier {
    /// Create a notifier and a first subscriber.
    pub fn channel() -> (Self, broadcast::Receiver<()>) {
        let (tx, rx) = broadcast::channel(RELOAD_BUFFER);
        (Self { tx }, rx)
    }

    /// Ask every subscribed reload loop to cycle its listener.
    pub fn notify(&self) {
        // No subscribers just means no listener is running yet.
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

/// Where a [`SignalSource`] delivers its notifications.
#[derive(Debug, Clone)]
pub struct SignalSink {
    reload: ReloadNotifier,
    terminate: mpsc::Sender<&'static str>,
}

impl SignalSink {
    pub fn new(reload: ReloadNotifier, terminate: mpsc::Sender<&'static str>) -> Self {
        Self { reload, terminate }
    }

    pub fn reload(&self, signal: &'static str) {
        tracing::debug!(signal, "Reload signal received");
        self.reload.notify();
    }

    /// Deliver a terminate notification. Never blocks; once the coordinator
    /// has stopped listening the notification is dropped.
    pub fn terminate(&self, signal: &'static str) {
        tracing::debug!(signal, "Terminate signal received");
        if self.terminate.try_send(signal).is_err() {
            tracing::debug!(signal, "Shutdown already in progress, ignoring signal");
        }
    }
}

/// A source of reload and terminate notifications.
pub trait SignalSource: Send + 'static {
    /// Set up delivery and return the forwarding task.
    ///
    /// Setup errors are returned synchronously. The returned future forwards
    /// notifications into `sink` until `stop` is cancelled.
    fn listen(
        self,
        sink: SignalSink,
        stop: CancellationToken,
    ) -> std::io::Result<impl Future<Output = ()> + Send + 'static>;
}

/// Process signals: SIGHUP reloads, SIGINT and SIGTERM terminate.
///
/// On platforms without SIGHUP only Ctrl-C is delivered and the reload stream
/// stays silent.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignals;

impl SignalSource for OsSignals {
    #[cfg(unix)]
    fn listen(
        self,
        sink: SignalSink,
        stop: CancellationToken,
    ) -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        Ok(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    Some(()) = interrupt.recv() => sink.terminate("SIGINT"),
                    Some(()) = terminate.recv() => sink.terminate("SIGTERM"),
                    Some(()) = hangup.recv() => sink.reload("SIGHUP"),
                }
            }
            tracing::debug!("Signal delivery stopped");
        })
    }

    #[cfg(not(unix))]
    fn listen(
        self,
        sink: SignalSink,
        stop: CancellationToken,
    ) -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
        Ok(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    res = tokio::signal::ctrl_c() => match res {
                        Ok(()) => sink.terminate("CTRL-C"),
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                            break;
                        }
                    },
                }
            }
            tracing::debug!("Signal delivery stopped");
        })
    }
}

/// A notification sent through a [`SignalTrigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlEvent {
    Reload,
    Terminate,
}

/// Signal source driven from code.
#[derive(Debug)]
pub struct ManualSignals {
    rx: mpsc::UnboundedReceiver<ControlEvent>,
}

/// Sends notifications into a [`ManualSignals`] source.
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl ManualSignals {
    pub fn new() -> (Self, SignalTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, SignalTrigger { tx })
    }
}

impl SignalTrigger {
    /// Returns `false` once delivery has stopped.
    pub fn reload(&self) -> bool {
        self.tx.send(ControlEvent::Reload).is_ok()
    }

    /// Returns `false` once delivery has stopped.
    pub fn terminate(&self) -> bool {
        self.tx.send(ControlEvent::Terminate).is_ok()
    }
}

impl SignalSource for ManualSignals {
    fn listen(
        mut self,
        sink: SignalSink,
        stop: CancellationToken,
    ) -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
        Ok(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    event = self.rx.recv() => match event {
                        Some(ControlEvent::Reload) => sink.reload("manual"),
                        Some(ControlEvent::Terminate) => sink.terminate("manual"),
                        None => break,
                    },
                }
            }
            tracing::debug!("Signal delivery stopped");
        })
    }
}
