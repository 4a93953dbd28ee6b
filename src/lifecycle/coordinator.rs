//! Signal-driven server coordinator.
//!
//! # Responsibilities
//! - Own the shared done token, reload fan-out and fatal error channel
//! - Start one reload loop per protocol
//! - Decide the exit code from the first of: terminate signal, fatal error,
//!   explicit [`SignaledServer::shutdown`]
//! - Wait for every loop and the signal forwarder before reporting completion
//!
//! # Design Decisions
//! - The exit code is set exactly once; later causes are ignored
//! - Completion is idempotent: any number of callers may wait or shut down
//! - Background tasks live on the [`Shutdown`] tracker so completion cannot be
//!   reported while one is still running

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::OptionsProvider;
use crate::lifecycle::manager::{LifecycleManager, ManagerContext};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{ReloadNotifier, SignalSink, SignalSource, TERMINATE_BUFFER};
use crate::lifecycle::state::{ExitCode, LifecycleStatus, ShutdownSignal};
use crate::lifecycle::{LifecycleConfig, LifecycleError};
use crate::net::ListenerFactory;

/// Receivers owned by the supervisor task.
struct Control {
    terminate: mpsc::Receiver<&'static str>,
    errors: mpsc::Receiver<LifecycleError>,
}

struct Inner {
    config: LifecycleConfig,
    shutdown: Shutdown,
    reload: ReloadNotifier,
    errors: mpsc::Sender<LifecycleError>,
    exit_code: Arc<OnceLock<ExitCode>>,
    completed: AtomicBool,
}

/// Runs listeners under signal control. Cheap to clone.
#[derive(Clone)]
pub struct SignaledServer {
    inner: Arc<Inner>,
}

impl SignaledServer {
    /// Install `signals` and start supervising terminate signals and fatal
    /// errors.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new<S: SignalSource>(signals: S, config: LifecycleConfig) -> Result<Self, LifecycleError> {
        let (reload, _) = ReloadNotifier::channel();
        let (terminate_tx, terminate) = mpsc::channel(TERMINATE_BUFFER);
        let (errors, errors_rx) = mpsc::channel(config.error_buffer.max(1));
        let shutdown = Shutdown::new();
        let exit_code = Arc::new(OnceLock::new());

        let forward = signals
            .listen(SignalSink::new(reload.clone(), terminate_tx), shutdown.subscribe())
            .map_err(LifecycleError::Signals)?;
        shutdown.spawn(forward);

        let control = Control {
            terminate,
            errors: errors_rx,
        };
        shutdown.spawn(supervise(control, shutdown.clone(), Arc::clone(&exit_code)));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                shutdown,
                reload,
                errors,
                exit_code,
                completed: AtomicBool::new(false),
            }),
        })
    }

    /// Handle for requesting reloads without an OS signal.
    pub fn reload_notifier(&self) -> ReloadNotifier {
        self.inner.reload.clone()
    }

    /// Start a reload loop for `factory` in the background.
    ///
    /// The returned receiver tracks the loop's state and listener generation.
    pub fn serve_with_reload<F, O>(&self, factory: F, options: O) -> watch::Receiver<LifecycleStatus>
    where
        F: ListenerFactory,
        O: OptionsProvider,
    {
        let context = ManagerContext::new(
            self.inner.reload.subscribe(),
            self.inner.shutdown.subscribe(),
            self.inner.errors.clone(),
        );
        let (manager, status) =
            LifecycleManager::new(factory, options, self.inner.config.clone(), context);
        self.inner.shutdown.spawn(manager.serve_with_reload());
        status
    }

    /// Serve `factory` and wait for the process outcome.
    pub async fn blocking_run<F, O>(&self, factory: F, options: O) -> ExitCode
    where
        F: ListenerFactory,
        O: OptionsProvider,
    {
        self.serve_with_reload(factory, options);
        self.wait().await
    }

    /// [`blocking_run`](Self::blocking_run) on a spawned task.
    pub fn run<F, O>(&self, factory: F, options: O) -> JoinHandle<ExitCode>
    where
        F: ListenerFactory,
        O: OptionsProvider,
    {
        let server = self.clone();
        tokio::spawn(async move { server.blocking_run(factory, options).await })
    }

    /// Wait for a terminate signal, a fatal error or [`shutdown`](Self::shutdown),
    /// then wait for everything to stop and return the exit code.
    ///
    /// Cancel safe: the outcome is decided by a background supervisor, so a
    /// dropped `wait` loses nothing.
    pub async fn wait(&self) -> ExitCode {
        self.inner.shutdown.triggered().await;
        self.finish(ExitCode::Success).await
    }

    /// Stop every reload loop and wait for them. Idempotent; returns the exit
    /// code decided by whichever cause came first.
    pub async fn shutdown(&self) -> ExitCode {
        self.finish(ExitCode::Success).await
    }

    /// Exit code, once decided.
    pub fn exit_code(&self) -> Option<ExitCode> {
        self.inner.exit_code.get().copied()
    }

    /// Background tasks (reload loops and signal forwarder) still running.
    pub fn outstanding_tasks(&self) -> usize {
        self.inner.shutdown.outstanding()
    }

    async fn finish(&self, code: ExitCode) -> ExitCode {
        decide(&self.inner.exit_code, code);
        self.inner.shutdown.trigger();
        self.inner.shutdown.wait().await;

        if !self.inner.completed.swap(true, Ordering::SeqCst) {
            tracing::info!("All waits done, server stopped");
        }
        self.exit_code().unwrap_or(code)
    }
}

/// Record the exit code if no earlier cause has.
fn decide(exit_code: &OnceLock<ExitCode>, code: ExitCode) {
    if exit_code.set(code).is_ok() {
        tracing::info!(exit_code = code.code(), "Shutting down server");
    }
}

/// Turn the first terminate signal or fatal error into an exit code and
/// trigger shutdown. Returns without deciding if shutdown is triggered first.
async fn supervise(mut control: Control, shutdown: Shutdown, exit_code: Arc<OnceLock<ExitCode>>) {
    let signal = tokio::select! {
        biased;
        Some(signal) = control.terminate.recv() => {
            tracing::info!(signal, "Interrupt/kill received, shutting down");
            ShutdownSignal::Terminate
        }
        Some(err) = control.errors.recv() => {
            tracing::error!(error = %err, "Server error, shutting down");
            ShutdownSignal::Fatal(err)
        }
        _ = shutdown.triggered() => return,
    };

    decide(&exit_code, signal.exit_code());
    shutdown.trigger();
}
