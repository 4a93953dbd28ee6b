//! Reload loop for one protocol.
//!
//! # Responsibilities
//! - Fetch listener options and start a listener generation
//! - Wait for reload, shutdown or listener failure
//! - Stop the current generation within a bounded time before starting the
//!   next one, so two generations never hold the same address
//! - Report fatal errors to the coordinator instead of panicking
//!
//! # Design Decisions
//! - Shutdown wins over reload: the done token is polled first and checked
//!   again before every start
//! - A failed option refresh reuses the previous options; only the very first
//!   start can fail on options
//! - A shutdown timeout is logged and the old listener abandoned; the loop
//!   never hangs on a stuck listener

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, OptionsProvider};
use crate::lifecycle::state::{LifecycleState, LifecycleStatus, ShutdownSignal};
use crate::lifecycle::{LifecycleConfig, LifecycleError};
use crate::net::{ListenerFactory, ListenerOptions, Protocol, ServerHandle};

/// Channels a reload loop shares with its coordinator.
#[derive(Debug)]
pub struct ManagerContext {
    reload: broadcast::Receiver<()>,
    done: CancellationToken,
    errors: mpsc::Sender<LifecycleError>,
}

impl ManagerContext {
    pub fn new(
        reload: broadcast::Receiver<()>,
        done: CancellationToken,
        errors: mpsc::Sender<LifecycleError>,
    ) -> Self {
        Self {
            reload,
            done,
            errors,
        }
    }
}

/// Runs listeners from one factory across reload cycles.
pub struct LifecycleManager<F, O> {
    factory: F,
    options: O,
    config: LifecycleConfig,
    context: ManagerContext,
    status: watch::Sender<LifecycleStatus>,
}

impl<F, O> LifecycleManager<F, O>
where
    F: ListenerFactory,
    O: OptionsProvider,
{
    pub fn new(
        factory: F,
        options: O,
        config: LifecycleConfig,
        context: ManagerContext,
    ) -> (Self, watch::Receiver<LifecycleStatus>) {
        let (status, status_rx) = watch::channel(LifecycleStatus::new(factory.protocol()));
        let manager = Self {
            factory,
            options,
            config,
            context,
            status,
        };
        (manager, status_rx)
    }

    fn protocol(&self) -> Protocol {
        self.factory.protocol()
    }

    /// Serve until shutdown or a fatal error. Completion is signalled by the
    /// task running this future finishing.
    pub async fn serve_with_reload(mut self) {
        let protocol = self.protocol();
        let mut previous: Option<ListenerOptions> = None;
        let mut generation: u64 = 0;

        loop {
            if self.context.done.is_cancelled() {
                tracing::debug!(%protocol, "Shutdown requested, not starting a new listener");
                break;
            }
            self.set_state(LifecycleState::Starting, None);

            let options = match self.resolve_options(previous.as_ref()) {
                Ok(options) => options,
                Err(source) => {
                    tracing::warn!(%protocol, error = %source, "No usable listener options");
                    self.report_fatal(LifecycleError::Options { protocol, source });
                    break;
                }
            };
            previous = Some(options.clone());

            let tls = options.tls_enabled();
            let addr = options.addr.clone();
            let mut handle = match self.factory.start(options).await {
                Ok(handle) => handle,
                Err(source) => {
                    tracing::warn!(%protocol, address = %addr, error = %source, "Failed to start listener");
                    self.report_fatal(LifecycleError::Listener { protocol, source });
                    break;
                }
            };

            generation += 1;
            let local_addr = handle.local_addr();
            tracing::info!(
                %protocol,
                address = %local_addr,
                tls,
                generation,
                "Listener serving"
            );
            self.status.send_modify(|status| {
                status.state = LifecycleState::Serving;
                status.generation = generation;
                status.local_addr = Some(local_addr);
            });

            let signal = tokio::select! {
                biased;
                _ = self.context.done.cancelled() => ShutdownSignal::Terminate,
                source = handle.failed() => {
                    ShutdownSignal::Fatal(LifecycleError::Listener { protocol, source })
                }
                _ = next_reload(&mut self.context.reload) => ShutdownSignal::Reload,
            };

            match signal {
                ShutdownSignal::Reload => {
                    tracing::info!(%protocol, address = %local_addr, "Reload requested, restarting listener");
                    self.set_state(LifecycleState::ReloadingDown, Some(local_addr));
                    self.halt(handle).await;
                    self.set_state(LifecycleState::ReloadingUp, None);
                }
                ShutdownSignal::Terminate => {
                    tracing::info!(%protocol, address = %local_addr, "Listener shutting down");
                    self.set_state(LifecycleState::Draining, Some(local_addr));
                    self.halt(handle).await;
                    break;
                }
                ShutdownSignal::Fatal(err) => {
                    tracing::warn!(error = %err, "Listener terminated unexpectedly");
                    self.set_state(LifecycleState::Draining, Some(local_addr));
                    self.report_fatal(err);
                    self.halt(handle).await;
                    break;
                }
            }
        }

        self.set_state(LifecycleState::Stopped, None);
        tracing::debug!(%protocol, generations = generation, "Reload loop stopped");
    }

    /// Options for the next generation. A failed refresh falls back to the
    /// previous generation's options, or to the provider's cached snapshot.
    fn resolve_options(&self, previous: Option<&ListenerOptions>) -> Result<ListenerOptions, ConfigError> {
        match self.fetch_options(true) {
            Ok(options) => Ok(options),
            Err(e) => {
                tracing::warn!(
                    protocol = %self.protocol(),
                    error = %e,
                    "Failed to refresh server options, continuing with previous settings"
                );
                match previous {
                    Some(previous) => Ok(previous.clone()),
                    None => self.fetch_options(false),
                }
            }
        }
    }

    fn fetch_options(&self, refresh: bool) -> Result<ListenerOptions, ConfigError> {
        let addr = self.options.addr(refresh)?;
        let tls = if self.options.tls_enabled(false)? {
            Some(self.options.tls_config(false)?.ok_or(ConfigError::MissingTls)?)
        } else {
            None
        };
        Ok(ListenerOptions { addr, tls })
    }

    /// Bounded graceful stop of one generation. Never fails.
    async fn halt(&self, handle: ServerHandle) {
        let protocol = handle.protocol();
        let address = handle.local_addr();
        let begin = Instant::now();
        tracing::debug!(%protocol, %address, "Halting listener");

        match handle.shutdown(self.config.shutdown_timeout).await {
            Ok(elapsed) => {
                tracing::debug!(%protocol, %address, elapsed = ?elapsed, "Listener halted");
            }
            Err(timeout) => {
                tracing::warn!(
                    error = %timeout,
                    elapsed = ?begin.elapsed(),
                    "Failed to gracefully shut down listener, abandoning it"
                );
            }
        }
    }

    fn report_fatal(&self, err: LifecycleError) {
        if let Err(e) = self.context.errors.try_send(err) {
            tracing::debug!(error = %e, "Fatal error not delivered, coordinator already stopping");
        }
    }

    fn set_state(&self, state: LifecycleState, local_addr: Option<std::net::SocketAddr>) {
        self.status.send_modify(|status| {
            status.state = state;
            status.local_addr = local_addr;
        });
    }
}

/// Wait for the next reload notification. Lagging counts as a reload; a
/// closed channel never reloads again.
async fn next_reload(reload: &mut broadcast::Receiver<()>) {
    loop {
        match reload.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
