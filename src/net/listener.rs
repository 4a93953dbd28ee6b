//! Listener contract between the lifecycle manager and the transports.
//!
//! # Responsibilities
//! - Describe what a listener needs to start (address, optional TLS)
//! - Bind and launch a listener through a [`ListenerFactory`]
//! - Represent one running listener generation as a [`ServerHandle`]
//! - Bounded graceful shutdown; abandon the serve task on timeout
//!
//! # Design Decisions
//! - Factories bind before returning, so a bind failure is reported
//!   synchronously from `start` instead of from the background task
//! - The serve task is owned by the handle; it is never aborted by the core

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::net::tls::TlsMaterial;

/// Transport served by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain HTTP routes (web pages, health, and the JSON RPC endpoints).
    Http,
    /// A dedicated RPC listener.
    Rpc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Rpc => write!(f, "rpc"),
        }
    }
}

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS configuration was rejected by the listener.
    #[error("failed to configure TLS: {0}")]
    Tls(#[source] std::io::Error),

    /// The serve loop returned an I/O error.
    #[error("listener failed: {0}")]
    Serve(#[source] std::io::Error),

    /// The serve loop returned without being asked to stop.
    #[error("listener exited unexpectedly")]
    Exited,

    /// The serve task panicked or was cancelled.
    #[error("listener task aborted: {0}")]
    Aborted(String),
}

/// Everything a factory needs to start one listener generation.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// Bind address, e.g. `127.0.0.1:3000`.
    pub addr: String,
    /// TLS material when TLS is enabled, `None` for plaintext.
    pub tls: Option<TlsMaterial>,
}

impl ListenerOptions {
    pub fn plaintext(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            tls: None,
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// Produces bound, running listeners for one protocol.
#[async_trait]
pub trait ListenerFactory: Send + Sync + 'static {
    /// Protocol served by listeners from this factory.
    fn protocol(&self) -> Protocol;

    /// Bind `options.addr` and start serving in a background task.
    async fn start(&self, options: ListenerOptions) -> Result<ServerHandle, ListenerError>;
}

/// Graceful stop request handed to the listener implementation. Receives the
/// grace period after which remaining connections may be closed forcibly.
type StopFn = Box<dyn FnOnce(Duration) + Send>;

/// One running listener generation.
pub struct ServerHandle {
    protocol: Protocol,
    local_addr: SocketAddr,
    stop: Option<StopFn>,
    serving: JoinHandle<Result<(), ListenerError>>,
    finished: bool,
}

impl ServerHandle {
    /// Wrap a running serve task.
    ///
    /// `stop` must make the serve task return, within the grace period it is
    /// given where possible.
    pub fn new<F>(
        protocol: Protocol,
        local_addr: SocketAddr,
        serving: JoinHandle<Result<(), ListenerError>>,
        stop: F,
    ) -> Self
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        Self {
            protocol,
            local_addr,
            stop: Some(Box::new(stop)),
            serving,
            finished: false,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolve once the serve task exits on its own.
    ///
    /// Any exit that was not requested through [`ServerHandle::shutdown`] is a
    /// failure, including a clean `Ok(())` return. Cancel safe. Never resolves
    /// again once it has returned.
    pub async fn failed(&mut self) -> ListenerError {
        if self.finished {
            return std::future::pending().await;
        }

        let result = (&mut self.serving).await;
        self.finished = true;
        match result {
            Ok(Ok(())) => ListenerError::Exited,
            Ok(Err(e)) => e,
            Err(join_err) => ListenerError::Aborted(join_err.to_string()),
        }
    }

    /// Ask the listener to stop and wait up to `timeout` for the serve task.
    ///
    /// On timeout the task is detached and left to release its socket on its
    /// own. Returns how long the shutdown took.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<Duration, ShutdownTimeout> {
        let begin = Instant::now();

        if let Some(stop) = self.stop.take() {
            stop(timeout);
        }

        if self.finished {
            return Ok(begin.elapsed());
        }

        match tokio::time::timeout(timeout, &mut self.serving).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::debug!(
                    protocol = %self.protocol,
                    address = %self.local_addr,
                    error = %e,
                    "Listener returned an error while stopping"
                );
            }
            Ok(Err(join_err)) => {
                tracing::debug!(
                    protocol = %self.protocol,
                    address = %self.local_addr,
                    error = %join_err,
                    "Listener task aborted while stopping"
                );
            }
            Err(_) => {
                return Err(ShutdownTimeout {
                    protocol: self.protocol,
                    address: self.local_addr,
                    timeout,
                })
            }
        }

        Ok(begin.elapsed())
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("protocol", &self.protocol)
            .field("local_addr", &self.local_addr)
            .field("finished", &self.finished)
            .finish()
    }
}

/// A listener did not stop within its grace period and was abandoned.
#[derive(Debug, Clone, Error)]
#[error("{protocol} listener on {address} did not stop within {timeout:?}")]
pub struct ShutdownTimeout {
    pub protocol: Protocol,
    pub address: SocketAddr,
    pub timeout: Duration,
}
