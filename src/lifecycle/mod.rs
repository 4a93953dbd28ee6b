//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Install signals → Start reload loops → Wait
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → terminate stream → coordinator exits 0
//!     SIGHUP → reload stream → every reload loop cycles its listener
//!
//! Reload loop (manager.rs), one per protocol:
//!     Fetch options → Start listener → Wait for reload / done / failure
//!     → Stop within timeout → repeat or exit
//!
//! Coordinator (coordinator.rs):
//!     Supervisor task: first of terminate / fatal error / shutdown() decides
//!     the exit code → cancel done → wait for all tracked tasks (shutdown.rs)
//!
//! systemd (notify.rs):
//!     Reload loop status → READY / RELOADING / STOPPING on NOTIFY_SOCKET
//! ```
//!
//! # Design Decisions
//! - A single done token ends every loop; triggering it is idempotent
//! - Listener stop has a timeout: a stuck listener is abandoned, not awaited
//! - Shutdown wins over a concurrent reload

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::{ListenerError, Protocol};

pub mod coordinator;
pub mod manager;
pub mod notify;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use coordinator::SignaledServer;
pub use manager::{LifecycleManager, ManagerContext};
pub use notify::{SystemdNotifier, SystemdState};
pub use shutdown::Shutdown;
pub use signals::{ManualSignals, OsSignals, ReloadNotifier, SignalSink, SignalSource, SignalTrigger};
pub use state::{ExitCode, LifecycleState, LifecycleStatus, ShutdownSignal};

/// Fatal lifecycle failures. Each one ends the process with exit code 1.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("{protocol} listener options unavailable: {source}")]
    Options {
        protocol: Protocol,
        #[source]
        source: ConfigError,
    },

    #[error("{protocol} listener failed: {source}")]
    Listener {
        protocol: Protocol,
        #[source]
        source: ListenerError,
    },
}

/// Tunables for the coordinator and its reload loops.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Upper bound on stopping one listener generation.
    pub shutdown_timeout: Duration,
    /// Fatal errors buffered before the coordinator reads them.
    pub error_buffer: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
            error_buffer: 8,
        }
    }
}
