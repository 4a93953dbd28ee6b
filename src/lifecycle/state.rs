//! Lifecycle states, shutdown causes and exit codes.

use std::fmt;
use std::net::SocketAddr;

use crate::lifecycle::LifecycleError;
use crate::net::Protocol;

/// Where a reload loop is in its cycle.
///
/// ```text
/// Starting → Serving ─ reload ──→ ReloadingDown → ReloadingUp → Starting
///               │
///               └─ terminate / failure → Draining → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    ReloadingDown,
    ReloadingUp,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::ReloadingDown => "reloading-down",
            LifecycleState::ReloadingUp => "reloading-up",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Observable status of one reload loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStatus {
    pub protocol: Protocol,
    pub state: LifecycleState,
    /// Listener generation, incremented each time a listener is started.
    pub generation: u64,
    /// Address of the current listener while one is bound.
    pub local_addr: Option<SocketAddr>,
}

impl LifecycleStatus {
    pub(crate) fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: LifecycleState::Starting,
            generation: 0,
            local_addr: None,
        }
    }
}

/// Event that ends a serving period.
#[derive(Debug)]
pub enum ShutdownSignal {
    /// Cycle the listener with refreshed options.
    Reload,
    /// Clean shutdown requested.
    Terminate,
    /// A listener or its setup failed.
    Fatal(LifecycleError),
}

impl ShutdownSignal {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ShutdownSignal::Fatal(_) => ExitCode::Failure,
            ShutdownSignal::Reload | ShutdownSignal::Terminate => ExitCode::Success,
        }
    }
}

/// Process exit status reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Clean, interrupt driven shutdown.
    Success,
    /// Fatal startup or runtime error.
    Failure,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ListenerError;

    #[test]
    fn exit_codes() {
        assert_eq!(ShutdownSignal::Terminate.exit_code().code(), 0);
        assert_eq!(ShutdownSignal::Reload.exit_code().code(), 0);

        let fatal = ShutdownSignal::Fatal(LifecycleError::Listener {
            protocol: Protocol::Http,
            source: ListenerError::Exited,
        });
        assert_eq!(fatal.exit_code().code(), 1);
    }

    #[test]
    fn state_names() {
        assert_eq!(LifecycleState::ReloadingDown.to_string(), "reloading-down");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }
}
