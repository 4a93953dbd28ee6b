//! systemd readiness notification.
//!
//! # Responsibilities
//! - Send a single sd_notify state on request (`echopilot systemd notify`)
//! - Follow a reload loop's status and report READY, RELOADING and STOPPING
//! - Keep the service watchdog fed while following, if systemd asked for it
//!
//! # Design Decisions
//! - Nothing is sent when `NOTIFY_SOCKET` is unset; sd_notify treats that as
//!   success
//! - READY is sent once per listener generation

use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use sd_notify::NotifyState;
use thiserror::Error;
use tokio::sync::watch;

use crate::lifecycle::state::{LifecycleState, LifecycleStatus};

/// Environment variable systemd sets for `Type=notify` units.
pub const NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";

/// States `echopilot systemd notify` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemdState {
    Ready,
    Stopping,
    Reloading,
    Watchdog,
}

impl SystemdState {
    fn as_notify(self) -> NotifyState<'static> {
        match self {
            SystemdState::Ready => NotifyState::Ready,
            SystemdState::Stopping => NotifyState::Stopping,
            SystemdState::Reloading => NotifyState::Reloading,
            SystemdState::Watchdog => NotifyState::Watchdog,
        }
    }
}

impl fmt::Display for SystemdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemdState::Ready => "ready",
            SystemdState::Stopping => "stopping",
            SystemdState::Reloading => "reloading",
            SystemdState::Watchdog => "watchdog",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("unknown systemd state {0:?} (expected ready, stopping, reloading or watchdog)")]
pub struct UnknownState(String);

impl FromStr for SystemdState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ready" => Ok(SystemdState::Ready),
            "stopping" => Ok(SystemdState::Stopping),
            "reloading" => Ok(SystemdState::Reloading),
            "watchdog" => Ok(SystemdState::Watchdog),
            _ => Err(UnknownState(s.to_string())),
        }
    }
}

/// Sends sd_notify messages to the service manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdNotifier {
    unset_env: bool,
}

impl SystemdNotifier {
    /// `unset_env` removes `NOTIFY_SOCKET` from the environment after each
    /// message, so child processes cannot reuse it.
    pub fn new(unset_env: bool) -> Self {
        Self { unset_env }
    }

    /// Whether this process runs under a service manager that listens.
    pub fn detect() -> bool {
        std::env::var_os(NOTIFY_SOCKET).is_some_and(|socket| !socket.is_empty())
    }

    pub fn notify(&self, state: SystemdState) -> io::Result<()> {
        sd_notify::notify(self.unset_env, &[state.as_notify()])
    }

    /// Report the states of one reload loop until its status channel closes.
    pub async fn follow(self, mut status: watch::Receiver<LifecycleStatus>) {
        let mut watchdog = watchdog_interval().map(tokio::time::interval);
        let mut ready_generation = 0;

        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let (state, generation) = {
                        let current = status.borrow_and_update();
                        (current.state, current.generation)
                    };
                    let message = match state {
                        LifecycleState::Serving if generation != ready_generation => {
                            ready_generation = generation;
                            SystemdState::Ready
                        }
                        LifecycleState::ReloadingDown => SystemdState::Reloading,
                        LifecycleState::Draining => SystemdState::Stopping,
                        _ => continue,
                    };
                    self.send(message);
                }
                _ = tick(&mut watchdog) => self.send(SystemdState::Watchdog),
            }
        }
    }

    fn send(&self, state: SystemdState) {
        match self.notify(state) {
            Ok(()) => tracing::debug!(%state, "Notified systemd"),
            Err(e) => tracing::warn!(%state, error = %e, "Failed to notify systemd"),
        }
    }
}

/// Half the watchdog timeout systemd configured, if any.
fn watchdog_interval() -> Option<Duration> {
    let mut usec = 0;
    if sd_notify::watchdog_enabled(false, &mut usec) && usec > 0 {
        Some(Duration::from_micros(usec) / 2)
    } else {
        None
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Protocol;
    use tokio::net::UnixDatagram;

    async fn next_message(socket: &UnixDatagram) -> String {
        let mut buf = [0u8; 256];
        let len = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    #[test]
    fn parses_states_case_insensitively() {
        assert_eq!("ready".parse::<SystemdState>().unwrap(), SystemdState::Ready);
        assert_eq!("RELOADING".parse::<SystemdState>().unwrap(), SystemdState::Reloading);
        assert_eq!("watchdog".parse::<SystemdState>().unwrap(), SystemdState::Watchdog);
        assert!("started".parse::<SystemdState>().is_err());
    }

    // The only test in the crate that touches NOTIFY_SOCKET.
    #[tokio::test]
    async fn reports_states_to_notify_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let socket = UnixDatagram::bind(&path).unwrap();
        std::env::set_var(NOTIFY_SOCKET, &path);
        assert!(SystemdNotifier::detect());

        let notifier = SystemdNotifier::new(false);
        notifier.notify(SystemdState::Stopping).unwrap();
        assert!(next_message(&socket).await.contains("STOPPING=1"));

        let (tx, rx) = watch::channel(LifecycleStatus::new(Protocol::Http));
        let following = tokio::spawn(notifier.follow(rx));

        tx.send_modify(|s| {
            s.state = LifecycleState::Serving;
            s.generation = 1;
        });
        assert!(next_message(&socket).await.contains("READY=1"));

        tx.send_modify(|s| s.state = LifecycleState::ReloadingDown);
        assert!(next_message(&socket).await.contains("RELOADING=1"));

        tx.send_modify(|s| {
            s.state = LifecycleState::Serving;
            s.generation = 2;
        });
        assert!(next_message(&socket).await.contains("READY=1"));

        tx.send_modify(|s| s.state = LifecycleState::Draining);
        assert!(next_message(&socket).await.contains("STOPPING=1"));

        drop(tx);
        following.await.unwrap();

        SystemdNotifier::new(true).notify(SystemdState::Ready).unwrap();
        assert!(next_message(&socket).await.contains("READY=1"));
        assert!(!SystemdNotifier::detect());
    }
}
