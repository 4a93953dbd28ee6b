//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use echopilot::config::{ConfigError, OptionsProvider};
use echopilot::lifecycle::{LifecycleConfig, LifecycleStatus};
use echopilot::net::{ListenerError, ListenerFactory, ListenerOptions, Protocol, ServerHandle, TlsMaterial};

#[derive(Default)]
struct FactoryState {
    active: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    overlaps: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    fail_after_start: AtomicBool,
    hang_on_shutdown: AtomicBool,
}

/// In-memory listener factory that records every generation.
///
/// A start on an address that is still held by a previous generation counts
/// as an overlap.
#[derive(Clone)]
pub struct MockFactory {
    protocol: Protocol,
    state: Arc<FactoryState>,
}

impl MockFactory {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: Arc::default(),
        }
    }

    /// Every subsequent start fails with a bind error.
    pub fn fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Listeners started from now on exit with an error right away.
    pub fn fail_after_start(&self, fail: bool) {
        self.state.fail_after_start.store(fail, Ordering::SeqCst);
    }

    /// Listeners started from now on ignore stop requests.
    pub fn hang_on_shutdown(&self, hang: bool) {
        self.state.hang_on_shutdown.store(hang, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.state.started.lock().unwrap().len()
    }

    pub fn started(&self) -> Vec<String> {
        self.state.started.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn overlaps(&self) -> usize {
        self.state.overlaps.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.state.active.lock().unwrap().len()
    }
}

#[async_trait]
impl ListenerFactory for MockFactory {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn start(&self, options: ListenerOptions) -> Result<ServerHandle, ListenerError> {
        let state = Arc::clone(&self.state);
        if state.fail_start.load(Ordering::SeqCst) {
            return Err(ListenerError::Bind {
                addr: options.addr,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }

        let addr = options.addr.clone();
        if !state.active.lock().unwrap().insert(addr.clone()) {
            state.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        state.started.lock().unwrap().push(addr.clone());

        let crash = state.fail_after_start.load(Ordering::SeqCst);
        let hang = state.hang_on_shutdown.load(Ordering::SeqCst);
        let stop = CancellationToken::new();

        let serving = {
            let stop = stop.clone();
            let state = Arc::clone(&state);
            let addr = addr.clone();
            tokio::spawn(async move {
                let result = if crash {
                    Err(ListenerError::Serve(std::io::Error::other("listener crashed")))
                } else {
                    stop.cancelled().await;
                    Ok(())
                };
                state.active.lock().unwrap().remove(&addr);
                state.stops.fetch_add(1, Ordering::SeqCst);
                result
            })
        };

        let local_addr = addr
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)));

        Ok(ServerHandle::new(self.protocol, local_addr, serving, move |_grace| {
            if !hang {
                stop.cancel();
            }
        }))
    }
}

struct OptionsState {
    addr: Mutex<String>,
    fail_refresh: AtomicBool,
    refreshes: AtomicUsize,
}

/// Options provider whose address can be switched between generations.
#[derive(Clone)]
pub struct MockOptions {
    state: Arc<OptionsState>,
}

impl MockOptions {
    pub fn new(addr: &str) -> Self {
        Self {
            state: Arc::new(OptionsState {
                addr: Mutex::new(addr.to_string()),
                fail_refresh: AtomicBool::new(false),
                refreshes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_addr(&self, addr: &str) {
        *self.state.addr.lock().unwrap() = addr.to_string();
    }

    /// Refreshing fetches fail while set; cached reads still succeed.
    pub fn fail_refresh(&self, fail: bool) {
        self.state.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }
}

impl OptionsProvider for MockOptions {
    fn addr(&self, refresh: bool) -> Result<String, ConfigError> {
        if refresh {
            self.state.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.state.fail_refresh.load(Ordering::SeqCst) {
                return Err(ConfigError::MissingTls);
            }
        }
        Ok(self.state.addr.lock().unwrap().clone())
    }

    fn tls_config(&self, _refresh: bool) -> Result<Option<TlsMaterial>, ConfigError> {
        Ok(None)
    }

    fn tls_enabled(&self, _refresh: bool) -> Result<bool, ConfigError> {
        Ok(false)
    }
}

/// Short timeouts so degraded paths finish quickly.
pub fn fast_config() -> LifecycleConfig {
    LifecycleConfig {
        shutdown_timeout: Duration::from_millis(200),
        ..LifecycleConfig::default()
    }
}

/// Wait until `status` satisfies `pred`, failing the test after 5s.
pub async fn wait_for_status<F>(status: &mut tokio::sync::watch::Receiver<LifecycleStatus>, pred: F)
where
    F: FnMut(&LifecycleStatus) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(pred))
        .await
        .expect("status condition within 5s")
        .expect("status channel open");
}
