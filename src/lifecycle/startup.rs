//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Install signal handlers
//! - Optionally watch the config file for changes
//! - Report readiness to systemd when run as a notify unit
//! - Build the HTTP listener with all registrants and hand it to the
//!   coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and maps to exit code 1
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigWatcher, OptionsProvider, PartialConfig, ServerConfig};
use crate::http::server::{DEFAULT_BODY_LIMIT, DEFAULT_REQUEST_TIMEOUT};
use crate::http::{HttpListenerFactory, MemoryRoutes, WebRoutes};
use crate::lifecycle::coordinator::SignaledServer;
use crate::lifecycle::notify::SystemdNotifier;
use crate::lifecycle::signals::OsSignals;
use crate::lifecycle::state::ExitCode;
use crate::lifecycle::LifecycleConfig;
use crate::net::Protocol;
use crate::rpc::EchoService;

/// Options for `echopilot serve` beyond the configuration layers.
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Reload when the config file changes.
    pub watch: bool,
    /// Tell systemd about readiness, reloads and shutdown.
    pub sd_notify: bool,
    pub request_timeout: Duration,
    pub body_limit: usize,
    pub lifecycle: LifecycleConfig,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            watch: false,
            sd_notify: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            body_limit: DEFAULT_BODY_LIMIT,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// The HTTP listener with every registrant mounted.
pub fn http_factory(options: &StartupOptions) -> HttpListenerFactory {
    HttpListenerFactory::new(Protocol::Http)
        .with_request_timeout(options.request_timeout)
        .with_body_limit(options.body_limit)
        .register(WebRoutes)
        .register(MemoryRoutes::default())
        .register(EchoService)
}

/// Run the server until a terminate signal or a fatal error.
pub async fn run_server(flags: PartialConfig, options: StartupOptions) -> ExitCode {
    let config = match ServerConfig::new(flags) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load server configuration");
            return ExitCode::Failure;
        }
    };

    let server = match SignaledServer::new(OsSignals, options.lifecycle.clone()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start signal handling");
            return ExitCode::Failure;
        }
    };

    // Dropping the watcher stops it, so it lives until the server is done.
    let _watcher = if options.watch {
        watch_config_file(&config, &server)
    } else {
        None
    };

    let factory = http_factory(&options);

    if let Ok(addr) = config.addr(false) {
        tracing::info!(address = %addr, version = env!("CARGO_PKG_VERSION"), "echopilot starting");
    }

    let status = server.serve_with_reload(factory, config);
    if options.sd_notify && SystemdNotifier::detect() {
        tokio::spawn(SystemdNotifier::new(false).follow(status));
    }
    server.wait().await
}

fn watch_config_file(config: &ServerConfig, server: &SignaledServer) -> Option<notify::RecommendedWatcher> {
    let snapshot = config.snapshot();
    let Some(path) = snapshot.settings.config_file.as_deref() else {
        tracing::warn!("--watch given but no config file is in use, not watching");
        return None;
    };

    match ConfigWatcher::new(path, server.reload_notifier()).run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Failed to watch config file, reload with SIGHUP instead");
            None
        }
    }
}
