//! HTTP listener setup.
//!
//! # Responsibilities
//! - Collect routes from registrants into one Axum Router
//! - Wire up middleware (tracing, request ID, timeout, body limit)
//! - Bind the listener, plaintext or TLS, and serve in the background
//! - Translate a stop request into an axum-server graceful shutdown
//!
//! # Design Decisions
//! - The router is built once; every listener generation serves a clone
//! - Binding happens before `start` returns so address conflicts surface as
//!   start errors
//! - TLS material is read per generation, so a reload picks up rotated certs

use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use axum_server::Handle;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::net::{ListenerError, ListenerFactory, ListenerOptions, Protocol, ServerHandle};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum request body size (64 KiB).
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// A set of routes that can be mounted on a listener.
pub trait Registrant: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Add this registrant's routes to `router`.
    fn register(&self, router: Router) -> Router;
}

/// Starts HTTP listeners serving the registered routes.
#[derive(Clone)]
pub struct HttpListenerFactory {
    protocol: Protocol,
    router: Router,
    request_timeout: Duration,
    body_limit: usize,
}

impl HttpListenerFactory {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            router: Router::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Mount the routes of `registrant`.
    pub fn register<R: Registrant>(mut self, registrant: R) -> Self {
        tracing::debug!(protocol = %self.protocol, registrant = registrant.name(), "Registering routes");
        self.router = registrant.register(self.router);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The router with all middleware layers applied.
    #[allow(deprecated)]
    pub fn app(&self) -> Router {
        self.router
            .clone()
            .layer(RequestBodyLimitLayer::new(self.body_limit))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request.headers().request_id(),
                )
            }))
            .layer(set_request_id_layer())
    }
}

#[async_trait]
impl ListenerFactory for HttpListenerFactory {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn start(&self, options: ListenerOptions) -> Result<ServerHandle, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            addr: options.addr.clone(),
            source,
        };

        let listener = TcpListener::bind(&options.addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        let listener = listener.into_std().map_err(bind_error)?;

        let handle = Handle::new();
        let app = self.app().into_make_service();

        let serving = match &options.tls {
            Some(material) => {
                let config = material.rustls_config().await.map_err(ListenerError::Tls)?;
                let server = axum_server::tls_rustls::from_tcp_rustls(listener, config)
                    .handle(handle.clone());
                tokio::spawn(async move { server.serve(app).await.map_err(ListenerError::Serve) })
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(async move { server.serve(app).await.map_err(ListenerError::Serve) })
            }
        };

        tracing::debug!(
            protocol = %self.protocol,
            address = %local_addr,
            tls = options.tls_enabled(),
            "Listener bound"
        );

        Ok(ServerHandle::new(self.protocol, local_addr, serving, move |grace| {
            handle.graceful_shutdown(Some(grace));
        }))
    }
}
