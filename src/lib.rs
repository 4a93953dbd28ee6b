//! echopilot library: reloadable listeners under signal control.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod rpc;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{OptionsProvider, ServerConfig};
pub use lifecycle::{ExitCode, LifecycleConfig, LifecycleError, SignaledServer};
pub use net::{ListenerFactory, ListenerOptions, Protocol, ServerHandle};
