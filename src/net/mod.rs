//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerOptions (address + optional TLS material)
//!     → ListenerFactory::start (bind, spawn serve task)
//!     → ServerHandle (one running generation)
//!     → failed() / shutdown(timeout)
//! ```
//!
//! # Design Decisions
//! - Transports are opaque to the lifecycle; it only sees the handle
//! - TLS is optional and handled transparently by the factory
//! - Certificates are re-read on every refresh so rotation needs only a reload

pub mod listener;
pub mod tls;

pub use listener::{
    ListenerError, ListenerFactory, ListenerOptions, Protocol, ServerHandle, ShutdownTimeout,
};
pub use tls::{TlsError, TlsMaterial};
