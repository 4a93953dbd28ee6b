//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events through tracing)
//!     → http::server TraceLayer (request spans tagged with x-request-id)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all request spans
//! - Lifecycle transitions at info, degradations at warn, fatal causes at error

pub mod logging;
