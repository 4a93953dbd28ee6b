//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server)
//!     → request.rs (add request ID)
//!     → server.rs (trace, timeout, body limit)
//!     → routes.rs (web pages, health, status)
//!     → memory.rs (saved strings)
//!     → rpc::echo (JSON RPC endpoints)
//!     → Send to client
//! ```

pub mod memory;
pub mod request;
pub mod routes;
pub mod server;

pub use memory::{MemoryRoutes, MemoryStore};
pub use request::{RequestIdExt, RequestUuid, X_REQUEST_ID};
pub use routes::WebRoutes;
pub use server::{HttpListenerFactory, Registrant};
