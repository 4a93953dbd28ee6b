//! RPC services and clients.
//!
//! # Data Flow
//! ```text
//! EchoClient (reqwest, JSON)
//!     → POST /echo.v1.EchoService/<Method>
//!     → echo.rs (EchoService registrant on the HTTP listener)
//!     → JSON reply
//! ```

pub mod client;
pub mod echo;

pub use client::{ClientError, EchoClient};
pub use echo::EchoService;
