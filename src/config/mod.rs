//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! flags (clap) + environment (ECHOPILOT_*) + config file (JSON)
//!     → loader.rs (layer: flags > env > file > defaults)
//!     → validation.rs (semantic checks)
//!     → StaticConfig (+ TLS material)
//!     → server.rs (ArcSwap snapshot, OptionsProvider)
//!
//! On reload:
//!     lifecycle asks for the address with refresh = true
//!     → loader.rs re-reads env and file
//!     → atomic swap of the snapshot
//!     → on error the previous snapshot stays in place
//! ```
//!
//! # Design Decisions
//! - Flags are captured once; env and file are re-read on every refresh
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod server;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{PartialConfig, StaticConfig};
pub use server::{OptionsProvider, ServerConfig};
pub use watcher::ConfigWatcher;
