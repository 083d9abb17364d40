//! # Symdex Utilities
//!
//! Shared utilities and logging setup for Symdex.
//!
//! The library crate `symdex-core` only emits `tracing` events; binaries call
//! into this crate once at startup to install a subscriber.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
