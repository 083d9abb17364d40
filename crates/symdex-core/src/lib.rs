//! # symdex-core
//!
//! DWARF debug-information reader and symbol indexer for Symdex.
//!
//! This crate turns the debug sections of an object file into a queryable
//! symbol model, including:
//! - Lazy, one-shot section loading through an object-file collaborator
//! - Unit discovery and per-unit DIE forests
//! - Split DWARF: skeleton units backed by `.dwo` files or a `.dwp` package
//! - Type, variable and function resolution with identity-preserving caches
//! - Name lookup by exact name or regex, from accelerator tables or a scan
//! - Address and source-line lookups
//!
//! ## Entry point
//!
//! [`SymbolFile`] owns everything derived from one module. It is `Send` and
//! `Sync`; concurrent queries share every cache.
//!
//! ## Errors
//!
//! Queries return [`Result`]. Problems that a query recovers from (a missing
//! companion file, a truncated unit, a circular type) are recorded in the
//! module's [`DiagnosticLog`](error::DiagnosticLog) instead of failing it.

pub mod config;
pub mod dwarf;
pub mod error;
pub mod external;
pub mod index;
pub mod prelude;
pub mod resolve;
pub mod symbol_file;
pub mod types;

pub use config::SymbolFileOptions;
// Re-export commonly used types
pub use error::{Result, SymbolError};
pub use symbol_file::{SymbolFile, SymbolFileBuilder};
pub use types::{Address, DieRef, UserId};
