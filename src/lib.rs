//! MetaClean Server Library
//!
//! Inspects and strips embedded file metadata behind a small HTTP API.
//! The server binary lives in main.rs; everything it wires together is
//! exposed here so integration tests can build the router directly.
//!
//! # Modules
//!
//! - `artifact`: Per-request temporary files and their guaranteed cleanup
//! - `dispatch`: Worker process pool that runs the metadata engine
//! - `engine`: Format-specific metadata parsers (PDF, PNG, JPEG, ZIP, text)
//! - `routes`: HTTP handlers for `/show/`, `/clean/` and `/healthz`

pub mod artifact;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod routes;
pub mod sanitize;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
