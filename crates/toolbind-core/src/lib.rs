//! Core types and error definitions for the toolbind workspace.
//!
//! This crate provides the foundational types shared across all toolbind
//! crates: the unified error enum, the crate-wide result alias, and the
//! host configuration model consumed by the transport layer and the
//! client bridge.
//!
//! # Main types
//!
//! - [`Error`] — Unified error enum for all toolbind subsystems.
//! - [`Result`] — Convenience alias for `std::result::Result<T, Error>`.
//! - [`HostDescriptor`] — One configured remote tool host.
//! - [`HostsConfig`] — The parsed configuration document.

/// Host configuration model and TOML loading.
pub mod config;

pub use config::{HostDescriptor, HostTransport, HostsConfig};

// --- Error types ---

/// Top-level error type for the toolbind workspace.
///
/// Each variant corresponds to one failure class in the binding lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport channel could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation exceeded its timeout bound.
    #[error("Operation '{operation}' timed out after {ms}ms")]
    Timeout {
        /// The operation that was cancelled (e.g. `initialize`, `tools/call`).
        operation: String,
        /// The bound that was exceeded, in milliseconds.
        ms: u64,
    },

    /// A tool schema could not be translated into a type.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A remote tool call returned an error payload.
    #[error("Invocation error {code}: {message}")]
    Invocation {
        /// JSON-RPC error code reported by the host.
        code: i64,
        /// Human-readable message reported by the host.
        message: String,
        /// Optional structured error data from the host, carried verbatim.
        data: Option<serde_json::Value>,
    },

    /// A host name was unknown or a descriptor was malformed.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a [`Error::Timeout`] for the given operation and bound.
    pub fn timeout(operation: impl Into<String>, bound: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            ms: bound.as_millis() as u64,
        }
    }
}

/// A convenience `Result` alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
