//! The `error` module defines the error types used within the `envsub`
//! application.
//!
//! - `RegistryError`: a connection could not be admitted to the registry.
//! - `SourceError`: a background producer's collaborator failed to fetch.
//! - `ServerError`: process-level failures surfaced to the binary.

use thiserror::Error;

/// Errors returned by registry operations that the caller must decide on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A live connection already uses the client-supplied identifier.
    #[error("connection id already in use: {0}")]
    DuplicateIdentifier(String),

    /// The registry holds its maximum number of live connections.
    #[error("registry is full (max: {max} connections)")]
    RegistryFull { max: usize },

    /// The registry has been shut down and admits nothing further.
    #[error("registry is closed")]
    Closed,
}

/// Errors reported by an `UpdateSource` when polling its upstream service.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Process-level failures surfaced from the server entry points.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
