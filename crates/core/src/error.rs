//! Core error types.

use thiserror::Error;

/// Errors produced by the core types.
#[derive(Debug, Error)]
pub enum Error {
    /// The LOC record text did not match the RFC 1876 presentation grammar.
    #[error("invalid LOC record: {0}")]
    InvalidLoc(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
