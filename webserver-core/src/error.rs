//! Error types for the webserver configuration engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type returned by every vhost operation
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration text
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// A dotted directive path did not match anything
    #[error("given key {0} not found")]
    KeyNotFound(String),

    /// An intermediate path segment matched more than one directive
    #[error("multiple directives found for {0}")]
    AmbiguousKey(String),

    /// An intermediate path segment matched a directive without a block
    #[error("directive {0} has no block")]
    NotABlock(String),

    /// Insertion anchor missing from the target block
    #[error("after directive {0} not found")]
    AnchorNotFound(String),

    /// Include resolution failure (missing path, cycle, depth)
    #[error("Include error: {0}")]
    Include(String),

    /// Too many records for a reserved fragment range
    #[error("{kind} rules exceed limit of {limit}")]
    Capacity { kind: &'static str, limit: usize },

    /// Caller supplied an unusable value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown backend discriminator
    #[error("unsupported server type: {0}")]
    UnsupportedServerType(String),

    /// Engine configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
