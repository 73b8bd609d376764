//! Error types for dblog
//!
//! Encoding and decoding problems with individual records are not errors
//! here: the codec recovers from them locally. What remains are
//! configuration mistakes, store failures and malformed keys.

use dblog_store::StoreError;
use thiserror::Error;

use crate::key::OrderedKey;

/// Errors building or parsing an [`OrderedKey`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KeyError {
    /// The scaled timestamp does not fit in 64 bits (or is not finite)
    #[error("timestamp {0} is outside the representable key range")]
    TimestampOutOfRange(f64),

    /// Raw key bytes of the wrong length
    #[error("ordered key must be 16 bytes, got {0}")]
    InvalidLength(usize),

    /// Hex text that does not describe a key
    #[error("invalid hex key: {0}")]
    InvalidHex(String),
}

/// Errors interpolating positional arguments into a message template
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpolateError {
    #[error("template expects more than {given} argument(s)")]
    MissingArgument { given: usize },

    #[error("template uses {used} argument(s) but {given} were given")]
    UnusedArguments { used: usize, given: usize },

    #[error("unmatched '{brace}' at byte {position}")]
    UnmatchedBrace { brace: char, position: usize },
}

/// Configuration errors, raised immediately and never retried
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no store configured; a [store] section is required")]
    MissingStore,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors returned by the writer
#[derive(Debug, Error)]
pub enum WriteError {
    /// The store rejected the put; nothing was written
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No usable key could be generated
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// A diagnostic payload was written in place of the record and the
    /// failure policy says the logging path can no longer be trusted
    #[error("logging failed, diagnostic stored under {key}:\n{diagnostic}")]
    Fatal { key: OrderedKey, diagnostic: String },
}

/// Errors surfaced by a query stream
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

/// Errors parsing user supplied timestamps
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("invalid timestamp {0:?}: expected YYYY-MM-DDTHH:MM:SS.ffffffZ or a prefix of it")]
    Invalid(String),

    #[error("timestamp {0:?} does not name a real point in time")]
    OutOfRange(String),
}

/// Errors installing the process subscriber
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to open log file: {0}")]
    File(#[from] tracing_appender::rolling::InitError),

    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let err: WriteError = StoreError::unavailable("down").into();
        assert!(matches!(err, WriteError::Store(_)));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_key_error_display() {
        let err = KeyError::InvalidLength(3);
        assert_eq!(err.to_string(), "ordered key must be 16 bytes, got 3");
    }
}
