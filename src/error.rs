//! Error types for JailScope.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to run a command on a host. Callers treat every variant alike;
/// the variant only shapes the message.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{host}: {message}")]
    Connection { host: String, message: String },

    #[error("{host}: command timed out after {seconds}s")]
    Timeout { host: String, seconds: u64 },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt data in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A push or registration payload that cannot be accepted.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Malformed {what}: {source}")]
    Malformed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
