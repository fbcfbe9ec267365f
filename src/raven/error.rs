use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Structural problems with a callback response.
///
/// Raised by the parser before any cryptography runs, and by the validator
/// when a successful response carries no principal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("Incorrect number of response fields, expecting {expected} but got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Malformed '{field}' field: {value:?}")]
    MalformedField { field: &'static str, value: String },

    #[error("Malformed issue timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("Signature was malformed")]
    MalformedSignature,

    #[error("Successful response carries no principal")]
    MissingPrincipal,
}

/// Signing key resolution and loading failures.
///
/// These mean the gate cannot authenticate anyone, so they are never turned
/// into a client rejection.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("No signing keys configured")]
    NoKeys,

    #[error("Test mode is enabled but no test keys are available")]
    TestKeysUnavailable,

    #[error("Failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material for kid '{kid}': {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("Signature verification unavailable: {0}")]
    Crypto(String),
}

/// Every way a callback response can fail to yield an identity.
#[derive(Debug, thiserror::Error)]
pub enum RavenError {
    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("Response URL {actual:?} does not match request URL {expected:?}")]
    Url { expected: String, actual: String },

    #[error("Response issued at {issued_at} is outside the {tolerance_secs}s tolerance (now {now})")]
    Timestamp {
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
        tolerance_secs: u64,
    },

    #[error("Signature verification failed for kid '{kid}'")]
    Signature { kid: String },

    #[error("Authentication failed with status {status}")]
    Authentication {
        status: u16,
        message: Option<String>,
    },

    #[error("User cancelled authentication")]
    UserCancelled,

    #[error(transparent)]
    Config(#[from] KeyError),
}

impl RavenError {
    /// Short, stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RavenError::Response(_) => "response",
            RavenError::Url { .. } => "url",
            RavenError::Timestamp { .. } => "timestamp",
            RavenError::Signature { .. } => "signature",
            RavenError::Authentication { .. } => "authentication",
            RavenError::UserCancelled => "user_cancelled",
            RavenError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_count_display() {
        let error = ResponseError::FieldCount {
            expected: 14,
            actual: 3,
        };
        assert_eq!(
            error.to_string(),
            "Incorrect number of response fields, expecting 14 but got 3"
        );
    }

    #[test]
    fn test_response_error_is_transparent() {
        let error = RavenError::from(ResponseError::MalformedSignature);
        assert_eq!(error.to_string(), "Signature was malformed");
        assert_eq!(error.kind(), "response");
    }

    #[test]
    fn test_cancel_and_failure_have_distinct_kinds() {
        let cancelled = RavenError::UserCancelled;
        let failed = RavenError::Authentication {
            status: 520,
            message: None,
        };
        assert_ne!(cancelled.kind(), failed.kind());
    }
}
