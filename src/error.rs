//! Error types for the PDF engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Ordinary absence
//! inside the byte scanner is expressed with `Option` instead and never reaches
//! this type; errors are reserved for the failures callers must act on.

use crate::object::ObjectId;
use std::time::Duration;

/// Result type alias for PDF engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure classes, used to decide how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A construct did not start with its expected token.
    MalformedSyntax,
    /// A required key is missing, a `/Type` mismatches or a `/Length` lies.
    StructuralViolation,
    /// Unsupported filter, predictor or encryption version.
    FormatUnsupported,
    /// The caller asked the writer to produce an inconsistent file.
    ReferenceIntegrity,
    /// A bounded resource (worker pool) was not available in time.
    ResourceExhaustion,
    /// Underlying I/O or serialization failure.
    Io,
}

/// Error types that can occur during PDF processing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference section
    #[error("Invalid cross-reference section at byte {offset}: {reason}")]
    InvalidXref {
        /// Offset of the section
        offset: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Referenced object not found in the reference data
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// A required dictionary key is absent or unreadable
    #[error("Missing required key {key} in {object}")]
    MissingKey {
        /// Key name including the leading slash
        key: String,
        /// Kind of dictionary being parsed
        object: String,
    },

    /// Stream `/Length` disagrees with the payload found in the file
    #[error("Stream length mismatch: /Length {declared}, payload {actual} bytes")]
    LengthMismatch {
        /// Value of the `/Length` key
        declared: usize,
        /// Length of the payload actually present before `endstream`
        actual: usize,
    },

    /// Unexpected end of data
    #[error("End of data reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (DTO) serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Unsupported predictor value in `/DecodeParms`
    #[error("Unsupported predictor: {0}")]
    UnsupportedPredictor(i64),

    /// Failure reported by an injected data cryptor
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The edit session would produce a corrupt file
    #[error("Reference integrity violation: {0}")]
    ReferenceIntegrity(String),

    /// No worker became available before the acquisition deadline
    #[error("Worker pool saturated: no worker available after {0:?}")]
    PoolTimeout(Duration),

    /// A worker went away while holding a request
    #[error("Worker failure: {0}")]
    Worker(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectId),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

impl Error {
    /// Shorthand for a structural missing-key failure.
    pub(crate) fn missing_key(key: &str, object: &str) -> Self {
        Error::MissingKey {
            key: key.to_string(),
            object: object.to_string(),
        }
    }

    /// Shorthand for a malformed-syntax failure at `offset`.
    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidHeader(_) | Error::ParseError { .. } | Error::UnexpectedEof => {
                ErrorCategory::MalformedSyntax
            },
            Error::InvalidXref { .. }
            | Error::ObjectNotFound(..)
            | Error::InvalidObjectType { .. }
            | Error::MissingKey { .. }
            | Error::LengthMismatch { .. }
            | Error::InvalidPdf(_)
            | Error::Decode(_)
            | Error::CircularReference(_)
            | Error::RecursionLimitExceeded(_) => ErrorCategory::StructuralViolation,
            Error::Unsupported(_)
            | Error::UnsupportedFilter(_)
            | Error::UnsupportedPredictor(_)
            | Error::Encryption(_) => ErrorCategory::FormatUnsupported,
            Error::ReferenceIntegrity(_) => ErrorCategory::ReferenceIntegrity,
            Error::PoolTimeout(_) | Error::Worker(_) => ErrorCategory::ResourceExhaustion,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PoolTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = Error::parse(1234, "invalid token");
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
        assert_eq!(err.category(), ErrorCategory::MalformedSyntax);
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        assert!(format!("{}", err).contains("10 0 R"));
    }

    #[test]
    fn test_length_mismatch_is_structural() {
        let err = Error::LengthMismatch {
            declared: 10,
            actual: 12,
        };
        assert_eq!(err.category(), ErrorCategory::StructuralViolation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = Error::PoolTimeout(Duration::from_millis(50));
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::ResourceExhaustion);
    }

    #[test]
    fn test_missing_key_message() {
        let err = Error::missing_key("/Pages", "Catalog");
        let msg = format!("{}", err);
        assert!(msg.contains("/Pages"));
        assert!(msg.contains("Catalog"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
