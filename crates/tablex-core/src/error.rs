//! Error types for the table extraction pipeline.
//!
//! Two families of errors exist with deliberately different blast radii:
//!
//! - [`ExtractError`] is the document-level error returned by the
//!   orchestrator. Only a document that cannot be processed at all
//!   ([`ExtractError::DocumentFailure`]) or an explicit cancellation
//!   surfaces here; everything else in the pipeline degrades to
//!   lower-confidence or excluded output instead of failing.
//! - [`ClassifyError`] is internal to the classifier adapter. Backends
//!   report timeouts, malformed responses, or rate limiting through it;
//!   after the retry bound the adapter converts the failure into a
//!   fail-closed non-table verdict, so a `ClassifyError` never escapes
//!   to the caller.

use thiserror::Error;

/// Errors surfaced by document-level extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The external parser could not produce layout primitives for the
    /// document. This is the only fatal, surfaced failure mode: no
    /// result is returned for the document.
    #[error("document failure: {reason}")]
    DocumentFailure {
        /// Description of why the document could not be read.
        reason: String,
    },

    /// Extraction was cancelled before completion. Partial results are
    /// never returned for a cancelled document.
    #[error("extraction cancelled")]
    Cancelled,

    /// The extraction configuration is invalid (user error, fixable).
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of what is invalid in the configuration.
        reason: String,
    },

    /// The pattern store could not be read or written. The orchestrator
    /// catches this internally and degrades to a no-learning, no-prior
    /// mode; it is public so store constructors can report load errors.
    #[error("pattern store unavailable: {reason}")]
    StoreUnavailable {
        /// Description of the store failure.
        reason: String,
    },

    /// Underlying I/O error (pattern store persistence, layout files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure modes of a single classifier call.
///
/// All variants are retryable; the adapter retries up to its configured
/// bound with exponential backoff before falling back to a non-table
/// verdict for the region.
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The backend did not respond within the per-call timeout.
    #[error("classifier call timed out")]
    Timeout,

    /// The backend responded with something that could not be parsed
    /// into a verdict.
    #[error("malformed classifier response: {reason}")]
    Malformed {
        /// What was wrong with the response.
        reason: String,
    },

    /// The backend signalled rate limiting / backoff.
    #[error("classifier rate limited")]
    RateLimited,

    /// Transport-level failure reaching the backend.
    #[error("classifier transport error: {reason}")]
    Transport {
        /// Description of the transport failure.
        reason: String,
    },
}

/// Type alias for `Result` with [`ExtractError`].
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_failure_display() {
        let err = ExtractError::DocumentFailure {
            reason: "no layout primitives".to_string(),
        };
        assert_eq!(err.to_string(), "document failure: no layout primitives");
    }

    #[test]
    fn classify_error_display() {
        assert_eq!(
            ClassifyError::Timeout.to_string(),
            "classifier call timed out"
        );
        let err = ClassifyError::Malformed {
            reason: "not JSON".to_string(),
        };
        assert!(err.to_string().contains("not JSON"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ExtractError = io.into();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
