use std::time::Duration;

use thiserror::Error;

/// Custom error type for Dramatis operations.
#[derive(Debug, Error)]
pub enum DramatisError {
    /// Verifier output could not be parsed, or its length did not match the batch.
    #[error("Malformed verifier response: {reason}")]
    MalformedVerifierResponse { reason: String },

    /// Verifier did not answer within the per-attempt timeout.
    #[error("Verifier timed out after {attempts} attempt(s) ({timeout:?} each)")]
    VerifierTimeout { attempts: u32, timeout: Duration },

    /// Verifier transport failed (process spawn, broken pipe, provider error).
    #[error("Verifier transport error: {0}")]
    Transport(String),

    /// Extraction of a single chunk failed.
    #[error("Extraction error in chunk {chunk}: {message}")]
    Extraction { chunk: usize, message: String },

    /// An internal invariant did not hold.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration was unreadable or out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DramatisError {
    /// Whether another attempt at the same verifier call may succeed.
    ///
    /// Timeouts and transport failures are transient; a malformed response
    /// is treated as a property of the batch and is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DramatisError::VerifierTimeout { .. } | DramatisError::Transport(_)
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DramatisError::MalformedVerifierResponse {
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for DramatisError {
    fn from(err: toml::de::Error) -> Self {
        DramatisError::Config(format!("TOML parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DramatisError::Transport("broken pipe".into()).is_retryable());
        assert!(DramatisError::VerifierTimeout {
            attempts: 3,
            timeout: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(!DramatisError::malformed("not json").is_retryable());
        assert!(!DramatisError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = DramatisError::malformed("expected 2 verdicts, got 1");
        assert_eq!(
            err.to_string(),
            "Malformed verifier response: expected 2 verdicts, got 1"
        );

        let err = DramatisError::Extraction {
            chunk: 4,
            message: "provider refused".into(),
        };
        assert!(err.to_string().contains("chunk 4"));
    }
}
