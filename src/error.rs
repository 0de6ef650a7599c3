//! Request-time error taxonomy.
//!
//! Callers are forced to handle "unsafe input" distinctly from throttling
//! and from internal failure.  Error messages carry field names and risk
//! levels, never the offending text — detailed diagnostics (matched rule
//! ids, offending substrings) go to internal logs only.

use thiserror::Error;

use crate::input::classifier::RiskLevel;
use crate::prompt::template::TemplateError;
use crate::service::CompletionError;

/// Errors surfaced by [`Guard`](crate::guard::Guard) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GuardError {
    /// The client key's request window is at capacity.  A throttling
    /// signal, not retried internally.
    #[error("rate limit exceeded for client '{client_key}'")]
    RateLimitExceeded {
        /// The throttled client key.
        client_key: String,
    },

    /// The classifier marked a field HIGH or CRITICAL.  The offending text
    /// must not be forwarded to the model; the decision is final for this
    /// request.
    #[error("unsafe input detected in field '{field}' ({level} risk)")]
    UnsafeInput {
        /// Name of the rejected field (never its content).
        field: String,
        /// The assessed risk level.
        level: RiskLevel,
    },

    /// A template referenced a slot absent from the provided values — a
    /// caller defect, not an end-user-triggerable condition.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The external completion service is unreachable, unauthenticated, or
    /// failing.
    #[error("completion service unavailable: {reason}")]
    Upstream {
        /// Human-readable reason, for internal logs only.
        reason: String,
    },
}

impl From<CompletionError> for GuardError {
    fn from(err: CompletionError) -> Self {
        Self::Upstream {
            reason: err.to_string(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_input_message_names_field_not_content() {
        let err = GuardError::UnsafeInput {
            field: "query".into(),
            level: RiskLevel::Critical,
        };
        let msg = err.to_string();
        assert!(msg.contains("query"));
        assert!(msg.contains("critical"));
    }

    #[test]
    fn completion_error_maps_to_upstream() {
        let err: GuardError = CompletionError::NotConfigured.into();
        assert!(matches!(err, GuardError::Upstream { .. }));
    }

    #[test]
    fn template_error_is_transparent() {
        let err: GuardError = TemplateError::MissingSlot { name: "query".into() }.into();
        assert_eq!(err.to_string(), "template references missing slot: 'query'");
    }
}
