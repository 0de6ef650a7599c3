//! The completion-service seam and structured analysis results.
//!
//! The core consumes exactly one external collaborator: a text-completion
//! service invoked with a fixed system instruction plus a rendered prompt.
//! Call lifecycle concerns (retries, timeouts, backoff) belong to the
//! implementor; this module only defines the seam, the structured
//! [`AnalysisReport`], and the fixed fallback used when the service is
//! unavailable so the user-facing contract never breaks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ── CompletionError ────────────────────────────────────────────────────

/// Errors surfaced by a [`CompletionService`] implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompletionError {
    /// No completion backend is configured.
    #[error("completion service is not configured")]
    NotConfigured,
    /// The completion request failed (network, auth, upstream error).
    #[error("completion request failed: {reason}")]
    RequestFailed {
        /// Human-readable reason, for internal logs only.
        reason: String,
    },
}

// ── CompletionService ──────────────────────────────────────────────────

/// A text-completion backend.
///
/// Implementations receive the fixed system instruction and the rendered,
/// template-bound prompt; they must never be handed raw user text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce a completion for `prompt` under `system_instruction`.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError`] when the backend is unconfigured or the
    /// request fails.
    async fn complete(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, CompletionError>;
}

// ── AnalysisReport ─────────────────────────────────────────────────────

/// Structured result of a medication-safety analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Free-text safety analysis.
    pub analysis: String,
    /// Overall risk label as reported by the model (Low/Medium/High/
    /// Critical/Unknown).
    pub risk_level: String,
    /// Actionable recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Alternative medications, if any.
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Key warnings, if any.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Referenced veterinary sources.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// The fixed report returned whenever the completion service is
/// unavailable.  Generic by design — upstream failure must never surface
/// to the end user as a raw error.
#[must_use]
pub fn fallback_report() -> AnalysisReport {
    AnalysisReport {
        analysis: "AI analysis is currently unavailable. Please consult with your \
                   veterinarian for medication safety advice."
            .to_owned(),
        risk_level: "Unknown".to_owned(),
        recommendations: vec![
            "Consult with your veterinarian".to_owned(),
            "Monitor your pet for adverse reactions".to_owned(),
            "Keep detailed medication records".to_owned(),
        ],
        alternatives: Vec::new(),
        warnings: vec!["Professional veterinary guidance recommended".to_owned()],
        sources: Vec::new(),
    }
}

// ── Report parsing ─────────────────────────────────────────────────────

/// Strip markdown code fences wrapping a reply.
///
/// Models frequently fence JSON replies in ```` ```json ```` blocks; the
/// fences are transport framing, removed before scrubbing and parsing.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let mut cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse a (scrubbed) model reply into an [`AnalysisReport`].
///
/// A reply that starts with `{` is parsed as JSON; anything else is wrapped
/// verbatim as the analysis text with a conservative Medium label.  A reply
/// that looks like JSON but does not parse yields a generic
/// consult-your-veterinarian report.
#[must_use]
pub fn parse_report(reply: &str) -> AnalysisReport {
    let cleaned = strip_code_fences(reply);

    if cleaned.starts_with('{') {
        match serde_json::from_str::<AnalysisReport>(cleaned) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "analysis reply was not valid report JSON");
                AnalysisReport {
                    analysis: "Unable to parse the analysis response. Please consult with \
                               your veterinarian for medication safety advice."
                        .to_owned(),
                    risk_level: "Unknown".to_owned(),
                    recommendations: vec!["Please consult with your veterinarian".to_owned()],
                    alternatives: Vec::new(),
                    warnings: vec!["Unable to parse AI response properly".to_owned()],
                    sources: Vec::new(),
                }
            }
        }
    } else {
        AnalysisReport {
            analysis: cleaned.to_owned(),
            risk_level: "Medium".to_owned(),
            recommendations: vec![
                "Consult with your veterinarian for detailed guidance".to_owned(),
            ],
            alternatives: Vec::new(),
            warnings: vec!["Professional veterinary consultation recommended".to_owned()],
            sources: Vec::new(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_reply_parses() {
        let reply = "```json\n{\"analysis\": \"All clear.\", \"riskLevel\": \"Low\", \
                     \"recommendations\": [\"Routine monitoring\"]}\n```";
        let report = parse_report(reply);
        assert_eq!(report.analysis, "All clear.");
        assert_eq!(report.risk_level, "Low");
        assert_eq!(report.recommendations, ["Routine monitoring"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn bare_json_reply_parses() {
        let reply = r#"{"analysis": "Watch for drowsiness.", "riskLevel": "Medium"}"#;
        let report = parse_report(reply);
        assert_eq!(report.risk_level, "Medium");
    }

    #[test]
    fn plain_text_reply_is_wrapped() {
        let report = parse_report("These medications are generally compatible.");
        assert_eq!(report.analysis, "These medications are generally compatible.");
        assert_eq!(report.risk_level, "Medium");
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn broken_json_reply_falls_back() {
        let report = parse_report("{\"analysis\": \"truncated");
        assert_eq!(report.risk_level, "Unknown");
        assert!(report.warnings.iter().any(|w| w.contains("parse")));
    }

    #[test]
    fn fence_stripping_handles_plain_fences() {
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }

    #[test]
    fn fallback_report_is_generic() {
        let report = fallback_report();
        assert_eq!(report.risk_level, "Unknown");
        assert!(report.analysis.contains("veterinarian"));
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn report_round_trips_camel_case() {
        let report = fallback_report();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("riskLevel").is_some());
        let back: AnalysisReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
