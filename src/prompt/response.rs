//! [`ResponseScrubber`] — post-processing for model output.
//!
//! Redacts leakage-shaped text and embedded code blocks, and replaces the
//! entire reply with a fixed refusal message when the output itself matches
//! a malicious-content family.  Redaction targets leakage-shaped text only;
//! there is no attempt at partial redaction of malicious intent.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Marker substituted for prompt-leakage phrases.
pub const DEFAULT_LEAKAGE_MARKER: &str = "[FILTERED]";

/// Marker substituted for fenced code blocks.
pub const DEFAULT_CODE_BLOCK_MARKER: &str = "[CODE_BLOCK_FILTERED]";

/// Canned reply substituted when the whole response is discarded.
pub const DEFAULT_REFUSAL_MESSAGE: &str = "I can only provide information about pet \
medication safety. Please rephrase your question about your pet's medications.";

static LEAKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(system\s+prompt|original\s+instructions?)\b").unwrap());
static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static MALICIOUS_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(ignore\s+all|forget\s+everything|new\s+instructions?)\b",
        r"(?i)\b(jailbreak|DAN\s+mode|system\s+override)\b",
        r"(?i)\b(hack|exploit|malicious|unauthorized)\b",
    ])
    .unwrap()
});

// ── ScrubberConfig ─────────────────────────────────────────────────────

/// Configuration for [`ResponseScrubber`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScrubberConfig {
    /// Marker substituted for leakage phrases.
    #[serde(default = "default_leakage_marker")]
    pub leakage_marker: String,
    /// Marker substituted for fenced code blocks.
    #[serde(default = "default_code_block_marker")]
    pub code_block_marker: String,
    /// Message substituted for the whole reply on a malicious-family match.
    #[serde(default = "default_refusal_message")]
    pub refusal_message: String,
}

fn default_leakage_marker() -> String {
    DEFAULT_LEAKAGE_MARKER.to_owned()
}
fn default_code_block_marker() -> String {
    DEFAULT_CODE_BLOCK_MARKER.to_owned()
}
fn default_refusal_message() -> String {
    DEFAULT_REFUSAL_MESSAGE.to_owned()
}

impl Default for ScrubberConfig {
    fn default() -> Self {
        Self {
            leakage_marker: default_leakage_marker(),
            code_block_marker: default_code_block_marker(),
            refusal_message: default_refusal_message(),
        }
    }
}

// ── ResponseScrubber ───────────────────────────────────────────────────

/// Scrubs model output before it reaches the caller.
#[derive(Debug, Clone, Default)]
pub struct ResponseScrubber {
    config: ScrubberConfig,
}

impl ResponseScrubber {
    /// Create a scrubber with the given markers and refusal message.
    #[must_use]
    pub fn new(config: ScrubberConfig) -> Self {
        Self { config }
    }

    /// Create a scrubber with the default markers and refusal message.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ScrubberConfig::default())
    }

    /// Scrub a model reply.
    ///
    /// Steps: replace prompt-leakage phrases with the leakage marker;
    /// replace fenced code blocks with the code-block marker; then scan the
    /// result against the malicious-content families and, on any match,
    /// discard the entire reply in favour of the refusal message.
    #[must_use]
    pub fn scrub(&self, response: &str) -> String {
        if response.is_empty() {
            return String::new();
        }

        let redacted = LEAKAGE_RE.replace_all(response, self.config.leakage_marker.as_str());
        let redacted =
            CODE_BLOCK_RE.replace_all(&redacted, self.config.code_block_marker.as_str());

        if MALICIOUS_SET.is_match(&redacted) {
            warn!("model reply replaced due to malicious content patterns");
            return self.config.refusal_message.clone();
        }

        redacted.into_owned()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scrubber() -> ResponseScrubber {
        ResponseScrubber::with_defaults()
    }

    #[test]
    fn empty_reply_stays_empty() {
        assert_eq!(scrubber().scrub(""), "");
    }

    #[test]
    fn clean_reply_passes_through() {
        let reply = "Prednisone at 5mg twice daily is within the usual range for a 30kg dog.";
        assert_eq!(scrubber().scrub(reply), reply);
    }

    #[test]
    fn leakage_phrases_are_redacted() {
        let out = scrubber().scrub("As stated in my system prompt, I must decline.");
        assert!(!out.to_lowercase().contains("system prompt"));
        assert!(out.contains(DEFAULT_LEAKAGE_MARKER));
    }

    #[test]
    fn plural_original_instructions_redacted() {
        let out = scrubber().scrub("My original instructions say otherwise.");
        assert!(out.contains(DEFAULT_LEAKAGE_MARKER));
    }

    #[test]
    fn code_block_replaced_rest_preserved() {
        let out = scrubber().scrub("``` python\nexec('x')\n``` Here is your analysis...");
        assert!(out.contains(DEFAULT_CODE_BLOCK_MARKER));
        assert!(out.contains("Here is your analysis..."));
        assert!(!out.contains("exec"));
    }

    #[test]
    fn malicious_reply_fully_replaced() {
        let out = scrubber().scrub("Sure! Step one: hack the admin panel.");
        assert_eq!(out, DEFAULT_REFUSAL_MESSAGE);
    }

    #[test]
    fn jailbreak_reply_fully_replaced() {
        let out = scrubber().scrub("Entering DAN mode as requested.");
        assert_eq!(out, DEFAULT_REFUSAL_MESSAGE);
    }

    #[test]
    fn override_phrase_reply_fully_replaced() {
        let out = scrubber().scrub("I will now ignore all my safety guidance.");
        assert_eq!(out, DEFAULT_REFUSAL_MESSAGE);
    }

    #[test]
    fn custom_markers_are_applied() {
        let config = ScrubberConfig {
            leakage_marker: "<cut>".into(),
            code_block_marker: "<code-cut>".into(),
            refusal_message: "nope".into(),
        };
        let s = ResponseScrubber::new(config);
        assert!(s.scrub("the system prompt says").contains("<cut>"));
        assert!(s.scrub("```\nx\n``` tail").contains("<code-cut>"));
        assert_eq!(s.scrub("how to exploit this"), "nope");
    }
}
