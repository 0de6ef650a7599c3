//! Field sanitization — whitespace normalization, markup/control stripping,
//! and per-field-type length ceilings.
//!
//! [`FieldSanitizer`] runs before classification so downstream rules inspect
//! canonical text.  The pass is applied until it reaches a fixpoint: tag
//! stripping can reunite whitespace runs or expose a nested tag, so a single
//! ordered pass is not stable, but the fixpoint is — re-sanitizing already
//! sanitized text is a no-op.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ── FieldKind ──────────────────────────────────────────────────────────

/// The kind of user-supplied field being sanitized.
///
/// Each kind carries its own length ceiling; unknown field-type names fall
/// back to [`FieldKind::GeneralInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A medication or drug name.
    MedicationName,
    /// A free-form analysis question.
    Query,
    /// A pet breed name.
    PetBreed,
    /// A medical condition description.
    MedicalCondition,
    /// Anything else.
    GeneralInput,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MedicationName => write!(f, "medication_name"),
            Self::Query => write!(f, "query"),
            Self::PetBreed => write!(f, "pet_breed"),
            Self::MedicalCondition => write!(f, "medical_condition"),
            Self::GeneralInput => write!(f, "general_input"),
        }
    }
}

impl FieldKind {
    /// Resolve a field-type name; unknown names map to
    /// [`FieldKind::GeneralInput`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "medication_name" => Self::MedicationName,
            "query" => Self::Query,
            "pet_breed" => Self::PetBreed,
            "medical_condition" => Self::MedicalCondition,
            _ => Self::GeneralInput,
        }
    }

    /// Infer the appropriate kind for a template slot name.
    #[must_use]
    pub fn infer_for_slot(slot: &str) -> Self {
        let lower = slot.to_lowercase();
        if lower.contains("medication") || lower.contains("drug") {
            Self::MedicationName
        } else if lower.contains("query") || lower.contains("question") {
            Self::Query
        } else if lower.contains("breed") {
            Self::PetBreed
        } else if lower.contains("condition") {
            Self::MedicalCondition
        } else {
            Self::GeneralInput
        }
    }
}

// ── SanitizerConfig ────────────────────────────────────────────────────

/// Per-field-type character ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SanitizerConfig {
    /// Ceiling for medication names.
    #[serde(default = "default_medication_name")]
    pub medication_name: usize,
    /// Ceiling for analysis queries.
    #[serde(default = "default_query")]
    pub query: usize,
    /// Ceiling for pet breeds.
    #[serde(default = "default_pet_breed")]
    pub pet_breed: usize,
    /// Ceiling for medical conditions.
    #[serde(default = "default_medical_condition")]
    pub medical_condition: usize,
    /// Ceiling for everything else (also the fallback).
    #[serde(default = "default_general_input")]
    pub general_input: usize,
}

fn default_medication_name() -> usize {
    100
}
fn default_query() -> usize {
    500
}
fn default_pet_breed() -> usize {
    50
}
fn default_medical_condition() -> usize {
    200
}
fn default_general_input() -> usize {
    1000
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            medication_name: default_medication_name(),
            query: default_query(),
            pet_breed: default_pet_breed(),
            medical_condition: default_medical_condition(),
            general_input: default_general_input(),
        }
    }
}

impl SanitizerConfig {
    /// The character ceiling for a field kind.
    #[must_use]
    pub fn max_len(&self, kind: FieldKind) -> usize {
        match kind {
            FieldKind::MedicationName => self.medication_name,
            FieldKind::Query => self.query,
            FieldKind::PetBreed => self.pet_breed,
            FieldKind::MedicalCondition => self.medical_condition,
            FieldKind::GeneralInput => self.general_input,
        }
    }
}

// ── Regex statics ──────────────────────────────────────────────────────

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static JS_SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)javascript:").unwrap());
static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\w+\s*=").unwrap());

/// Control characters stripped from field text: C0 controls and DEL, except
/// tab, newline, and carriage return.
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

// ── FieldSanitizer ─────────────────────────────────────────────────────

/// Sanitizes user-supplied field text before classification and rendering.
#[derive(Debug, Clone, Default)]
pub struct FieldSanitizer {
    config: SanitizerConfig,
}

impl FieldSanitizer {
    /// Create a sanitizer with the given ceilings.
    #[must_use]
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    /// Create a sanitizer with the default ceilings.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(SanitizerConfig::default())
    }

    /// Access the configured ceilings.
    #[must_use]
    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Sanitize `text` as a field of the given kind.
    ///
    /// Steps, in order: collapse whitespace runs and trim; truncate to the
    /// field kind's ceiling; strip HTML/XML-style tags; remove `javascript:`
    /// scheme prefixes and inline event-handler patterns; strip control
    /// characters.  The sequence repeats until stable, so the operation is
    /// idempotent.
    #[must_use]
    pub fn sanitize(&self, text: &str, kind: FieldKind) -> String {
        let max_len = self.config.max_len(kind);
        let mut current = text.to_owned();
        loop {
            let next = sanitize_pass(&current, max_len, kind);
            if next == current {
                return next;
            }
            current = next;
        }
    }
}

/// One ordered pass of the sanitization steps.  Every step only removes
/// characters or replaces runs with a single space, so repeated passes
/// strictly shrink the text until the fixpoint is reached.
fn sanitize_pass(text: &str, max_len: usize, kind: FieldKind) -> String {
    // (a) collapse whitespace runs, trim ends
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    let trimmed = collapsed.trim();

    // (b) enforce the length ceiling (observable, not fatal)
    let char_count = trimmed.chars().count();
    let truncated: Cow<'_, str> = if char_count > max_len {
        warn!(
            field_kind = %kind,
            original_chars = char_count,
            max_chars = max_len,
            "input truncated to field ceiling"
        );
        Cow::Owned(trimmed.chars().take(max_len).collect())
    } else {
        Cow::Borrowed(trimmed)
    };

    // (c) strip HTML/XML-style tags
    let untagged = TAG_RE.replace_all(&truncated, "");

    // (d) remove javascript: scheme and inline event-handler patterns
    let no_scheme = JS_SCHEME_RE.replace_all(&untagged, "");
    let no_handlers = EVENT_HANDLER_RE.replace_all(&no_scheme, "");

    // (e) strip control characters except tab/newline/carriage return
    no_handlers.chars().filter(|c| !is_stripped_control(*c)).collect()
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> FieldSanitizer {
        FieldSanitizer::with_defaults()
    }

    #[test]
    fn passthrough_clean_text() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("Normal medication name", FieldKind::GeneralInput),
            "Normal medication name"
        );
    }

    #[test]
    fn strips_script_tags_keeps_content() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("<script>alert('xss')</script>", FieldKind::GeneralInput),
            "alert('xss')"
        );
    }

    #[test]
    fn strips_html_tags() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("Medicine with HTML <b>tags</b>", FieldKind::GeneralInput),
            "Medicine with HTML tags"
        );
    }

    #[test]
    fn collapses_whitespace_and_trims() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("   Extra   whitespace   ", FieldKind::GeneralInput),
            "Extra whitespace"
        );
    }

    #[test]
    fn strips_control_chars() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize(
                "Medication\u{0}with\u{1}control\u{2}chars",
                FieldKind::GeneralInput
            ),
            "Medicationwithcontrolchars"
        );
    }

    #[test]
    fn strips_javascript_scheme() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("javascript:void(0)", FieldKind::GeneralInput),
            "void(0)"
        );
    }

    #[test]
    fn strips_event_handlers() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("onclick=malicious", FieldKind::GeneralInput),
            "malicious"
        );
    }

    #[test]
    fn truncates_to_field_ceiling() {
        let s = sanitizer();
        let long = "a".repeat(1500);
        let out = s.sanitize(&long, FieldKind::GeneralInput);
        assert_eq!(out.chars().count(), 1000);

        let out = s.sanitize(&long, FieldKind::PetBreed);
        assert_eq!(out.chars().count(), 50);
    }

    #[test]
    fn length_bound_holds_for_every_kind() {
        let s = sanitizer();
        let long = "word ".repeat(400);
        for kind in [
            FieldKind::MedicationName,
            FieldKind::Query,
            FieldKind::PetBreed,
            FieldKind::MedicalCondition,
            FieldKind::GeneralInput,
        ] {
            let out = s.sanitize(&long, kind);
            assert!(out.chars().count() <= s.config().max_len(kind));
        }
    }

    #[test]
    fn nested_tag_fragments_are_fully_removed() {
        // A single tag-strip pass leaves "<script>" behind here; the
        // fixpoint loop removes it.
        let s = sanitizer();
        let out = s.sanitize("<scr<b>ipt>alert(1)</script>", FieldKind::GeneralInput);
        assert!(!out.contains('<'));
        assert!(!out.contains("script"));
    }

    #[test]
    fn split_javascript_scheme_is_fully_removed() {
        let s = sanitizer();
        let out = s.sanitize("javajavascript:script:alert(1)", FieldKind::GeneralInput);
        assert!(!out.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn idempotent_on_hostile_samples() {
        let s = sanitizer();
        let samples = [
            "<script>alert('xss')</script>",
            "   Extra   whitespace   ",
            "a <b> c",
            "<scr<b>ipt>nested</script>",
            "javascript:javascript:void(0)",
            "onload= onclick= text",
            "plain text with no markup",
            "tabs\tand\nnewlines",
        ];
        for sample in samples {
            let once = s.sanitize(sample, FieldKind::GeneralInput);
            let twice = s.sanitize(&once, FieldKind::GeneralInput);
            assert_eq!(once, twice, "sanitize not idempotent for {sample:?}");
        }
    }

    #[test]
    fn unknown_field_name_falls_back_to_general() {
        assert_eq!(FieldKind::from_name("mystery_field"), FieldKind::GeneralInput);
        assert_eq!(FieldKind::from_name("query"), FieldKind::Query);
    }

    #[test]
    fn slot_inference() {
        assert_eq!(
            FieldKind::infer_for_slot("medication_name"),
            FieldKind::MedicationName
        );
        assert_eq!(FieldKind::infer_for_slot("drug_list"), FieldKind::MedicationName);
        assert_eq!(FieldKind::infer_for_slot("query"), FieldKind::Query);
        assert_eq!(FieldKind::infer_for_slot("user_question"), FieldKind::Query);
        assert_eq!(FieldKind::infer_for_slot("breed"), FieldKind::PetBreed);
        assert_eq!(
            FieldKind::infer_for_slot("chronic_condition"),
            FieldKind::MedicalCondition
        );
        assert_eq!(FieldKind::infer_for_slot("species"), FieldKind::GeneralInput);
    }

    #[test]
    fn display_names_match_policy_keys() {
        assert_eq!(FieldKind::MedicationName.to_string(), "medication_name");
        assert_eq!(FieldKind::GeneralInput.to_string(), "general_input");
    }
}
