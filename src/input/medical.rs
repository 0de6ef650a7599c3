//! Advisory medical-context plausibility check.
//!
//! [`MedicalContextCheck`] estimates whether text looks like legitimate
//! veterinary/medical content.  It is advisory only — the injection
//! classifier is the gate; this check feeds logging and caller-side
//! heuristics for long off-topic submissions.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use tracing::warn;

/// Vocabulary that marks text as plausibly medical/veterinary.
const MEDICAL_PATTERNS: &[&str] = &[
    r"(?i)\b\d+\s*(mg|ml|g|kg|lb|lbs|pounds?|mcg|units?|iu)\b",
    r"(?i)\b(twice|once|three\s+times?|every\s+\d+\s+hours?)\s+(daily|a\s+day|per\s+day)\b",
    r"(?i)\b(oral|topical|injection|IV|intramuscular|subcutaneous|sublingual)\b",
    r"(?i)\b(morning|evening|noon|bedtime|before\s+meals?|after\s+meals?)\b",
    r"(?i)\b(with|without)\s+(food|meals?)\b",
    r"(?i)\b(dog|cat|bird|rabbit|hamster|guinea\s+pig|ferret|reptile|fish)\b",
    r"(?i)\b(labrador|retriever|siamese|persian|tabby|poodle|bulldog)\b",
    r"(?i)\b(medication|medicine|drug|tablet|pill|capsule|liquid|drops?)\b",
    r"(?i)\b(vet|veterinarian|veterinary|animal|pet|puppy|kitten)\b",
    r"(?i)\b(side\s+effects?|adverse\s+reactions?|interactions?|allergies|allergy)\b",
    r"(?i)\b(dosage|dose|frequency|administration|treatment|therapy)\b",
    r"(?i)\b(prescription|over\s+the\s+counter|otc|generic|brand)\b",
    r"(?i)\b(symptoms?|condition|illness|disease|disorder|syndrome)\b",
    r"(?i)\b(analyze|check|review|assess|evaluate|compare)\b",
    r"(?i)\b(safe|safety|dangerous|toxic|poisonous|contraindicated)\b",
];

/// Topics that mark long text as clearly non-medical.
const NON_MEDICAL_PATTERNS: &[&str] = &[
    r"(?i)\b(politics|election|government|democracy)\b",
    r"(?i)\b(weather|climate|temperature)\b",
    r"(?i)\b(sports|football|basketball|soccer)\b",
    r"(?i)\b(programming|coding|software|computer)\b",
    r"(?i)\b(movie|film|entertainment|celebrity)\b",
    r"(?i)\b(bomb|explosive|weapon|violence)\b",
    r"(?i)\b(cryptocurrency|bitcoin|investment|stock)\b",
];

static MEDICAL_SET: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(MEDICAL_PATTERNS).unwrap());
static NON_MEDICAL_SET: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(NON_MEDICAL_PATTERNS).unwrap());

// Food topics count as non-medical only when no pet context is present.
// (The regex crate has no lookaround, so the exception is a separate check.)
static FOOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(cooking|recipe|restaurant|food)\b").unwrap());
static PET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpet\b").unwrap());

/// Text longer than this many words with zero medical indicators and at
/// least one non-medical indicator is flagged.
const LONG_TEXT_WORDS: usize = 15;

/// Advisory whitelist/blacklist context check.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedicalContextCheck;

impl MedicalContextCheck {
    /// Create a new check.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when the text plausibly belongs to the
    /// medication-safety domain.
    ///
    /// Lenient by design: only long text with zero medical vocabulary and a
    /// clear off-topic indicator is flagged.  Empty text is not medical.
    #[must_use]
    pub fn looks_medical(self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        let medical_indicators = MEDICAL_SET.matches(text).iter().count();
        let mut non_medical_indicators = NON_MEDICAL_SET.matches(text).iter().count();
        if FOOD_RE.is_match(text) && !PET_RE.is_match(text) {
            non_medical_indicators += 1;
        }

        let word_count = text.split_whitespace().count();
        if word_count > LONG_TEXT_WORDS && medical_indicators == 0 && non_medical_indicators > 0 {
            warn!(word_count, "input appears to be non-medical content");
            return false;
        }

        true
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
