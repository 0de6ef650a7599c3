//! Weighted rule matching plus statistical heuristics over sanitized text.
//!
//! [`RiskClassifier`] compiles all enabled rules into a [`RegexSet`] for
//! O(n) multi-pattern matching, then re-checks individual [`Regex`]es only
//! for matched rules.  Two heuristics supplement the rules: special-character
//! density (obfuscation) and token repetition (evasion padding).

use std::borrow::Cow;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

use super::patterns::{builtin_rules, CustomRule, DetectionRule, RuleCategory};

// ── RiskLevel ──────────────────────────────────────────────────────────

/// Ordered risk category for a piece of text.
///
/// `Ord` is derived so threshold logic can compare levels directly
/// (`level <= RiskLevel::Medium`) instead of juggling raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No meaningful injection signal.
    Low,
    /// Some signal, but within the permissive band for veterinary phrasing.
    Medium,
    /// Strong injection signal — must not be forwarded.
    High,
    /// Overwhelming injection signal — must not be forwarded.
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ── ClassifierConfig ───────────────────────────────────────────────────

/// Configuration for [`RiskClassifier`].
///
/// The numeric weights and thresholds are heuristic constants tuned on
/// veterinary text; they are configuration, not invariants.  Uses a builder
/// pattern — all setters are `#[must_use]`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ClassifierConfig {
    /// Additional user-provided rules.
    #[serde(default)]
    pub additional_rules: Vec<CustomRule>,
    /// Built-in rule IDs to disable.
    #[serde(default)]
    pub disabled_rules: Vec<String>,
    /// Special-character ratio above which the density heuristic fires.
    #[serde(default = "default_special_char_ratio")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub special_char_ratio: f32,
    /// Score added when the density heuristic fires.
    #[serde(default = "default_special_char_weight")]
    pub special_char_weight: u32,
    /// Score added when the token-repetition heuristic fires.
    #[serde(default = "default_repetition_weight")]
    pub repetition_weight: u32,
    /// Minimum score for [`RiskLevel::Medium`].
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u32,
    /// Minimum score for [`RiskLevel::High`].
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u32,
    /// Minimum score for [`RiskLevel::Critical`].
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: u32,
}

fn default_special_char_ratio() -> f32 {
    0.30
}
fn default_special_char_weight() -> u32 {
    5
}
fn default_repetition_weight() -> u32 {
    2
}
fn default_medium_threshold() -> u32 {
    8
}
fn default_high_threshold() -> u32 {
    15
}
fn default_critical_threshold() -> u32 {
    20
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            additional_rules: Vec::new(),
            disabled_rules: Vec::new(),
            special_char_ratio: default_special_char_ratio(),
            special_char_weight: default_special_char_weight(),
            repetition_weight: default_repetition_weight(),
            medium_threshold: default_medium_threshold(),
            high_threshold: default_high_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

impl ClassifierConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add user-provided rules.
    #[must_use]
    pub fn additional_rules(mut self, rules: Vec<CustomRule>) -> Self {
        self.additional_rules = rules;
        self
    }

    /// Disable built-in rules by ID.
    #[must_use]
    pub fn disabled_rules(mut self, ids: Vec<String>) -> Self {
        self.disabled_rules = ids;
        self
    }

    /// Set the special-character ratio threshold.
    #[must_use]
    pub fn special_char_ratio(mut self, ratio: f32) -> Self {
        self.special_char_ratio = ratio;
        self
    }

    /// Set the level thresholds (medium, high, critical).
    #[must_use]
    pub fn thresholds(mut self, medium: u32, high: u32, critical: u32) -> Self {
        self.medium_threshold = medium;
        self.high_threshold = high;
        self.critical_threshold = critical;
        self
    }
}

// ── RiskFlag ───────────────────────────────────────────────────────────

/// A single signal that contributed to a [`RiskAssessment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
#[non_exhaustive]
pub enum RiskFlag {
    /// A detection rule matched.
    Rule {
        /// Which rule triggered.
        id: Cow<'static, str>,
        /// Category of the matched rule.
        category: RuleCategory,
        /// Score contribution.
        weight: u32,
    },
    /// The special-character density heuristic fired.
    SpecialCharDensity {
        /// Observed ratio of special characters.
        ratio: f32,
        /// Score contribution.
        weight: u32,
    },
    /// The token-repetition heuristic fired.
    TokenRepetition {
        /// Distinct lowercase token count.
        distinct: usize,
        /// Total token count.
        total: usize,
        /// Score contribution.
        weight: u32,
    },
}

// ── RiskAssessment ─────────────────────────────────────────────────────

/// The classifier's verdict on a piece of text.
///
/// `score` is a monotone sum of triggered signals; `level` is a pure step
/// function of `score`; `safe` is a pure function of `level`
/// (LOW and MEDIUM are safe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Sum of triggered rule weights and heuristic contributions.
    pub score: u32,
    /// Derived risk level.
    pub level: RiskLevel,
    /// Whether the text may be forwarded to the model.
    pub safe: bool,
    /// The signals that contributed to the score.
    pub flags: Vec<RiskFlag>,
}

impl RiskAssessment {
    /// Assessment for empty or trivially clean text.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            score: 0,
            level: RiskLevel::Low,
            safe: true,
            flags: Vec::new(),
        }
    }
}

// ── ClassifierError ────────────────────────────────────────────────────

/// Errors arising from classifier construction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClassifierError {
    /// A rule's regex failed to compile.
    #[error("rule '{id}' failed to compile: {reason}")]
    InvalidRule {
        /// Rule identifier.
        id: String,
        /// Underlying regex error message.
        reason: String,
    },
}

// ── Internal unified rule entry ────────────────────────────────────────

/// Metadata kept alongside each compiled regex, regardless of whether it
/// originated from a built-in or custom rule.
#[derive(Debug, Clone)]
struct RuleEntry {
    id: Cow<'static, str>,
    category: RuleCategory,
    weight: u32,
}

// ── RiskClassifier ─────────────────────────────────────────────────────

/// Fast multi-rule injection classifier.
///
/// Construction compiles a [`RegexSet`] from all enabled rules for O(n)
/// first-pass scanning.  Heuristic signals are computed in a single token
/// pass over the text.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    regex_set: RegexSet,
    rules: Vec<RuleEntry>,
    config: ClassifierConfig,
}

impl RiskClassifier {
    /// Build a classifier from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::InvalidRule`] if any rule regex fails to
    /// compile.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let disabled: std::collections::HashSet<&str> =
            config.disabled_rules.iter().map(String::as_str).collect();

        let builtins: Vec<DetectionRule> = builtin_rules()
            .into_iter()
            .filter(|r| !disabled.contains(r.id.as_ref()))
            .collect();

        let mut regex_strs: Vec<String> =
            Vec::with_capacity(builtins.len() + config.additional_rules.len());
        let mut entries: Vec<RuleEntry> = Vec::with_capacity(regex_strs.capacity());

        for r in &builtins {
            regex_strs.push(r.regex_str.to_string());
            entries.push(RuleEntry {
                id: r.id.clone(),
                category: r.category,
                weight: r.weight,
            });
        }

        for cr in &config.additional_rules {
            regex_strs.push(cr.regex_str.clone());
            entries.push(RuleEntry {
                id: Cow::Owned(cr.id.clone()),
                category: cr.category,
                weight: cr.weight,
            });
        }

        // Validate each pattern individually first so the error names the
        // offending rule rather than the whole set.
        for (i, rs) in regex_strs.iter().enumerate() {
            Regex::new(rs).map_err(|e| ClassifierError::InvalidRule {
                id: entries[i].id.to_string(),
                reason: e.to_string(),
            })?;
        }

        let regex_set = RegexSet::new(&regex_strs).map_err(|e| ClassifierError::InvalidRule {
            id: "<set>".into(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            regex_set,
            rules: entries,
            config,
        })
    }

    /// Build a classifier with default configuration (all built-in rules,
    /// no custom rules, original weights and thresholds).
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError`] if any built-in rule fails to compile.
    pub fn with_defaults() -> Result<Self, ClassifierError> {
        Self::new(ClassifierConfig::default())
    }

    /// Assess `text` for injection risk.
    ///
    /// Empty text is unconditionally LOW/safe with score 0.
    #[must_use]
    pub fn assess(&self, text: &str) -> RiskAssessment {
        if text.is_empty() {
            return RiskAssessment::clean();
        }

        let mut flags = Vec::new();
        let mut score: u32 = 0;

        for idx in self.regex_set.matches(text) {
            let entry = &self.rules[idx];
            score += entry.weight;
            flags.push(RiskFlag::Rule {
                id: entry.id.clone(),
                category: entry.category,
                weight: entry.weight,
            });
        }

        if let Some(ratio) = self.special_char_ratio(text) {
            score += self.config.special_char_weight;
            flags.push(RiskFlag::SpecialCharDensity {
                ratio,
                weight: self.config.special_char_weight,
            });
        }

        if let Some((distinct, total)) = repeated_tokens(text) {
            score += self.config.repetition_weight;
            flags.push(RiskFlag::TokenRepetition {
                distinct,
                total,
                weight: self.config.repetition_weight,
            });
        }

        let level = self.level_for(score);
        let safe = level <= RiskLevel::Medium;

        debug!(score, level = %level, flag_count = flags.len(), "risk assessment");
        if !safe {
            let rule_ids: Vec<&str> = flags
                .iter()
                .filter_map(|f| match f {
                    RiskFlag::Rule { id, .. } => Some(id.as_ref()),
                    _ => None,
                })
                .collect();
            // Internal diagnostics only — the offending text never goes
            // back to the requester.
            warn!(score, level = %level, ?rule_ids, "unsafe input detected");
        }

        RiskAssessment {
            score,
            level,
            safe,
            flags,
        }
    }

    /// Map a cumulative score onto a [`RiskLevel`] via the configured
    /// thresholds.
    #[must_use]
    pub fn level_for(&self, score: u32) -> RiskLevel {
        let cfg = &self.config;
        if score >= cfg.critical_threshold {
            RiskLevel::Critical
        } else if score >= cfg.high_threshold {
            RiskLevel::High
        } else if score >= cfg.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Ratio of non-alphanumeric, non-whitespace characters, if it exceeds
    /// the configured threshold.
    #[allow(clippy::cast_precision_loss)]
    fn special_char_ratio(&self, text: &str) -> Option<f32> {
        let total = text.chars().count();
        if total == 0 {
            return None;
        }
        let special = text
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace())
            .count();
        let ratio = special as f32 / total as f32;
        (ratio > self.config.special_char_ratio).then_some(ratio)
    }
}

/// Returns `(distinct, total)` token counts when fewer than half of the
/// whitespace-delimited tokens are distinct (case-insensitive).
#[allow(clippy::cast_precision_loss)]
fn repeated_tokens(text: &str) -> Option<(usize, usize)> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let total = tokens.len();
    if total == 0 {
        return None;
    }
    let distinct = tokens.iter().collect::<std::collections::HashSet<_>>().len();
    ((distinct as f32) < (total as f32) * 0.5).then_some((distinct, total))
}

// ── Tests ──────────────────────────────────────────────────────────────
