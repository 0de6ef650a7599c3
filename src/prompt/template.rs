//! [`PromptTemplate`] — literal, single-pass named-slot substitution.
//!
//! Templates use `{slot}` placeholders.  The required-slot set is computed
//! from the template text at construction; rendering validates the supplied
//! values against that set and substitutes them literally, end to start over
//! pre-collected spans, so an inserted value is never re-interpreted as
//! template syntax.  This is the structural guarantee that keeps user
//! content in value positions only, never instruction positions.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

// ── TemplateError ──────────────────────────────────────────────────────

/// Errors arising from template rendering.
///
/// A missing slot indicates a caller defect (mismatched template and input
/// set), not an end-user-triggerable condition — treat it as a fatal,
/// logged internal error rather than degrading silently.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TemplateError {
    /// The template references a slot absent from the supplied values.
    #[error("template references missing slot: '{name}'")]
    MissingSlot {
        /// Name of the missing slot.
        name: String,
    },
}

// ── Slot-regex helper ──────────────────────────────────────────────────

fn slot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").unwrap())
}

// ── PromptTemplate ─────────────────────────────────────────────────────

/// A prompt template with named `{slot}` placeholders.
///
/// # Example
///
/// ```rust
/// use pawguard::prompt::template::PromptTemplate;
///
/// let tpl = PromptTemplate::new("Species: {species}, Query: {query}");
/// let out = tpl
///     .render([("species", "dog"), ("query", "check interactions")])
///     .unwrap();
/// assert_eq!(out, "Species: dog, Query: check interactions");
/// ```
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    slots: Vec<String>,
}

impl PromptTemplate {
    /// Compile a template, extracting its required slot names.
    ///
    /// Slot names are deduplicated in order of first appearance.  Text that
    /// does not match the `{identifier}` shape (JSON braces, prose) passes
    /// through untouched.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let mut slots: Vec<String> = Vec::new();
        for caps in slot_regex().captures_iter(&template) {
            let name = &caps[1];
            if !slots.iter().any(|s| s == name) {
                slots.push(name.to_owned());
            }
        }
        Self { template, slots }
    }

    /// The required slot names, in order of first appearance.
    #[must_use]
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// Render the template by substituting slot values.
    ///
    /// Values must already be sanitized by the caller — the template
    /// performs no sanitization itself.  Extra values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingSlot`] iff a slot referenced by the
    /// template is absent from `values`.
    ///
    /// # Panics
    ///
    /// Calls `.expect()` on `caps.get(0)`, which is guaranteed to succeed
    /// because capture group 0 always exists when the regex matches.
    pub fn render(
        &self,
        values: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    ) -> Result<String, TemplateError> {
        let map: HashMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();

        for slot in &self.slots {
            if !map.contains_key(slot) {
                return Err(TemplateError::MissingSlot { name: slot.clone() });
            }
        }

        // Collect spans first, then replace from end to start so earlier
        // offsets stay valid and inserted values are never re-scanned.
        let spans: Vec<(usize, usize, String)> = slot_regex()
            .captures_iter(&self.template)
            .map(|caps| {
                let m = caps.get(0).expect("capture group 0 always exists");
                (m.start(), m.end(), caps[1].to_owned())
            })
            .collect();

        let mut result = self.template.clone();
        for (start, end, name) in spans.into_iter().rev() {
            if let Some(value) = map.get(&name) {
                result.replace_range(start..end, value);
            }
        }

        Ok(result)
    }
}

impl From<&str> for PromptTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
