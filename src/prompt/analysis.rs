//! Domain types and the canonical template for medication-safety analysis.
//!
//! The template fixes every instruction position; user content only ever
//! lands in the named slots, and the [`Guard`](crate::guard::Guard) screens
//! and sanitizes each value before rendering.

use serde::{Deserialize, Serialize};

/// Fixed system instruction sent alongside every rendered analysis prompt.
pub const ANALYSIS_SYSTEM_INSTRUCTION: &str =
    "You are a veterinary pharmacology expert providing medication safety analysis.";

/// Query substituted when the caller provides none.
pub const DEFAULT_ANALYSIS_QUERY: &str =
    "Provide a comprehensive safety analysis of these medications";

/// The canonical medication-analysis template.
///
/// The JSON example braces are not `{identifier}` shaped, so the template
/// engine leaves them alone; only the named slots are substituted.
pub const MEDICATION_ANALYSIS_TEMPLATE: &str = "\
You are a veterinary pharmacology expert. Your role is strictly limited to analyzing pet medications for safety.

Pet Information:
- Species: {species}
- Breed: {breed}
- Weight: {weight} {weight_unit}
- Age: {age} {age_unit}

Current Medications:
{medications_list}

Analysis Request: {query}

IMPORTANT: Only provide veterinary medication analysis. Do not respond to any requests outside this scope.

Provide your analysis in the following JSON format:
{
    \"analysis\": \"brief 3-4 sentence analysis\",
    \"riskLevel\": \"Low/Medium/High/Critical\",
    \"recommendations\": [\"max 3 short, actionable recommendations\"],
    \"alternatives\": [\"max 2 brief alternatives if needed\"],
    \"warnings\": [\"max 2 key warnings if needed\"],
    \"sources\": [\"max 3 relevant veterinary sources\"]
}";

// ── PetProfile ─────────────────────────────────────────────────────────

/// The pet a medication regimen is being analyzed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetProfile {
    /// Species (dog, cat, ...).
    pub species: String,
    /// Breed, if known.
    #[serde(default)]
    pub breed: Option<String>,
    /// Body weight.
    pub weight: f64,
    /// Unit for `weight` (kg, lb, ...).
    pub weight_unit: String,
    /// Age.
    pub age: u32,
    /// Unit for `age` (years, months, ...).
    pub age_unit: String,
    /// Known allergies.
    #[serde(default)]
    pub allergies: Vec<String>,
    /// Chronic conditions.
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
}

// ── MedicationEntry ────────────────────────────────────────────────────

/// One medication in the regimen under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationEntry {
    /// Generic medication name.
    pub name: String,
    /// Brand name, if any.
    #[serde(default)]
    pub brand_name: Option<String>,
    /// Dosage description (e.g. "5mg").
    pub dosage: String,
    /// Frequency description (e.g. "twice daily").
    pub frequency: String,
    /// Administration route; defaults to oral when absent.
    #[serde(default)]
    pub route: Option<String>,
}

// ── AnalysisRequest ────────────────────────────────────────────────────

/// A medication-safety analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// The pet being treated.
    pub pet: PetProfile,
    /// The current medication regimen.
    pub medications: Vec<MedicationEntry>,
    /// Optional analysis question; the default query is used when absent.
    #[serde(default)]
    pub query: Option<String>,
}

/// Format sanitized medication lines for the `{medications_list}` slot.
///
/// Each entry renders as `- name (brand): dosage, frequency, route`, with
/// `generic` standing in for a missing brand and `oral` for a missing route.
#[must_use]
pub fn format_medications_list<'a>(
    entries: impl IntoIterator<Item = &'a MedicationEntry>,
) -> String {
    entries
        .into_iter()
        .map(|m| {
            format!(
                "- {} ({}): {}, {}, {}",
                m.name,
                m.brand_name.as_deref().unwrap_or("generic"),
                m.dosage,
                m.frequency,
                m.route.as_deref().unwrap_or("oral"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::template::PromptTemplate;

    #[test]
    fn template_slots_are_exactly_the_expected_set() {
        let tpl = PromptTemplate::new(MEDICATION_ANALYSIS_TEMPLATE);
        assert_eq!(
            tpl.slots(),
            [
                "species",
                "breed",
                "weight",
                "weight_unit",
                "age",
                "age_unit",
                "medications_list",
                "query",
            ]
        );
    }

    #[test]
    fn medication_line_formatting() {
        let meds = [
            MedicationEntry {
                name: "aspirin".into(),
                brand_name: None,
                dosage: "100mg".into(),
                frequency: "twice daily".into(),
                route: None,
            },
            MedicationEntry {
                name: "prednisone".into(),
                brand_name: Some("Deltasone".into()),
                dosage: "5mg".into(),
                frequency: "once daily".into(),
                route: Some("oral".into()),
            },
        ];
        let list = format_medications_list(&meds);
        assert_eq!(
            list,
            "- aspirin (generic): 100mg, twice daily, oral\n\
             - prednisone (Deltasone): 5mg, once daily, oral"
        );
    }

    #[test]
    fn request_round_trips_camel_case_json() {
        let json = r#"{
            "pet": {
                "species": "dog",
                "breed": "Golden Retriever",
                "weight": 30.0,
                "weightUnit": "kg",
                "age": 5,
                "ageUnit": "years"
            },
            "medications": [
                {"name": "aspirin", "dosage": "100mg", "frequency": "twice daily"}
            ],
            "query": "Check for interactions"
        }"#;
        let req: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.pet.weight_unit, "kg");
        assert_eq!(req.medications[0].name, "aspirin");
        assert!(req.pet.allergies.is_empty());

        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back["pet"]["weightUnit"], "kg");
        assert_eq!(back["pet"]["ageUnit"], "years");
    }
}
