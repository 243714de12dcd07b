//! Extraction JSON contract and its sanitized typed form
//!
//! The raw structs mirror the model's output verbatim (every field optional,
//! strings untyped). `Extraction::from_raw` converts them into the closed-set
//! domain form, dropping elements that fail validation instead of failing
//! the document.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::dtc::DtcCode;

// =============================================================================
// Closed Sets
// =============================================================================

/// Severity of a DTC. Closed set per the extraction contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
    Informational,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Moderate => "moderate",
            Self::Minor => "minor",
            Self::Informational => "informational",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "moderate" => Ok(Self::Moderate),
            "minor" => Ok(Self::Minor),
            "informational" => Ok(Self::Informational),
            _ => Err(()),
        }
    }
}

/// Likelihood of a cause. Closed set per the extraction contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Likelihood {
    High,
    Medium,
    Low,
}

impl Likelihood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Likelihood {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(()),
        }
    }
}

/// Document category. Closed set per the extraction contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentCategory {
    RepairProcedure,
    DiagnosticGuide,
    DtcReference,
    TsbBulletin,
    WiringDiagram,
    PartsCatalog,
    ForumDiscussion,
    OwnersManual,
    RecallNotice,
    #[default]
    GeneralReference,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepairProcedure => "repair_procedure",
            Self::DiagnosticGuide => "diagnostic_guide",
            Self::DtcReference => "dtc_reference",
            Self::TsbBulletin => "tsb_bulletin",
            Self::WiringDiagram => "wiring_diagram",
            Self::PartsCatalog => "parts_catalog",
            Self::ForumDiscussion => "forum_discussion",
            Self::OwnersManual => "owners_manual",
            Self::RecallNotice => "recall_notice",
            Self::GeneralReference => "general_reference",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repair_procedure" => Ok(Self::RepairProcedure),
            "diagnostic_guide" => Ok(Self::DiagnosticGuide),
            "dtc_reference" => Ok(Self::DtcReference),
            "tsb_bulletin" => Ok(Self::TsbBulletin),
            "wiring_diagram" => Ok(Self::WiringDiagram),
            "parts_catalog" => Ok(Self::PartsCatalog),
            "forum_discussion" => Ok(Self::ForumDiscussion),
            "owners_manual" => Ok(Self::OwnersManual),
            "recall_notice" => Ok(Self::RecallNotice),
            "general_reference" => Ok(Self::GeneralReference),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Raw Contract (model output, untyped)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub dtc_codes: Vec<RawDtc>,
    #[serde(default)]
    pub causes: Vec<RawCause>,
    #[serde(default)]
    pub diagnostic_steps: Vec<RawStep>,
    #[serde(default)]
    pub sensors: Vec<RawSensor>,
    #[serde(default)]
    pub tsb_references: Vec<RawTsb>,
    #[serde(default)]
    pub vehicles_mentioned: Vec<RawVehicle>,
    #[serde(default)]
    pub document_category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawDtc {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCause {
    #[serde(default)]
    pub dtc_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub likelihood: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawStep {
    #[serde(default)]
    pub dtc_code: String,
    #[serde(default)]
    pub step_order: Option<i32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools_required: Option<String>,
    #[serde(default)]
    pub expected_values: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSensor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub typical_range: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub related_dtc_codes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTsb {
    #[serde(default)]
    pub tsb_number: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub affected_models: Option<String>,
    #[serde(default)]
    pub related_dtc_codes: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawVehicle {
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year_start: Option<i32>,
    #[serde(default)]
    pub year_end: Option<i32>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    #[serde(default)]
    pub related_dtc_codes: Vec<String>,
}

// =============================================================================
// Sanitized Form
// =============================================================================

#[derive(Debug, Clone)]
pub struct ExtractedDtc {
    pub code: DtcCode,
    pub description: Option<String>,
    pub category: Option<String>,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone)]
pub struct ExtractedCause {
    pub dtc_code: DtcCode,
    pub description: String,
    pub likelihood: Option<Likelihood>,
}

#[derive(Debug, Clone)]
pub struct ExtractedStep {
    pub dtc_code: DtcCode,
    pub step_order: i32,
    pub description: String,
    pub tools_required: Option<String>,
    pub expected_values: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedSensor {
    pub name: String,
    pub sensor_type: Option<String>,
    pub typical_range: Option<String>,
    pub unit: Option<String>,
    pub related_dtc_codes: Vec<DtcCode>,
}

#[derive(Debug, Clone)]
pub struct ExtractedTsb {
    pub tsb_number: String,
    pub title: Option<String>,
    pub affected_models: Option<String>,
    pub related_dtc_codes: Vec<DtcCode>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedVehicle {
    pub make: String,
    pub model: Option<String>,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub engine: Option<String>,
    pub transmission: Option<String>,
    pub related_dtc_codes: Vec<DtcCode>,
}

/// Per-chunk extraction after validation.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub dtc_codes: Vec<ExtractedDtc>,
    pub causes: Vec<ExtractedCause>,
    pub diagnostic_steps: Vec<ExtractedStep>,
    pub sensors: Vec<ExtractedSensor>,
    pub tsb_references: Vec<ExtractedTsb>,
    pub vehicles_mentioned: Vec<ExtractedVehicle>,
    pub document_category: Option<DocumentCategory>,
}

fn parse_codes(raw: &[String]) -> Vec<DtcCode> {
    raw.iter().filter_map(|c| DtcCode::parse(c)).collect()
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Extraction {
    /// Validate a raw extraction, dropping every element that fails the
    /// lexical or closed-set contract. Never errors.
    pub fn from_raw(raw: RawExtraction) -> Self {
        let dtc_codes = raw
            .dtc_codes
            .into_iter()
            .filter_map(|d| {
                let code = DtcCode::parse(&d.code)?;
                Some(ExtractedDtc {
                    code,
                    description: d.description.and_then(non_empty),
                    category: d.category.and_then(non_empty),
                    severity: d.severity.as_deref().and_then(|s| s.parse().ok()),
                })
            })
            .collect();

        let causes = raw
            .causes
            .into_iter()
            .filter_map(|c| {
                let dtc_code = DtcCode::parse(&c.dtc_code)?;
                let description = non_empty(c.description)?;
                Some(ExtractedCause {
                    dtc_code,
                    description,
                    likelihood: c.likelihood.as_deref().and_then(|s| s.parse().ok()),
                })
            })
            .collect();

        let diagnostic_steps = raw
            .diagnostic_steps
            .into_iter()
            .filter_map(|s| {
                let dtc_code = DtcCode::parse(&s.dtc_code)?;
                let description = non_empty(s.description)?;
                Some(ExtractedStep {
                    dtc_code,
                    step_order: s.step_order.unwrap_or(1).max(1),
                    description,
                    tools_required: s.tools_required.and_then(non_empty),
                    expected_values: s.expected_values.and_then(non_empty),
                })
            })
            .collect();

        let sensors = raw
            .sensors
            .into_iter()
            .filter_map(|s| {
                let name = non_empty(s.name)?;
                Some(ExtractedSensor {
                    name,
                    sensor_type: s.sensor_type.and_then(non_empty),
                    typical_range: s.typical_range.and_then(non_empty),
                    unit: s.unit.and_then(non_empty),
                    related_dtc_codes: parse_codes(&s.related_dtc_codes),
                })
            })
            .collect();

        let tsb_references = raw
            .tsb_references
            .into_iter()
            .filter_map(|t| {
                let tsb_number = non_empty(t.tsb_number)?;
                Some(ExtractedTsb {
                    tsb_number,
                    title: t.title.and_then(non_empty),
                    affected_models: t.affected_models.and_then(non_empty),
                    related_dtc_codes: parse_codes(&t.related_dtc_codes),
                    summary: t.summary.and_then(non_empty),
                })
            })
            .collect();

        let vehicles_mentioned = raw
            .vehicles_mentioned
            .into_iter()
            .filter_map(|v| {
                let make = non_empty(v.make)?;
                Some(ExtractedVehicle {
                    make,
                    model: v.model.and_then(non_empty),
                    year_start: v.year_start.filter(|y| (1900..=2100).contains(y)),
                    year_end: v.year_end.filter(|y| (1900..=2100).contains(y)),
                    engine: v.engine.and_then(non_empty),
                    transmission: v.transmission.and_then(non_empty),
                    related_dtc_codes: parse_codes(&v.related_dtc_codes),
                })
            })
            .collect();

        let document_category = raw
            .document_category
            .as_deref()
            .and_then(|c| c.parse().ok());

        Self {
            dtc_codes,
            causes,
            diagnostic_steps,
            sensors,
            tsb_references,
            vehicles_mentioned,
            document_category,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dtc_codes.is_empty()
            && self.causes.is_empty()
            && self.diagnostic_steps.is_empty()
            && self.sensors.is_empty()
            && self.tsb_references.is_empty()
            && self.vehicles_mentioned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dtc_codes_dropped() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{
                "dtc_codes": [
                    {"code": "P0301", "severity": "moderate"},
                    {"code": "NOTACODE"},
                    {"code": "p0420"}
                ]
            }"#,
        )
        .unwrap();
        let extraction = Extraction::from_raw(raw);
        assert_eq!(extraction.dtc_codes.len(), 2);
        assert_eq!(extraction.dtc_codes[0].code.as_str(), "P0301");
        assert_eq!(extraction.dtc_codes[0].severity, Some(Severity::Moderate));
        assert_eq!(extraction.dtc_codes[1].code.as_str(), "P0420");
    }

    #[test]
    fn test_unknown_severity_dropped_but_element_kept() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"dtc_codes": [{"code": "P0301", "severity": "catastrophic"}]}"#,
        )
        .unwrap();
        let extraction = Extraction::from_raw(raw);
        assert_eq!(extraction.dtc_codes.len(), 1);
        assert_eq!(extraction.dtc_codes[0].severity, None);
    }

    #[test]
    fn test_cause_without_description_dropped() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"causes": [
                {"dtc_code": "P0301", "description": "  "},
                {"dtc_code": "P0301", "description": "worn spark plug", "likelihood": "high"}
            ]}"#,
        )
        .unwrap();
        let extraction = Extraction::from_raw(raw);
        assert_eq!(extraction.causes.len(), 1);
        assert_eq!(extraction.causes[0].likelihood, Some(Likelihood::High));
    }

    #[test]
    fn test_missing_arrays_default_empty() {
        let raw: RawExtraction = serde_json::from_str(r#"{}"#).unwrap();
        let extraction = Extraction::from_raw(raw);
        assert!(extraction.is_empty());
        assert_eq!(extraction.document_category, None);
    }

    #[test]
    fn test_document_category_closed_set() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"document_category": "diagnostic_guide"}"#,
        )
        .unwrap();
        assert_eq!(
            Extraction::from_raw(raw).document_category,
            Some(DocumentCategory::DiagnosticGuide)
        );

        let raw: RawExtraction =
            serde_json::from_str(r#"{"document_category": "blog_post"}"#).unwrap();
        assert_eq!(Extraction::from_raw(raw).document_category, None);
    }

    #[test]
    fn test_vehicle_year_bounds() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"vehicles_mentioned": [
                {"make": "Ford", "model": "F-150", "year_start": 2015, "year_end": 20019}
            ]}"#,
        )
        .unwrap();
        let extraction = Extraction::from_raw(raw);
        assert_eq!(extraction.vehicles_mentioned.len(), 1);
        assert_eq!(extraction.vehicles_mentioned[0].year_start, Some(2015));
        assert_eq!(extraction.vehicles_mentioned[0].year_end, None);
    }

    #[test]
    fn test_related_codes_filtered() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"sensors": [
                {"name": "MAF", "related_dtc_codes": ["P0101", "bogus", "p0102"]}
            ]}"#,
        )
        .unwrap();
        let extraction = Extraction::from_raw(raw);
        let codes: Vec<&str> = extraction.sensors[0]
            .related_dtc_codes
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(codes, vec!["P0101", "P0102"]);
    }

    #[test]
    fn test_step_order_defaults_to_one() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"diagnostic_steps": [
                {"dtc_code": "P0301", "description": "check plugs", "step_order": -3}
            ]}"#,
        )
        .unwrap();
        let extraction = Extraction::from_raw(raw);
        assert_eq!(extraction.diagnostic_steps[0].step_order, 1);
    }
}
