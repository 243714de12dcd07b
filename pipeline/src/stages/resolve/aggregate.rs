//! Resolve phases A and B: fingerprint grouping and per-entity aggregation
//!
//! Pure code over staged rows. Groups key on normalized fingerprints,
//! evidence counts distinct contributing chunks (the glossary definition),
//! and aggregates are arithmetic means over that evidence. Everything uses
//! ordered maps so two runs over the same staged data group identically.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use uuid::Uuid;

use crate::data::postgres::repositories::staging::{
    StagedCause, StagedDocument, StagedDtc, StagedSensor, StagedStep, StagedTsb, StagedVehicle,
};
use crate::domain::fingerprint::fingerprint;

/// One chunk's contribution to an entity group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkEvidence {
    pub chunk_id: Uuid,
    pub trust: f64,
    pub relevance: f64,
}

/// Evidence rows deduplicated by chunk, preserving first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    rows: Vec<ChunkEvidence>,
}

impl Evidence {
    pub fn add(&mut self, chunk_id: Uuid, trust: f64, relevance: f64) {
        if self.rows.iter().any(|r| r.chunk_id == chunk_id) {
            return;
        }
        self.rows.push(ChunkEvidence {
            chunk_id,
            trust,
            relevance,
        });
    }

    /// Distinct contributing chunks.
    pub fn count(&self) -> i64 {
        self.rows.len() as i64
    }

    pub fn rows(&self) -> &[ChunkEvidence] {
        &self.rows
    }

    /// Arithmetic mean of chunk trust scores.
    pub fn avg_trust(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r.trust).sum::<f64>() / self.rows.len() as f64
    }

    /// Arithmetic mean of chunk relevance scores.
    pub fn avg_relevance(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r.relevance).sum::<f64>() / self.rows.len() as f64
    }
}

/// Aggregated DTC observations for one code.
#[derive(Debug, Clone)]
pub struct DtcGroup {
    pub code: String,
    /// Description from the highest-trust row that carried one
    pub description: Option<String>,
    pub description_trust: f64,
    pub category: Option<String>,
    pub severity: Option<String>,
    /// Differing closed-set attributes within the document
    pub conflicting: bool,
    pub evidence: Evidence,
}

/// Aggregated cause observations keyed `(code, fingerprint)`.
#[derive(Debug, Clone)]
pub struct CauseGroup {
    pub dtc_code: String,
    pub description: String,
    pub likelihood: Option<String>,
    pub conflicting: bool,
    pub evidence: Evidence,
}

/// Aggregated diagnostic-step observations keyed `(code, fingerprint)`.
#[derive(Debug, Clone)]
pub struct StepGroup {
    pub dtc_code: String,
    pub step_order: i32,
    pub description: String,
    pub tools_required: Option<String>,
    pub expected_values: Option<String>,
    pub evidence: Evidence,
}

/// Aggregated sensor observations keyed by lowercase name.
#[derive(Debug, Clone)]
pub struct SensorGroup {
    pub name: String,
    pub sensor_type: Option<String>,
    pub typical_range: Option<String>,
    pub unit: Option<String>,
    pub related_codes: Vec<String>,
    pub evidence: Evidence,
}

/// Aggregated TSB observations keyed by lowercase bulletin number.
#[derive(Debug, Clone)]
pub struct TsbGroup {
    pub tsb_number: String,
    pub title: Option<String>,
    pub affected_models: Option<String>,
    pub summary: Option<String>,
    pub related_codes: Vec<String>,
    pub evidence: Evidence,
}

/// Aggregated vehicle mentions keyed `(make, model)` lowercase.
#[derive(Debug, Clone)]
pub struct VehicleGroup {
    pub make: String,
    pub model: Option<String>,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub engine: Option<String>,
    pub transmission: Option<String>,
    pub related_codes: Vec<String>,
    pub evidence: Evidence,
}

/// The whole document grouped and aggregated, in deterministic key order.
#[derive(Debug, Clone, Default)]
pub struct GroupedDocument {
    pub dtcs: Vec<DtcGroup>,
    pub causes: Vec<CauseGroup>,
    pub steps: Vec<StepGroup>,
    pub sensors: Vec<SensorGroup>,
    pub tsbs: Vec<TsbGroup>,
    pub vehicles: Vec<VehicleGroup>,
}

fn merge_code_list(target: &mut Vec<String>, codes: &[String]) {
    for code in codes {
        if !target.iter().any(|c| c == code) {
            target.push(code.clone());
        }
    }
    target.sort();
}

fn keep_first(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none()
        && let Some(v) = value
    {
        *slot = Some(v.clone());
    }
}

/// Phase A + B over one staged document.
pub fn group_document(staged: &StagedDocument) -> GroupedDocument {
    let dtcs = group_dtcs(&staged.dtc_codes);
    let causes = group_causes(&staged.causes);
    let steps = group_steps(&staged.steps);
    let sensors = group_sensors(&staged.sensors);
    let tsbs = group_tsbs(&staged.tsbs);
    let vehicles = group_vehicles(&staged.vehicles);

    GroupedDocument {
        dtcs,
        causes,
        steps,
        sensors,
        tsbs,
        vehicles,
    }
}

fn group_dtcs(rows: &[StagedDtc]) -> Vec<DtcGroup> {
    let mut groups: BTreeMap<String, DtcGroup> = BTreeMap::new();
    for row in rows {
        let key = row.code.clone();
        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(DtcGroup {
                    code: row.code.clone(),
                    description: row.description.clone(),
                    description_trust: if row.description.is_some() {
                        row.trust_score
                    } else {
                        f64::NEG_INFINITY
                    },
                    category: row.category.clone(),
                    severity: row.severity.clone(),
                    conflicting: false,
                    evidence: {
                        let mut e = Evidence::default();
                        e.add(row.chunk_id, row.trust_score, row.relevance_score);
                        e
                    },
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group
                    .evidence
                    .add(row.chunk_id, row.trust_score, row.relevance_score);
                if let Some(desc) = &row.description
                    && row.trust_score > group.description_trust
                {
                    group.description = Some(desc.clone());
                    group.description_trust = row.trust_score;
                }
                if let (Some(old), Some(new)) = (&group.severity, &row.severity)
                    && old != new
                {
                    group.conflicting = true;
                }
                if let (Some(old), Some(new)) = (&group.category, &row.category)
                    && old != new
                {
                    group.conflicting = true;
                }
                keep_first(&mut group.category, &row.category);
                keep_first(&mut group.severity, &row.severity);
            }
        }
    }
    groups.into_values().collect()
}

fn group_causes(rows: &[StagedCause]) -> Vec<CauseGroup> {
    let mut groups: BTreeMap<(String, String), CauseGroup> = BTreeMap::new();
    for row in rows {
        let key = (row.dtc_code.clone(), fingerprint(&row.description));
        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(CauseGroup {
                    dtc_code: row.dtc_code.clone(),
                    description: row.description.clone(),
                    likelihood: row.likelihood.clone(),
                    conflicting: false,
                    evidence: {
                        let mut e = Evidence::default();
                        e.add(row.chunk_id, row.trust_score, row.relevance_score);
                        e
                    },
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group
                    .evidence
                    .add(row.chunk_id, row.trust_score, row.relevance_score);
                if let (Some(old), Some(new)) = (&group.likelihood, &row.likelihood)
                    && old != new
                {
                    group.conflicting = true;
                }
                keep_first(&mut group.likelihood, &row.likelihood);
            }
        }
    }
    groups.into_values().collect()
}

fn group_steps(rows: &[StagedStep]) -> Vec<StepGroup> {
    let mut groups: BTreeMap<(String, String), StepGroup> = BTreeMap::new();
    for row in rows {
        let key = (row.dtc_code.clone(), fingerprint(&row.description));
        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(StepGroup {
                    dtc_code: row.dtc_code.clone(),
                    step_order: row.step_order,
                    description: row.description.clone(),
                    tools_required: row.tools_required.clone(),
                    expected_values: row.expected_values.clone(),
                    evidence: {
                        let mut e = Evidence::default();
                        e.add(row.chunk_id, row.trust_score, row.relevance_score);
                        e
                    },
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group
                    .evidence
                    .add(row.chunk_id, row.trust_score, row.relevance_score);
                group.step_order = group.step_order.min(row.step_order);
                keep_first(&mut group.tools_required, &row.tools_required);
                keep_first(&mut group.expected_values, &row.expected_values);
            }
        }
    }
    groups.into_values().collect()
}

fn group_sensors(rows: &[StagedSensor]) -> Vec<SensorGroup> {
    let mut groups: BTreeMap<String, SensorGroup> = BTreeMap::new();
    for row in rows {
        let key = row.name.trim().to_lowercase();
        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(SensorGroup {
                    name: row.name.clone(),
                    sensor_type: row.sensor_type.clone(),
                    typical_range: row.typical_range.clone(),
                    unit: row.unit.clone(),
                    related_codes: {
                        let mut codes = Vec::new();
                        merge_code_list(&mut codes, &row.related_dtc_codes);
                        codes
                    },
                    evidence: {
                        let mut e = Evidence::default();
                        e.add(row.chunk_id, row.trust_score, row.relevance_score);
                        e
                    },
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group
                    .evidence
                    .add(row.chunk_id, row.trust_score, row.relevance_score);
                merge_code_list(&mut group.related_codes, &row.related_dtc_codes);
                keep_first(&mut group.sensor_type, &row.sensor_type);
                keep_first(&mut group.typical_range, &row.typical_range);
                keep_first(&mut group.unit, &row.unit);
            }
        }
    }
    groups.into_values().collect()
}

fn group_tsbs(rows: &[StagedTsb]) -> Vec<TsbGroup> {
    let mut groups: BTreeMap<String, TsbGroup> = BTreeMap::new();
    for row in rows {
        let key = row.tsb_number.trim().to_lowercase();
        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(TsbGroup {
                    tsb_number: row.tsb_number.clone(),
                    title: row.title.clone(),
                    affected_models: row.affected_models.clone(),
                    summary: row.summary.clone(),
                    related_codes: {
                        let mut codes = Vec::new();
                        merge_code_list(&mut codes, &row.related_dtc_codes);
                        codes
                    },
                    evidence: {
                        let mut e = Evidence::default();
                        e.add(row.chunk_id, row.trust_score, row.relevance_score);
                        e
                    },
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group
                    .evidence
                    .add(row.chunk_id, row.trust_score, row.relevance_score);
                merge_code_list(&mut group.related_codes, &row.related_dtc_codes);
                keep_first(&mut group.title, &row.title);
                keep_first(&mut group.affected_models, &row.affected_models);
                keep_first(&mut group.summary, &row.summary);
            }
        }
    }
    groups.into_values().collect()
}

fn group_vehicles(rows: &[StagedVehicle]) -> Vec<VehicleGroup> {
    let mut groups: BTreeMap<(String, String), VehicleGroup> = BTreeMap::new();
    for row in rows {
        let key = (
            row.make.trim().to_lowercase(),
            row.model
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_lowercase(),
        );
        match groups.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(VehicleGroup {
                    make: row.make.clone(),
                    model: row.model.clone(),
                    year_start: row.year_start,
                    year_end: row.year_end,
                    engine: row.engine.clone(),
                    transmission: row.transmission.clone(),
                    related_codes: {
                        let mut codes = Vec::new();
                        merge_code_list(&mut codes, &row.related_dtc_codes);
                        codes
                    },
                    evidence: {
                        let mut e = Evidence::default();
                        e.add(row.chunk_id, row.trust_score, row.relevance_score);
                        e
                    },
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group
                    .evidence
                    .add(row.chunk_id, row.trust_score, row.relevance_score);
                merge_code_list(&mut group.related_codes, &row.related_dtc_codes);
                group.year_start = match (group.year_start, row.year_start) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                group.year_end = match (group.year_end, row.year_end) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                keep_first(&mut group.engine, &row.engine);
                keep_first(&mut group.transmission, &row.transmission);
            }
        }
    }
    groups.into_values().collect()
}

/// Every DTC code the document references, described or not, in sorted
/// order. Codes only referenced by sensors/TSBs/vehicles still get a
/// `dtc_master` row so links have somewhere to attach.
pub fn referenced_codes(grouped: &GroupedDocument) -> Vec<String> {
    let mut codes: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    codes.extend(grouped.dtcs.iter().map(|g| g.code.clone()));
    codes.extend(grouped.causes.iter().map(|g| g.dtc_code.clone()));
    codes.extend(grouped.steps.iter().map(|g| g.dtc_code.clone()));
    for group in &grouped.sensors {
        codes.extend(group.related_codes.iter().cloned());
    }
    for group in &grouped.tsbs {
        codes.extend(group.related_codes.iter().cloned());
    }
    for group in &grouped.vehicles {
        codes.extend(group.related_codes.iter().cloned());
    }
    codes.into_iter().collect()
}

/// All evidence backing one code, pooled across every group that mentions
/// it. Backs the provenance of master rows for codes that are referenced
/// (by a sensor, TSB, or vehicle) but never described directly.
pub fn evidence_for_code(grouped: &GroupedDocument, code: &str) -> Evidence {
    let mut evidence = Evidence::default();
    let mut absorb = |rows: &Evidence| {
        for row in rows.rows() {
            evidence.add(row.chunk_id, row.trust, row.relevance);
        }
    };
    for group in grouped.dtcs.iter().filter(|g| g.code == code) {
        absorb(&group.evidence);
    }
    for group in grouped.causes.iter().filter(|g| g.dtc_code == code) {
        absorb(&group.evidence);
    }
    for group in grouped.steps.iter().filter(|g| g.dtc_code == code) {
        absorb(&group.evidence);
    }
    for group in &grouped.sensors {
        if group.related_codes.iter().any(|c| c == code) {
            absorb(&group.evidence);
        }
    }
    for group in &grouped.tsbs {
        if group.related_codes.iter().any(|c| c == code) {
            absorb(&group.evidence);
        }
    }
    for group in &grouped.vehicles {
        if group.related_codes.iter().any(|c| c == code) {
            absorb(&group.evidence);
        }
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cause(chunk: u128, code: &str, description: &str, trust: f64, relevance: f64) -> StagedCause {
        StagedCause {
            chunk_id: Uuid::from_u128(chunk),
            dtc_code: code.to_string(),
            description: description.to_string(),
            likelihood: None,
            trust_score: trust,
            relevance_score: relevance,
        }
    }

    #[test]
    fn test_equal_fingerprints_group() {
        let staged = StagedDocument {
            causes: vec![
                cause(1, "P0301", "Worn spark plug.", 0.8, 0.6),
                cause(2, "P0301", "worn  SPARK plug", 0.6, 0.8),
            ],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert_eq!(grouped.causes.len(), 1);
        let group = &grouped.causes[0];
        assert_eq!(group.evidence.count(), 2);
        assert!((group.evidence.avg_trust() - 0.7).abs() < 1e-9);
        assert!((group.evidence.avg_relevance() - 0.7).abs() < 1e-9);
        // Display text is the first-seen original
        assert_eq!(group.description, "Worn spark plug.");
    }

    #[test]
    fn test_same_chunk_counts_once() {
        let staged = StagedDocument {
            causes: vec![
                cause(1, "P0301", "worn spark plug", 0.8, 0.6),
                cause(1, "P0301", "Worn spark plug!", 0.8, 0.6),
            ],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert_eq!(grouped.causes[0].evidence.count(), 1);
    }

    #[test]
    fn test_different_codes_stay_separate() {
        let staged = StagedDocument {
            causes: vec![
                cause(1, "P0301", "worn spark plug", 0.8, 0.6),
                cause(2, "P0302", "worn spark plug", 0.8, 0.6),
            ],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert_eq!(grouped.causes.len(), 2);
    }

    #[test]
    fn test_likelihood_conflict_detected() {
        let mut a = cause(1, "P0301", "worn spark plug", 0.8, 0.6);
        a.likelihood = Some("high".to_string());
        let mut b = cause(2, "P0301", "worn spark plug", 0.7, 0.5);
        b.likelihood = Some("low".to_string());
        let staged = StagedDocument {
            causes: vec![a, b],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert!(grouped.causes[0].conflicting);
        assert_eq!(grouped.causes[0].likelihood.as_deref(), Some("high"));
    }

    #[test]
    fn test_dtc_description_from_highest_trust() {
        let staged = StagedDocument {
            dtc_codes: vec![
                StagedDtc {
                    chunk_id: Uuid::from_u128(1),
                    code: "P0301".to_string(),
                    description: Some("forum description".to_string()),
                    category: None,
                    severity: Some("moderate".to_string()),
                    trust_score: 0.4,
                    relevance_score: 0.6,
                },
                StagedDtc {
                    chunk_id: Uuid::from_u128(2),
                    code: "P0301".to_string(),
                    description: Some("Cylinder 1 misfire detected".to_string()),
                    category: Some("powertrain".to_string()),
                    severity: Some("moderate".to_string()),
                    trust_score: 0.9,
                    relevance_score: 0.9,
                },
            ],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert_eq!(grouped.dtcs.len(), 1);
        assert_eq!(
            grouped.dtcs[0].description.as_deref(),
            Some("Cylinder 1 misfire detected")
        );
        assert!(!grouped.dtcs[0].conflicting);
    }

    #[test]
    fn test_dtc_severity_conflict() {
        let staged = StagedDocument {
            dtc_codes: vec![
                StagedDtc {
                    chunk_id: Uuid::from_u128(1),
                    code: "P0420".to_string(),
                    description: None,
                    category: None,
                    severity: Some("critical".to_string()),
                    trust_score: 0.5,
                    relevance_score: 0.5,
                },
                StagedDtc {
                    chunk_id: Uuid::from_u128(2),
                    code: "P0420".to_string(),
                    description: None,
                    category: None,
                    severity: Some("minor".to_string()),
                    trust_score: 0.5,
                    relevance_score: 0.5,
                },
            ],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert!(grouped.dtcs[0].conflicting);
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let a = StagedDocument {
            causes: vec![
                cause(1, "P0301", "worn spark plug", 0.8, 0.6),
                cause(2, "P0301", "failed coil", 0.7, 0.7),
            ],
            ..StagedDocument::default()
        };
        let b = StagedDocument {
            causes: vec![
                cause(2, "P0301", "failed coil", 0.7, 0.7),
                cause(1, "P0301", "worn spark plug", 0.8, 0.6),
            ],
            ..StagedDocument::default()
        };
        let grouped_a = group_document(&a);
        let grouped_b = group_document(&b);
        let descs_a: Vec<_> = grouped_a.causes.iter().map(|g| &g.description).collect();
        let descs_b: Vec<_> = grouped_b.causes.iter().map(|g| &g.description).collect();
        assert_eq!(descs_a, descs_b);
    }

    #[test]
    fn test_referenced_codes_include_links() {
        let staged = StagedDocument {
            causes: vec![cause(1, "P0301", "worn spark plug", 0.8, 0.6)],
            sensors: vec![StagedSensor {
                chunk_id: Uuid::from_u128(1),
                name: "MAF".to_string(),
                sensor_type: None,
                typical_range: None,
                unit: None,
                related_dtc_codes: vec!["P0101".to_string()],
                trust_score: 0.8,
                relevance_score: 0.6,
            }],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert_eq!(referenced_codes(&grouped), vec!["P0101", "P0301"]);
    }

    #[test]
    fn test_vehicle_year_range_widens() {
        let mk = |chunk: u128, start: Option<i32>, end: Option<i32>| StagedVehicle {
            chunk_id: Uuid::from_u128(chunk),
            make: "Ford".to_string(),
            model: Some("F-150".to_string()),
            year_start: start,
            year_end: end,
            engine: None,
            transmission: None,
            related_dtc_codes: vec![],
            trust_score: 0.5,
            relevance_score: 0.5,
        };
        let staged = StagedDocument {
            vehicles: vec![mk(1, Some(2012), Some(2014)), mk(2, Some(2010), Some(2016))],
            ..StagedDocument::default()
        };
        let grouped = group_document(&staged);
        assert_eq!(grouped.vehicles.len(), 1);
        assert_eq!(grouped.vehicles[0].year_start, Some(2010));
        assert_eq!(grouped.vehicles[0].year_end, Some(2016));
    }
}
