//! Resolve stage: the scoring and conflict engine
//!
//! Runs per document in one transaction under a fresh `run_id`:
//!
//! - **A/B** fingerprint grouping and aggregation ([`aggregate`], pure)
//! - **C** unified score S over the merged aggregates
//! - **D** vehicle linkage to canonical make/model rows
//! - **E** transactional upserts into the knowledge graph
//! - **F** provenance rows, resolution log in ranked order, confidence
//!
//! Replay safety comes from the provenance unique key: upserting the same
//! staged data twice inserts no new `dtc_entity_sources` rows, so no
//! aggregate moves. Transient database errors roll the document back and
//! re-attempt once before going terminal.

pub mod aggregate;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::core::constants::QUEUE_RESOLVE;
use crate::data::postgres::PostgresError;
use crate::data::postgres::repositories::knowledge::{
    self, TABLE_CAUSES, TABLE_DTC_MASTER, TABLE_RELATED_SENSORS, TABLE_STEPS, TABLE_TSB_LINKS,
    TABLE_VEHICLE_LINKS,
};
use crate::data::postgres::repositories::logs::{self, ResolutionAction};
use crate::data::postgres::repositories::{staging, vehicles};
use crate::domain::document::ProcessingStage;
use crate::domain::extraction::ExtractedVehicle;
use crate::domain::scoring::{self, PracticalImpact, RankKey};
use crate::domain::vehicle::{VehicleContext, VehicleMatch, VehicleTie};

use aggregate::{Evidence, GroupedDocument};

use super::{PipelineStage, StageFailure, StageOutcome, StageServices};

pub struct ResolveStage;

#[async_trait]
impl PipelineStage for ResolveStage {
    fn name(&self) -> &'static str {
        "resolve"
    }

    fn input_queue(&self) -> &'static str {
        QUEUE_RESOLVE
    }

    fn expected_stage(&self) -> Option<ProcessingStage> {
        Some(ProcessingStage::Resolving)
    }

    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure> {
        // The whole document rolls back on transient errors and gets one
        // re-attempt before terminal failure.
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match resolve_document(services, job_id).await {
                Ok(run_id) => {
                    tracing::debug!(document_id = %job_id, run_id = %run_id, "Document resolved");
                    return Ok(StageOutcome::Advance(job_id));
                }
                Err(e) if e.is_transient() && attempt < 2 => {
                    tracing::warn!(
                        document_id = %job_id,
                        error = %e,
                        "Resolve rolled back on transient error; re-attempting"
                    );
                }
                Err(e) => {
                    return Err(StageFailure::new(format!("resolve failed: {}", e)));
                }
            }
        }
    }
}

/// One entity's resolution outcome, pending its ranked log entry.
struct ResolvedEntity {
    table: &'static str,
    entity_id: Uuid,
    action: ResolutionAction,
    details: String,
    evidence_count: i64,
    avg_trust: f64,
    avg_relevance: f64,
    vehicle: VehicleMatch,
    impact: PracticalImpact,
}

/// One staged group that never reached the graph.
struct RejectedEntity {
    table: &'static str,
    details: String,
}

async fn resolve_document(
    services: &StageServices,
    document_id: Uuid,
) -> Result<Uuid, PostgresError> {
    let staged = staging::load_document(services.db.pool(), document_id).await?;
    let run_id = Uuid::new_v4();

    let mut tx = services.db.pool().begin().await?;

    if staged.is_empty() {
        logs::log_resolution_tx(
            &mut tx,
            run_id,
            document_id,
            None,
            None,
            ResolutionAction::Rejected,
            "no eligible chunks",
        )
        .await?;
        tx.commit().await?;
        return Ok(run_id);
    }

    let grouped = aggregate::group_document(&staged);
    let context = document_context(&staged.vehicles);
    let chunk_ties = ties_by_chunk(&staged.vehicles);

    let mut resolved: Vec<ResolvedEntity> = Vec::new();
    let mut rejected: Vec<RejectedEntity> = Vec::new();

    // Phase E: DTC master rows first so everything else has an anchor.
    let dtc_ids =
        upsert_dtcs(&mut tx, &grouped, &context, &chunk_ties, &mut resolved).await?;

    upsert_causes(&mut tx, &grouped, &dtc_ids, &context, &chunk_ties, &mut resolved).await?;
    upsert_steps(&mut tx, &grouped, &dtc_ids, &context, &chunk_ties, &mut resolved).await?;
    upsert_sensors(
        &mut tx, &grouped, &dtc_ids, &context, &chunk_ties, &mut resolved, &mut rejected,
    )
    .await?;
    upsert_tsbs(
        &mut tx, &grouped, &dtc_ids, &context, &chunk_ties, &mut resolved, &mut rejected,
    )
    .await?;
    // Phase D: vehicle linkage.
    upsert_vehicles(&mut tx, &grouped, &dtc_ids, &context, &mut resolved, &mut rejected).await?;

    // Phase C: unified score per resolved entity, then the reproducible
    // ordering: S desc, evidence desc, trust desc, relevance desc, id asc.
    let mut ranked: Vec<(RankKey, ResolvedEntity)> = resolved
        .into_iter()
        .map(|entity| {
            let score = scoring::unified_score(
                entity.avg_trust,
                entity.avg_relevance,
                entity.evidence_count,
                entity.vehicle,
                entity.impact,
            );
            (
                RankKey {
                    score,
                    evidence_count: entity.evidence_count,
                    avg_trust: entity.avg_trust,
                    avg_relevance: entity.avg_relevance,
                    entity_id: entity.entity_id,
                },
                entity,
            )
        })
        .collect();
    ranked.sort_by(|a, b| scoring::rank_ordering(&a.0, &b.0));

    // Phase F: the resolution log records actions in ranked order, then the
    // touched DTCs get their confidence recomputed.
    for (key, entity) in &ranked {
        logs::log_resolution_tx(
            &mut tx,
            run_id,
            document_id,
            Some(entity.table),
            Some(entity.entity_id),
            entity.action,
            &format!("score={:.3} {}", key.score, entity.details),
        )
        .await?;
    }
    for entity in &rejected {
        logs::log_resolution_tx(
            &mut tx,
            run_id,
            document_id,
            Some(entity.table),
            None,
            ResolutionAction::Rejected,
            &entity.details,
        )
        .await?;
    }

    for dtc_id in dtc_ids.values() {
        knowledge::update_dtc_confidence(&mut tx, *dtc_id).await?;
    }

    tx.commit().await?;
    Ok(run_id)
}

/// The document's declared vehicle context from its staged mentions.
fn document_context(staged: &[staging::StagedVehicle]) -> VehicleContext {
    let mentions: Vec<ExtractedVehicle> = staged
        .iter()
        .map(|v| ExtractedVehicle {
            make: v.make.clone(),
            model: v.model.clone(),
            year_start: v.year_start,
            year_end: v.year_end,
            engine: v.engine.clone(),
            transmission: v.transmission.clone(),
            related_dtc_codes: Vec::new(),
        })
        .collect();
    VehicleContext::from_mentions(&mentions)
}

/// First vehicle tie asserted by each chunk; entities inherit the tie of
/// their contributing chunks.
fn ties_by_chunk(staged: &[staging::StagedVehicle]) -> HashMap<Uuid, VehicleTie> {
    let mut ties = HashMap::new();
    for vehicle in staged {
        ties.entry(vehicle.chunk_id).or_insert_with(|| VehicleTie {
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            year_start: vehicle.year_start,
            year_end: vehicle.year_end,
        });
    }
    ties
}

/// Vehicle match for an entity through its evidence chunks.
fn entity_vehicle_match(
    evidence: &Evidence,
    context: &VehicleContext,
    chunk_ties: &HashMap<Uuid, VehicleTie>,
) -> VehicleMatch {
    let tie = evidence
        .rows()
        .iter()
        .find_map(|row| chunk_ties.get(&row.chunk_id));
    context.classify(tie)
}

/// Record provenance for every evidence chunk; returns the count and score
/// means of the rows that were actually new.
async fn record_new_sources(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    entity_id: Uuid,
    evidence: &Evidence,
) -> Result<(i64, f64, f64), PostgresError> {
    let mut new_count = 0i64;
    let mut trust_sum = 0.0;
    let mut relevance_sum = 0.0;
    for row in evidence.rows() {
        let inserted = knowledge::record_source(
            tx,
            table,
            entity_id,
            row.chunk_id,
            row.trust,
            row.relevance,
        )
        .await?;
        if inserted {
            new_count += 1;
            trust_sum += row.trust;
            relevance_sum += row.relevance;
        }
    }
    if new_count == 0 {
        return Ok((0, 0.0, 0.0));
    }
    Ok((
        new_count,
        trust_sum / new_count as f64,
        relevance_sum / new_count as f64,
    ))
}

fn action_for(created: bool, new_evidence: i64) -> ResolutionAction {
    if created {
        ResolutionAction::Created
    } else if new_evidence > 0 {
        ResolutionAction::Merged
    } else {
        ResolutionAction::Updated
    }
}

async fn upsert_dtcs(
    tx: &mut Transaction<'_, Postgres>,
    grouped: &GroupedDocument,
    context: &VehicleContext,
    chunk_ties: &HashMap<Uuid, VehicleTie>,
    resolved: &mut Vec<ResolvedEntity>,
) -> Result<BTreeMap<String, Uuid>, PostgresError> {
    let mut dtc_ids = BTreeMap::new();
    let described: HashMap<&str, &aggregate::DtcGroup> =
        grouped.dtcs.iter().map(|g| (g.code.as_str(), g)).collect();

    for code in aggregate::referenced_codes(grouped) {
        let group = described.get(code.as_str());

        let outcome = match group {
            Some(group) => {
                knowledge::upsert_dtc_master(
                    tx,
                    &group.code,
                    group.description.as_deref(),
                    group.category.as_deref(),
                    group.severity.as_deref(),
                    group.evidence.avg_trust(),
                )
                .await?
            }
            // Referenced by a sensor/TSB/vehicle but never described:
            // a bare master row anchors the link.
            None => knowledge::upsert_dtc_master(tx, &code, None, None, None, 0.0).await?,
        };

        dtc_ids.insert(code.clone(), outcome.entity_id);

        if let Some(group) = group
            && group.conflicting
        {
            knowledge::set_conflict_flag(tx, TABLE_DTC_MASTER, outcome.entity_id).await?;
        }

        // Codes only referenced by links still get provenance: the pooled
        // evidence of everything that mentioned them.
        let evidence = match group {
            Some(group) => group.evidence.clone(),
            None => aggregate::evidence_for_code(grouped, &code),
        };

        let (new_count, new_trust, new_relevance) =
            record_new_sources(tx, TABLE_DTC_MASTER, outcome.entity_id, &evidence).await?;
        let merged = knowledge::merge_evidence(
            tx,
            TABLE_DTC_MASTER,
            outcome.entity_id,
            new_count,
            new_trust,
            new_relevance,
        )
        .await?;

        resolved.push(ResolvedEntity {
            table: TABLE_DTC_MASTER,
            entity_id: outcome.entity_id,
            action: action_for(outcome.created, new_count),
            details: format!("code={}", code),
            evidence_count: merged.evidence_count,
            avg_trust: merged.avg_trust,
            avg_relevance: merged.avg_relevance,
            vehicle: entity_vehicle_match(&evidence, context, chunk_ties),
            impact: PracticalImpact::Informational,
        });
    }
    Ok(dtc_ids)
}

async fn upsert_causes(
    tx: &mut Transaction<'_, Postgres>,
    grouped: &GroupedDocument,
    dtc_ids: &BTreeMap<String, Uuid>,
    context: &VehicleContext,
    chunk_ties: &HashMap<Uuid, VehicleTie>,
    resolved: &mut Vec<ResolvedEntity>,
) -> Result<(), PostgresError> {
    for group in &grouped.causes {
        let Some(dtc_id) = dtc_ids.get(&group.dtc_code) else {
            continue;
        };

        let outcome = knowledge::upsert_cause(
            tx,
            *dtc_id,
            &group.description,
            group.likelihood.as_deref(),
        )
        .await?;

        if group.conflicting {
            knowledge::set_conflict_flag(tx, TABLE_CAUSES, outcome.entity_id).await?;
        }

        let (new_count, new_trust, new_relevance) =
            record_new_sources(tx, TABLE_CAUSES, outcome.entity_id, &group.evidence).await?;
        let merged = knowledge::merge_evidence(
            tx,
            TABLE_CAUSES,
            outcome.entity_id,
            new_count,
            new_trust,
            new_relevance,
        )
        .await?;

        let probability_weight = scoring::probability_weight(merged.evidence_count);
        knowledge::set_probability_weight(tx, outcome.entity_id, probability_weight).await?;

        resolved.push(ResolvedEntity {
            table: TABLE_CAUSES,
            entity_id: outcome.entity_id,
            action: action_for(outcome.created, new_count),
            details: format!("dtc={} cause={}", group.dtc_code, group.description),
            evidence_count: merged.evidence_count,
            avg_trust: merged.avg_trust,
            avg_relevance: merged.avg_relevance,
            vehicle: entity_vehicle_match(&group.evidence, context, chunk_ties),
            impact: PracticalImpact::Cause { probability_weight },
        });
    }
    Ok(())
}

async fn upsert_steps(
    tx: &mut Transaction<'_, Postgres>,
    grouped: &GroupedDocument,
    dtc_ids: &BTreeMap<String, Uuid>,
    context: &VehicleContext,
    chunk_ties: &HashMap<Uuid, VehicleTie>,
    resolved: &mut Vec<ResolvedEntity>,
) -> Result<(), PostgresError> {
    for group in &grouped.steps {
        let Some(dtc_id) = dtc_ids.get(&group.dtc_code) else {
            continue;
        };

        let outcome = knowledge::upsert_step(
            tx,
            *dtc_id,
            group.step_order,
            &group.description,
            group.tools_required.as_deref(),
            group.expected_values.as_deref(),
        )
        .await?;

        let (new_count, new_trust, new_relevance) =
            record_new_sources(tx, TABLE_STEPS, outcome.entity_id, &group.evidence).await?;
        let merged = knowledge::merge_evidence(
            tx,
            TABLE_STEPS,
            outcome.entity_id,
            new_count,
            new_trust,
            new_relevance,
        )
        .await?;

        resolved.push(ResolvedEntity {
            table: TABLE_STEPS,
            entity_id: outcome.entity_id,
            action: action_for(outcome.created, new_count),
            details: format!(
                "dtc={} step_order={} instruction={}",
                group.dtc_code, group.step_order, group.description
            ),
            evidence_count: merged.evidence_count,
            avg_trust: merged.avg_trust,
            avg_relevance: merged.avg_relevance,
            vehicle: entity_vehicle_match(&group.evidence, context, chunk_ties),
            impact: PracticalImpact::Informational,
        });
    }
    Ok(())
}

async fn upsert_sensors(
    tx: &mut Transaction<'_, Postgres>,
    grouped: &GroupedDocument,
    dtc_ids: &BTreeMap<String, Uuid>,
    context: &VehicleContext,
    chunk_ties: &HashMap<Uuid, VehicleTie>,
    resolved: &mut Vec<ResolvedEntity>,
    rejected: &mut Vec<RejectedEntity>,
) -> Result<(), PostgresError> {
    for group in &grouped.sensors {
        if group.related_codes.is_empty() {
            rejected.push(RejectedEntity {
                table: TABLE_RELATED_SENSORS,
                details: format!("sensor={} has no DTC reference", group.name),
            });
            continue;
        }

        let (sensor_id, _) = knowledge::upsert_sensor(
            tx,
            &group.name,
            group.sensor_type.as_deref(),
            group.typical_range.as_deref(),
            group.unit.as_deref(),
        )
        .await?;

        for code in &group.related_codes {
            let Some(dtc_id) = dtc_ids.get(code) else {
                continue;
            };
            let (link_id, created) = knowledge::link_dtc_sensor(tx, *dtc_id, sensor_id).await?;
            let (new_count, new_trust, new_relevance) =
                record_new_sources(tx, TABLE_RELATED_SENSORS, link_id, &group.evidence).await?;
            let merged = knowledge::merge_evidence(
                tx,
                TABLE_RELATED_SENSORS,
                link_id,
                new_count,
                new_trust,
                new_relevance,
            )
            .await?;

            resolved.push(ResolvedEntity {
                table: TABLE_RELATED_SENSORS,
                entity_id: link_id,
                action: action_for(created, new_count),
                details: format!("dtc={} sensor={}", code, group.name),
                evidence_count: merged.evidence_count,
                avg_trust: merged.avg_trust,
                avg_relevance: merged.avg_relevance,
                vehicle: entity_vehicle_match(&group.evidence, context, chunk_ties),
                impact: PracticalImpact::Informational,
            });
        }
    }
    Ok(())
}

async fn upsert_tsbs(
    tx: &mut Transaction<'_, Postgres>,
    grouped: &GroupedDocument,
    dtc_ids: &BTreeMap<String, Uuid>,
    context: &VehicleContext,
    chunk_ties: &HashMap<Uuid, VehicleTie>,
    resolved: &mut Vec<ResolvedEntity>,
    rejected: &mut Vec<RejectedEntity>,
) -> Result<(), PostgresError> {
    for group in &grouped.tsbs {
        if group.related_codes.is_empty() {
            rejected.push(RejectedEntity {
                table: TABLE_TSB_LINKS,
                details: format!("tsb={} has no DTC reference", group.tsb_number),
            });
            continue;
        }

        let (tsb_id, _) = knowledge::upsert_tsb(
            tx,
            &group.tsb_number,
            group.title.as_deref(),
            group.affected_models.as_deref(),
            group.summary.as_deref(),
        )
        .await?;

        for code in &group.related_codes {
            let Some(dtc_id) = dtc_ids.get(code) else {
                continue;
            };
            let (link_id, created) = knowledge::link_dtc_tsb(tx, *dtc_id, tsb_id).await?;
            let (new_count, new_trust, new_relevance) =
                record_new_sources(tx, TABLE_TSB_LINKS, link_id, &group.evidence).await?;
            let merged = knowledge::merge_evidence(
                tx,
                TABLE_TSB_LINKS,
                link_id,
                new_count,
                new_trust,
                new_relevance,
            )
            .await?;

            resolved.push(ResolvedEntity {
                table: TABLE_TSB_LINKS,
                entity_id: link_id,
                action: action_for(created, new_count),
                details: format!("dtc={} tsb={}", code, group.tsb_number),
                evidence_count: merged.evidence_count,
                avg_trust: merged.avg_trust,
                avg_relevance: merged.avg_relevance,
                vehicle: entity_vehicle_match(&group.evidence, context, chunk_ties),
                impact: PracticalImpact::Informational,
            });
        }
    }
    Ok(())
}

async fn upsert_vehicles(
    tx: &mut Transaction<'_, Postgres>,
    grouped: &GroupedDocument,
    dtc_ids: &BTreeMap<String, Uuid>,
    context: &VehicleContext,
    resolved: &mut Vec<ResolvedEntity>,
    rejected: &mut Vec<RejectedEntity>,
) -> Result<(), PostgresError> {
    for group in &grouped.vehicles {
        let Some(model_name) = &group.model else {
            rejected.push(RejectedEntity {
                table: TABLE_VEHICLE_LINKS,
                details: format!("vehicle make={} has no model", group.make),
            });
            continue;
        };

        // A mention without explicit codes ties to every DTC the document
        // described.
        let codes: Vec<&String> = if group.related_codes.is_empty() {
            grouped.dtcs.iter().map(|g| &g.code).collect()
        } else {
            group.related_codes.iter().collect()
        };
        if codes.is_empty() {
            rejected.push(RejectedEntity {
                table: TABLE_VEHICLE_LINKS,
                details: format!(
                    "vehicle {} {} has no DTC to link",
                    group.make, model_name
                ),
            });
            continue;
        }

        let make_id = vehicles::upsert_make(tx, &group.make).await?;
        let (model_id, _) = vehicles::resolve_model(
            tx,
            make_id,
            model_name,
            group.year_start,
            group.year_end,
            group.engine.as_deref(),
            group.transmission.as_deref(),
        )
        .await?;

        let entity_tie = VehicleTie {
            make: group.make.clone(),
            model: group.model.clone(),
            year_start: group.year_start,
            year_end: group.year_end,
        };
        let vehicle_match = context.classify(Some(&entity_tie));

        for code in codes {
            let Some(dtc_id) = dtc_ids.get(code) else {
                continue;
            };
            let (link_id, created) = vehicles::link_dtc_vehicle(
                tx,
                *dtc_id,
                model_id,
                group.year_start,
                group.year_end,
            )
            .await?;
            let (new_count, _, _) =
                record_new_sources(tx, TABLE_VEHICLE_LINKS, link_id, &group.evidence).await?;
            vehicles::bump_vehicle_evidence(tx, link_id, new_count).await?;

            resolved.push(ResolvedEntity {
                table: TABLE_VEHICLE_LINKS,
                entity_id: link_id,
                action: action_for(created, new_count),
                details: format!(
                    "dtc={} vehicle={} {}",
                    code, group.make, model_name
                ),
                evidence_count: group.evidence.count(),
                avg_trust: group.evidence.avg_trust(),
                avg_relevance: group.evidence.avg_relevance(),
                vehicle: vehicle_match,
                impact: PracticalImpact::Informational,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged_vehicle(chunk: u128, make: &str, model: &str) -> staging::StagedVehicle {
        staging::StagedVehicle {
            chunk_id: Uuid::from_u128(chunk),
            make: make.to_string(),
            model: Some(model.to_string()),
            year_start: None,
            year_end: None,
            engine: None,
            transmission: None,
            related_dtc_codes: vec![],
            trust_score: 0.5,
            relevance_score: 0.5,
        }
    }

    #[test]
    fn test_stage_identity() {
        let stage = ResolveStage;
        assert_eq!(stage.name(), "resolve");
        assert_eq!(stage.input_queue(), "jobs:resolve");
        assert_eq!(stage.expected_stage(), Some(ProcessingStage::Resolving));
    }

    #[test]
    fn test_contradicting_vehicle_ranks_below_matching_one() {
        // The scenario behind the ordering requirement: two chunks of one
        // document mention P0420, one for a Ford F-150 and one for a Toyota
        // Camry, and the document context resolves to Ford.
        let staged = vec![
            staged_vehicle(1, "Ford", "F-150"),
            staged_vehicle(1, "Ford", "F-150"),
            staged_vehicle(2, "Toyota", "Camry"),
        ];
        let context = document_context(&staged);
        assert_eq!(context.tie.as_ref().unwrap().make, "Ford");

        let ford = VehicleTie::new("Ford", Some("F-150"));
        let toyota = VehicleTie::new("Toyota", Some("Camry"));

        let ford_score = scoring::unified_score(
            0.7,
            0.7,
            1,
            context.classify(Some(&ford)),
            PracticalImpact::Informational,
        );
        let toyota_score = scoring::unified_score(
            0.7,
            0.7,
            1,
            context.classify(Some(&toyota)),
            PracticalImpact::Informational,
        );
        assert!(ford_score > toyota_score);
        assert_eq!(context.classify(Some(&toyota)), VehicleMatch::Contradicts);

        let keys = [
            RankKey {
                score: toyota_score,
                evidence_count: 1,
                avg_trust: 0.7,
                avg_relevance: 0.7,
                entity_id: Uuid::from_u128(1),
            },
            RankKey {
                score: ford_score,
                evidence_count: 1,
                avg_trust: 0.7,
                avg_relevance: 0.7,
                entity_id: Uuid::from_u128(2),
            },
        ];
        let mut sorted = keys.to_vec();
        sorted.sort_by(scoring::rank_ordering);
        assert_eq!(sorted[0].entity_id, Uuid::from_u128(2));
    }

    #[test]
    fn test_ties_by_chunk_keeps_first() {
        let staged = vec![
            staged_vehicle(1, "Ford", "F-150"),
            staged_vehicle(1, "Toyota", "Camry"),
        ];
        let ties = ties_by_chunk(&staged);
        assert_eq!(ties.len(), 1);
        assert_eq!(ties[&Uuid::from_u128(1)].make, "Ford");
    }

    #[test]
    fn test_action_for_matrix() {
        assert_eq!(action_for(true, 0), ResolutionAction::Created);
        assert_eq!(action_for(false, 2), ResolutionAction::Merged);
        assert_eq!(action_for(false, 0), ResolutionAction::Updated);
    }
}
