//! Knowledge-graph upserts
//!
//! Every function here runs inside the single Resolve transaction. Upserts
//! follow one shape: insert-or-lookup on the natural key, append provenance
//! rows (which dedup on `(entity_table, entity_id, chunk_id)`), then fold
//! newly observed evidence into the row's aggregates with evidence-weighted
//! means. Replaying the same staged data inserts no provenance rows and so
//! changes no aggregates.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::domain::scoring;

// Entity table names as recorded in dtc_entity_sources and resolution_log.
pub const TABLE_DTC_MASTER: &str = "dtc_master";
pub const TABLE_CAUSES: &str = "dtc_possible_causes";
pub const TABLE_STEPS: &str = "dtc_diagnostic_steps";
pub const TABLE_RELATED_SENSORS: &str = "dtc_related_sensors";
pub const TABLE_TSB_LINKS: &str = "dtc_tsb_links";
pub const TABLE_VEHICLE_LINKS: &str = "dtc_vehicles";

/// Aggregates carried by non-reference knowledge rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregates {
    pub evidence_count: i64,
    pub avg_trust: f64,
    pub avg_relevance: f64,
}

/// Outcome of one entity upsert.
#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    pub entity_id: Uuid,
    pub created: bool,
    /// Provenance rows actually inserted (0 on pure replay)
    pub new_evidence: i64,
    pub conflict_flagged: bool,
}

// =============================================================================
// Provenance
// =============================================================================

/// Append one provenance row; returns whether it was new. The unique key
/// makes replays of the same `(entity, chunk)` pair no-ops.
pub async fn record_source(
    tx: &mut Transaction<'_, Postgres>,
    entity_table: &str,
    entity_id: Uuid,
    chunk_id: Uuid,
    trust_score: f64,
    relevance_score: f64,
) -> Result<bool, PostgresError> {
    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO dtc_entity_sources (entity_table, entity_id, chunk_id, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (entity_table, entity_id, chunk_id) DO NOTHING
         RETURNING id",
    )
    .bind(entity_table)
    .bind(entity_id)
    .bind(chunk_id)
    .bind(trust_score)
    .bind(relevance_score)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(inserted.is_some())
}

/// Provenance row count for an entity (the confidence `source_count`).
pub async fn source_count(
    tx: &mut Transaction<'_, Postgres>,
    entity_table: &str,
    entity_id: Uuid,
) -> Result<i64, PostgresError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM dtc_entity_sources WHERE entity_table = $1 AND entity_id = $2",
    )
    .bind(entity_table)
    .bind(entity_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(count)
}

// =============================================================================
// Aggregates
// =============================================================================

fn aggregate_table(table: &str) -> Result<&'static str, PostgresError> {
    // Table names are interpolated into SQL, so only known tables pass.
    match table {
        "dtc_master" => Ok("dtc_master"),
        "dtc_possible_causes" => Ok("dtc_possible_causes"),
        "dtc_diagnostic_steps" => Ok("dtc_diagnostic_steps"),
        "dtc_symptoms" => Ok("dtc_symptoms"),
        "dtc_verified_fixes" => Ok("dtc_verified_fixes"),
        "dtc_live_data_parameters" => Ok("dtc_live_data_parameters"),
        "dtc_related_parts" => Ok("dtc_related_parts"),
        "dtc_related_sensors" => Ok("dtc_related_sensors"),
        "dtc_tsb_links" => Ok("dtc_tsb_links"),
        other => Err(PostgresError::Conflict(format!(
            "unknown aggregate table: {}",
            other
        ))),
    }
}

/// Read a row's current aggregates.
pub async fn read_aggregates(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    entity_id: Uuid,
) -> Result<Aggregates, PostgresError> {
    let table = aggregate_table(table)?;
    let (evidence_count, avg_trust, avg_relevance): (i32, f64, f64) = sqlx::query_as(&format!(
        "SELECT evidence_count, avg_trust, avg_relevance FROM {table} WHERE id = $1"
    ))
    .bind(entity_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(Aggregates {
        evidence_count: i64::from(evidence_count),
        avg_trust,
        avg_relevance,
    })
}

/// Fold newly observed evidence into a row: the old aggregate weighted by
/// the old count, the new observations weighted by theirs.
pub async fn merge_evidence(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    entity_id: Uuid,
    new_count: i64,
    new_avg_trust: f64,
    new_avg_relevance: f64,
) -> Result<Aggregates, PostgresError> {
    let table = aggregate_table(table)?;
    if new_count <= 0 {
        return read_aggregates(tx, table, entity_id).await;
    }

    let old = read_aggregates(tx, table, entity_id).await?;
    let merged = Aggregates {
        evidence_count: old.evidence_count + new_count,
        avg_trust: scoring::weighted_mean(
            old.avg_trust,
            old.evidence_count,
            new_avg_trust,
            new_count,
        ),
        avg_relevance: scoring::weighted_mean(
            old.avg_relevance,
            old.evidence_count,
            new_avg_relevance,
            new_count,
        ),
    };

    sqlx::query(&format!(
        "UPDATE {table} SET evidence_count = $2, avg_trust = $3, avg_relevance = $4 WHERE id = $1"
    ))
    .bind(entity_id)
    .bind(merged.evidence_count as i32)
    .bind(merged.avg_trust)
    .bind(merged.avg_relevance)
    .execute(&mut **tx)
    .await?;

    Ok(merged)
}

/// Flip a row's conflict flag (closed-set disagreement within one run).
pub async fn set_conflict_flag(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    entity_id: Uuid,
) -> Result<(), PostgresError> {
    let table = aggregate_table(table)?;
    sqlx::query(&format!(
        "UPDATE {table} SET conflict_flag = TRUE WHERE id = $1"
    ))
    .bind(entity_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// DTC Master
// =============================================================================

/// Upsert a DTC master row keyed by code.
///
/// `generic_description` moves only to a strictly more trusted observation;
/// a differing closed-set attribute (severity, category) on an existing row
/// flips `conflict_flag` for the run.
pub async fn upsert_dtc_master(
    tx: &mut Transaction<'_, Postgres>,
    code: &str,
    description: Option<&str>,
    category: Option<&str>,
    severity: Option<&str>,
    observed_trust: f64,
) -> Result<UpsertOutcome, PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO dtc_master (id, code, generic_description, category, severity_level)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (code) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(code)
    .bind(description)
    .bind(category)
    .bind(severity)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(entity_id) = inserted {
        return Ok(UpsertOutcome {
            entity_id,
            created: true,
            new_evidence: 0,
            conflict_flagged: false,
        });
    }

    let (entity_id, existing_trust, existing_category, existing_severity): (
        Uuid,
        f64,
        Option<String>,
        Option<String>,
    ) = sqlx::query_as(
        "SELECT id, avg_trust, category, severity_level FROM dtc_master WHERE code = $1",
    )
    .bind(code)
    .fetch_one(&mut **tx)
    .await?;

    // Closed-set attribute disagreement within the run flags a conflict.
    let severity_conflicts = matches!(
        (&existing_severity, severity),
        (Some(old), Some(new)) if old != new
    );
    let category_conflicts = matches!(
        (&existing_category, category),
        (Some(old), Some(new)) if old != new
    );
    let conflict_flagged = severity_conflicts || category_conflicts;

    if conflict_flagged {
        sqlx::query("UPDATE dtc_master SET conflict_flag = TRUE, updated_at = now() WHERE id = $1")
            .bind(entity_id)
            .execute(&mut **tx)
            .await?;
    }

    if let Some(desc) = description
        && observed_trust > existing_trust
    {
        sqlx::query(
            "UPDATE dtc_master SET generic_description = $2, updated_at = now() WHERE id = $1",
        )
        .bind(entity_id)
        .bind(desc)
        .execute(&mut **tx)
        .await?;
    }

    // Fill attributes the existing row lacks.
    if existing_severity.is_none() && severity.is_some() {
        sqlx::query("UPDATE dtc_master SET severity_level = $2, updated_at = now() WHERE id = $1")
            .bind(entity_id)
            .bind(severity)
            .execute(&mut **tx)
            .await?;
    }
    if existing_category.is_none() && category.is_some() {
        sqlx::query("UPDATE dtc_master SET category = $2, updated_at = now() WHERE id = $1")
            .bind(entity_id)
            .bind(category)
            .execute(&mut **tx)
            .await?;
    }

    Ok(UpsertOutcome {
        entity_id,
        created: false,
        new_evidence: 0,
        conflict_flagged,
    })
}

/// Recompute a DTC's confidence from its provenance count and trust.
pub async fn update_dtc_confidence(
    tx: &mut Transaction<'_, Postgres>,
    dtc_master_id: Uuid,
) -> Result<f64, PostgresError> {
    let sources = source_count(tx, TABLE_DTC_MASTER, dtc_master_id).await?;
    let avg_trust: f64 = sqlx::query_scalar("SELECT avg_trust FROM dtc_master WHERE id = $1")
        .bind(dtc_master_id)
        .fetch_one(&mut **tx)
        .await?;
    let confidence = scoring::confidence(sources, avg_trust);
    sqlx::query("UPDATE dtc_master SET confidence_score = $2, updated_at = now() WHERE id = $1")
        .bind(dtc_master_id)
        .bind(confidence)
        .execute(&mut **tx)
        .await?;
    Ok(confidence)
}

/// Look up a DTC master ID by code.
pub async fn find_dtc_master(
    tx: &mut Transaction<'_, Postgres>,
    code: &str,
) -> Result<Option<Uuid>, PostgresError> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM dtc_master WHERE code = $1")
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(id)
}

// =============================================================================
// Text Entities
// =============================================================================

/// Upsert a possible cause keyed `(dtc_master_id, lower(description))`.
pub async fn upsert_cause(
    tx: &mut Transaction<'_, Postgres>,
    dtc_master_id: Uuid,
    description: &str,
    likelihood: Option<&str>,
) -> Result<UpsertOutcome, PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO dtc_possible_causes (id, dtc_master_id, description, likelihood)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (dtc_master_id, lower(description)) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(dtc_master_id)
    .bind(description)
    .bind(likelihood)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(entity_id) = inserted {
        return Ok(UpsertOutcome {
            entity_id,
            created: true,
            new_evidence: 0,
            conflict_flagged: false,
        });
    }

    let (entity_id, existing_likelihood): (Uuid, Option<String>) = sqlx::query_as(
        "SELECT id, likelihood FROM dtc_possible_causes
         WHERE dtc_master_id = $1 AND lower(description) = lower($2)",
    )
    .bind(dtc_master_id)
    .bind(description)
    .fetch_one(&mut **tx)
    .await?;

    let conflict_flagged = matches!(
        (&existing_likelihood, likelihood),
        (Some(old), Some(new)) if old != new
    );
    if conflict_flagged {
        sqlx::query(
            "UPDATE dtc_possible_causes SET conflict_flag = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(entity_id)
        .execute(&mut **tx)
        .await?;
    } else if existing_likelihood.is_none() && likelihood.is_some() {
        sqlx::query(
            "UPDATE dtc_possible_causes SET likelihood = $2, updated_at = now() WHERE id = $1",
        )
        .bind(entity_id)
        .bind(likelihood)
        .execute(&mut **tx)
        .await?;
    }

    Ok(UpsertOutcome {
        entity_id,
        created: false,
        new_evidence: 0,
        conflict_flagged,
    })
}

/// Write a cause's recomputed probability weight.
pub async fn set_probability_weight(
    tx: &mut Transaction<'_, Postgres>,
    cause_id: Uuid,
    probability_weight: f64,
) -> Result<(), PostgresError> {
    sqlx::query(
        "UPDATE dtc_possible_causes SET probability_weight = $2, updated_at = now() WHERE id = $1",
    )
    .bind(cause_id)
    .bind(probability_weight)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Upsert a diagnostic step keyed `(dtc_master_id, lower(instruction))`.
pub async fn upsert_step(
    tx: &mut Transaction<'_, Postgres>,
    dtc_master_id: Uuid,
    step_order: i32,
    instruction: &str,
    tools_required: Option<&str>,
    expected_values: Option<&str>,
) -> Result<UpsertOutcome, PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO dtc_diagnostic_steps (id, dtc_master_id, step_order, instruction, tools_required, expected_values)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (dtc_master_id, lower(instruction)) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(dtc_master_id)
    .bind(step_order)
    .bind(instruction)
    .bind(tools_required)
    .bind(expected_values)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(entity_id) = inserted {
        return Ok(UpsertOutcome {
            entity_id,
            created: true,
            new_evidence: 0,
            conflict_flagged: false,
        });
    }

    let entity_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM dtc_diagnostic_steps
         WHERE dtc_master_id = $1 AND lower(instruction) = lower($2)",
    )
    .bind(dtc_master_id)
    .bind(instruction)
    .fetch_one(&mut **tx)
    .await?;

    Ok(UpsertOutcome {
        entity_id,
        created: false,
        new_evidence: 0,
        conflict_flagged: false,
    })
}

/// Follow a diagnostic step's pass/fail pointer one level. The decision
/// tree is self-referential, so callers walk it a node at a time instead
/// of loading it eagerly.
pub async fn next_step(
    pool: &sqlx::PgPool,
    step_id: Uuid,
    passed: bool,
) -> Result<Option<Uuid>, PostgresError> {
    let column = if passed {
        "pass_next_step_id"
    } else {
        "fail_next_step_id"
    };
    let next: Option<Uuid> = sqlx::query_scalar(&format!(
        "SELECT {column} FROM dtc_diagnostic_steps WHERE id = $1"
    ))
    .bind(step_id)
    .fetch_optional(pool)
    .await?
    .flatten();
    Ok(next)
}

// =============================================================================
// Reference Entities and Links
// =============================================================================

/// Insert-or-lookup a sensor by name.
pub async fn upsert_sensor(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    sensor_type: Option<&str>,
    typical_range: Option<&str>,
    unit: Option<&str>,
) -> Result<(Uuid, bool), PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO sensors (id, name, sensor_type, typical_range, unit)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (lower(name)) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(name)
    .bind(sensor_type)
    .bind(typical_range)
    .bind(unit)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(sensor_id) = inserted {
        return Ok((sensor_id, true));
    }

    let sensor_id: Uuid =
        sqlx::query_scalar("SELECT id FROM sensors WHERE lower(name) = lower($1)")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
    Ok((sensor_id, false))
}

/// Upsert the DTC↔sensor junction row; returns its ID and creation flag.
pub async fn link_dtc_sensor(
    tx: &mut Transaction<'_, Postgres>,
    dtc_master_id: Uuid,
    sensor_id: Uuid,
) -> Result<(Uuid, bool), PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO dtc_related_sensors (id, dtc_master_id, sensor_id)
         VALUES ($1, $2, $3)
         ON CONFLICT (dtc_master_id, sensor_id) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(dtc_master_id)
    .bind(sensor_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(link_id) = inserted {
        return Ok((link_id, true));
    }

    let link_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM dtc_related_sensors WHERE dtc_master_id = $1 AND sensor_id = $2",
    )
    .bind(dtc_master_id)
    .bind(sensor_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok((link_id, false))
}

/// Insert-or-lookup a TSB bulletin by number.
pub async fn upsert_tsb(
    tx: &mut Transaction<'_, Postgres>,
    tsb_number: &str,
    title: Option<&str>,
    affected_models: Option<&str>,
    summary: Option<&str>,
) -> Result<(Uuid, bool), PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO tsb_bulletins (id, tsb_number, title, affected_models, summary)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (lower(tsb_number)) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(tsb_number)
    .bind(title)
    .bind(affected_models)
    .bind(summary)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(tsb_id) = inserted {
        return Ok((tsb_id, true));
    }

    let tsb_id: Uuid =
        sqlx::query_scalar("SELECT id FROM tsb_bulletins WHERE lower(tsb_number) = lower($1)")
            .bind(tsb_number)
            .fetch_one(&mut **tx)
            .await?;
    Ok((tsb_id, false))
}

/// Upsert the DTC↔TSB junction row.
pub async fn link_dtc_tsb(
    tx: &mut Transaction<'_, Postgres>,
    dtc_master_id: Uuid,
    tsb_id: Uuid,
) -> Result<(Uuid, bool), PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO dtc_tsb_links (id, dtc_master_id, tsb_id)
         VALUES ($1, $2, $3)
         ON CONFLICT (dtc_master_id, tsb_id) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(dtc_master_id)
    .bind(tsb_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(link_id) = inserted {
        return Ok((link_id, true));
    }

    let link_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM dtc_tsb_links WHERE dtc_master_id = $1 AND tsb_id = $2",
    )
    .bind(dtc_master_id)
    .bind(tsb_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok((link_id, false))
}
