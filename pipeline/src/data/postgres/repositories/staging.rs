//! Staging-area repository
//!
//! The extract stage writes per-chunk rows here; Resolve reads them back
//! grouped by document. Every row inherits its chunk's trust and relevance
//! at extraction time, which is what the scoring engine aggregates.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::data::postgres::PostgresError;
use crate::domain::extraction::{
    ExtractedCause, ExtractedDtc, ExtractedSensor, ExtractedStep, ExtractedTsb, ExtractedVehicle,
};

/// Chunk provenance carried by every staged row.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProvenance {
    pub chunk_id: Uuid,
    pub trust_score: f64,
    pub relevance_score: f64,
}

// =============================================================================
// Writes (extract stage)
// =============================================================================

pub async fn stage_dtc_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    provenance: ChunkProvenance,
    dtc: &ExtractedDtc,
) -> Result<(), PostgresError> {
    sqlx::query(
        "INSERT INTO staging_dtc_codes
             (id, document_id, chunk_id, code, description, category, severity, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(provenance.chunk_id)
    .bind(dtc.code.as_str())
    .bind(dtc.description.as_deref())
    .bind(dtc.category.as_deref())
    .bind(dtc.severity.map(|s| s.as_str()))
    .bind(provenance.trust_score)
    .bind(provenance.relevance_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn stage_cause_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    provenance: ChunkProvenance,
    cause: &ExtractedCause,
) -> Result<(), PostgresError> {
    sqlx::query(
        "INSERT INTO staging_causes
             (id, document_id, chunk_id, dtc_code, description, likelihood, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(provenance.chunk_id)
    .bind(cause.dtc_code.as_str())
    .bind(&cause.description)
    .bind(cause.likelihood.map(|l| l.as_str()))
    .bind(provenance.trust_score)
    .bind(provenance.relevance_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn stage_step_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    provenance: ChunkProvenance,
    step: &ExtractedStep,
) -> Result<(), PostgresError> {
    sqlx::query(
        "INSERT INTO staging_diagnostic_steps
             (id, document_id, chunk_id, dtc_code, step_order, description, tools_required, expected_values, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(provenance.chunk_id)
    .bind(step.dtc_code.as_str())
    .bind(step.step_order)
    .bind(&step.description)
    .bind(step.tools_required.as_deref())
    .bind(step.expected_values.as_deref())
    .bind(provenance.trust_score)
    .bind(provenance.relevance_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn stage_sensor_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    provenance: ChunkProvenance,
    sensor: &ExtractedSensor,
) -> Result<(), PostgresError> {
    let codes: Vec<String> = sensor
        .related_dtc_codes
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    sqlx::query(
        "INSERT INTO staging_sensors
             (id, document_id, chunk_id, name, sensor_type, typical_range, unit, related_dtc_codes, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(provenance.chunk_id)
    .bind(&sensor.name)
    .bind(sensor.sensor_type.as_deref())
    .bind(sensor.typical_range.as_deref())
    .bind(sensor.unit.as_deref())
    .bind(&codes)
    .bind(provenance.trust_score)
    .bind(provenance.relevance_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn stage_tsb_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    provenance: ChunkProvenance,
    tsb: &ExtractedTsb,
) -> Result<(), PostgresError> {
    let codes: Vec<String> = tsb
        .related_dtc_codes
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    sqlx::query(
        "INSERT INTO staging_tsb_references
             (id, document_id, chunk_id, tsb_number, title, affected_models, related_dtc_codes, summary, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(provenance.chunk_id)
    .bind(&tsb.tsb_number)
    .bind(tsb.title.as_deref())
    .bind(tsb.affected_models.as_deref())
    .bind(&codes)
    .bind(tsb.summary.as_deref())
    .bind(provenance.trust_score)
    .bind(provenance.relevance_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn stage_vehicle_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
    provenance: ChunkProvenance,
    vehicle: &ExtractedVehicle,
) -> Result<(), PostgresError> {
    let codes: Vec<String> = vehicle
        .related_dtc_codes
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    sqlx::query(
        "INSERT INTO staging_vehicles
             (id, document_id, chunk_id, make, model, year_start, year_end, engine, transmission, related_dtc_codes, trust_score, relevance_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(Uuid::new_v4())
    .bind(document_id)
    .bind(provenance.chunk_id)
    .bind(&vehicle.make)
    .bind(vehicle.model.as_deref())
    .bind(vehicle.year_start)
    .bind(vehicle.year_end)
    .bind(vehicle.engine.as_deref())
    .bind(vehicle.transmission.as_deref())
    .bind(&codes)
    .bind(provenance.trust_score)
    .bind(provenance.relevance_score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Clear a document's staged rows so a replayed extract job cannot double
/// its extractions.
pub async fn clear_document_tx(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Uuid,
) -> Result<(), PostgresError> {
    for table in [
        "staging_dtc_codes",
        "staging_causes",
        "staging_diagnostic_steps",
        "staging_sensors",
        "staging_tsb_references",
        "staging_vehicles",
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE document_id = $1", table))
            .bind(document_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

// =============================================================================
// Reads (resolve stage)
// =============================================================================

#[derive(Debug, Clone)]
pub struct StagedDtc {
    pub chunk_id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub trust_score: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct StagedCause {
    pub chunk_id: Uuid,
    pub dtc_code: String,
    pub description: String,
    pub likelihood: Option<String>,
    pub trust_score: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct StagedStep {
    pub chunk_id: Uuid,
    pub dtc_code: String,
    pub step_order: i32,
    pub description: String,
    pub tools_required: Option<String>,
    pub expected_values: Option<String>,
    pub trust_score: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct StagedSensor {
    pub chunk_id: Uuid,
    pub name: String,
    pub sensor_type: Option<String>,
    pub typical_range: Option<String>,
    pub unit: Option<String>,
    pub related_dtc_codes: Vec<String>,
    pub trust_score: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct StagedTsb {
    pub chunk_id: Uuid,
    pub tsb_number: String,
    pub title: Option<String>,
    pub affected_models: Option<String>,
    pub related_dtc_codes: Vec<String>,
    pub summary: Option<String>,
    pub trust_score: f64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct StagedVehicle {
    pub chunk_id: Uuid,
    pub make: String,
    pub model: Option<String>,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub engine: Option<String>,
    pub transmission: Option<String>,
    pub related_dtc_codes: Vec<String>,
    pub trust_score: f64,
    pub relevance_score: f64,
}

/// Everything staged for one document.
#[derive(Debug, Clone, Default)]
pub struct StagedDocument {
    pub dtc_codes: Vec<StagedDtc>,
    pub causes: Vec<StagedCause>,
    pub steps: Vec<StagedStep>,
    pub sensors: Vec<StagedSensor>,
    pub tsbs: Vec<StagedTsb>,
    pub vehicles: Vec<StagedVehicle>,
}

impl StagedDocument {
    pub fn is_empty(&self) -> bool {
        self.dtc_codes.is_empty()
            && self.causes.is_empty()
            && self.steps.is_empty()
            && self.sensors.is_empty()
            && self.tsbs.is_empty()
            && self.vehicles.is_empty()
    }
}

/// Load all staged rows for a document. Ordered by insertion (chunk, then
/// creation) so downstream grouping is reproducible.
pub async fn load_document(
    pool: &PgPool,
    document_id: Uuid,
) -> Result<StagedDocument, PostgresError> {
    let dtc_codes = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>, Option<String>, f64, f64)>(
        "SELECT chunk_id, code, description, category, severity, trust_score, relevance_score
         FROM staging_dtc_codes WHERE document_id = $1 ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(chunk_id, code, description, category, severity, trust_score, relevance_score)| StagedDtc {
        chunk_id,
        code,
        description,
        category,
        severity,
        trust_score,
        relevance_score,
    })
    .collect();

    let causes = sqlx::query_as::<_, (Uuid, String, String, Option<String>, f64, f64)>(
        "SELECT chunk_id, dtc_code, description, likelihood, trust_score, relevance_score
         FROM staging_causes WHERE document_id = $1 ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(chunk_id, dtc_code, description, likelihood, trust_score, relevance_score)| StagedCause {
        chunk_id,
        dtc_code,
        description,
        likelihood,
        trust_score,
        relevance_score,
    })
    .collect();

    let steps = sqlx::query_as::<_, (Uuid, String, i32, String, Option<String>, Option<String>, f64, f64)>(
        "SELECT chunk_id, dtc_code, step_order, description, tools_required, expected_values, trust_score, relevance_score
         FROM staging_diagnostic_steps WHERE document_id = $1 ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(chunk_id, dtc_code, step_order, description, tools_required, expected_values, trust_score, relevance_score)| StagedStep {
            chunk_id,
            dtc_code,
            step_order,
            description,
            tools_required,
            expected_values,
            trust_score,
            relevance_score,
        },
    )
    .collect();

    let sensors = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>, Option<String>, Vec<String>, f64, f64)>(
        "SELECT chunk_id, name, sensor_type, typical_range, unit, related_dtc_codes, trust_score, relevance_score
         FROM staging_sensors WHERE document_id = $1 ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(chunk_id, name, sensor_type, typical_range, unit, related_dtc_codes, trust_score, relevance_score)| StagedSensor {
            chunk_id,
            name,
            sensor_type,
            typical_range,
            unit,
            related_dtc_codes,
            trust_score,
            relevance_score,
        },
    )
    .collect();

    let tsbs = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>, Vec<String>, Option<String>, f64, f64)>(
        "SELECT chunk_id, tsb_number, title, affected_models, related_dtc_codes, summary, trust_score, relevance_score
         FROM staging_tsb_references WHERE document_id = $1 ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(chunk_id, tsb_number, title, affected_models, related_dtc_codes, summary, trust_score, relevance_score)| StagedTsb {
            chunk_id,
            tsb_number,
            title,
            affected_models,
            related_dtc_codes,
            summary,
            trust_score,
            relevance_score,
        },
    )
    .collect();

    let vehicles = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<i32>, Option<i32>, Option<String>, Option<String>, Vec<String>, f64, f64)>(
        "SELECT chunk_id, make, model, year_start, year_end, engine, transmission, related_dtc_codes, trust_score, relevance_score
         FROM staging_vehicles WHERE document_id = $1 ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(chunk_id, make, model, year_start, year_end, engine, transmission, related_dtc_codes, trust_score, relevance_score)| StagedVehicle {
            chunk_id,
            make,
            model,
            year_start,
            year_end,
            engine,
            transmission,
            related_dtc_codes,
            trust_score,
            relevance_score,
        },
    )
    .collect();

    Ok(StagedDocument {
        dtc_codes,
        causes,
        steps,
        sensors,
        tsbs,
        vehicles,
    })
}
