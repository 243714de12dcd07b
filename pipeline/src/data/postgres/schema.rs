//! PostgreSQL schema definition and versioned apply
//!
//! Three areas share one database: pipeline state (documents, crawl
//! requests, chunks, evaluations), the staging area the extract stage fills,
//! and the normalized knowledge graph with its provenance and log tables.
//! [`apply`] brings a database to the current level: the base schema goes
//! in whole on a fresh install, then the [`MIGRATIONS`] table of versioned
//! statements runs in order on top.
//!
//! Conventions:
//! - UUID primary keys generated by the application; log tables use
//!   `BIGSERIAL` since nothing references them.
//! - Text entities dedup on `(dtc_master_id, lower(text))` unique indexes;
//!   the application fingerprints text the same way before comparing.
//! - `dtc_entity_sources` is append-only and cascades only from chunks, so
//!   deleting a document removes provenance but never knowledge rows.

use sqlx::PgPool;

use super::error::PostgresError;

/// Schema level this build expects
pub const SCHEMA_VERSION: i32 = 2;

/// Versioned changes layered over the base schema, in ascending order.
/// Every statement must be safe to re-run (a crash between a migration and
/// its version bump replays it on the next start).
const MIGRATIONS: &[(i32, &str, &str)] = &[(
    2,
    "document_category",
    // The extract stage records the dominant document category; documents
    // ingested before that existed carry NULL.
    "ALTER TABLE documents ADD COLUMN IF NOT EXISTS category TEXT",
)];

/// Base schema (version 1)
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Pipeline State
-- =============================================================================

CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    source_url TEXT,
    content_hash TEXT NOT NULL UNIQUE,
    mime_type TEXT NOT NULL,
    blob_location TEXT NOT NULL,
    processing_stage TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_documents_stage
    ON documents (processing_stage, updated_at);

CREATE TABLE IF NOT EXISTS crawl_requests (
    id UUID PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    depth INTEGER NOT NULL DEFAULT 0,
    max_depth INTEGER NOT NULL DEFAULT 1,
    parent_url TEXT,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_crawl_requests_status ON crawl_requests (status);

CREATE TABLE IF NOT EXISTS chunks (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    token_count INTEGER NOT NULL,
    embedding REAL[],
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (document_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS chunk_evaluations (
    chunk_id UUID PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    automotive_domain TEXT NOT NULL,
    reasoning TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- =============================================================================
-- Staging Area (extract-stage output, non-normalized)
-- =============================================================================

CREATE TABLE IF NOT EXISTS staging_dtc_codes (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    code TEXT NOT NULL,
    description TEXT,
    category TEXT,
    severity TEXT,
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_staging_dtc_codes_doc ON staging_dtc_codes (document_id);

CREATE TABLE IF NOT EXISTS staging_causes (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    dtc_code TEXT NOT NULL,
    description TEXT NOT NULL,
    likelihood TEXT,
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_staging_causes_doc ON staging_causes (document_id);

CREATE TABLE IF NOT EXISTS staging_diagnostic_steps (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    dtc_code TEXT NOT NULL,
    step_order INTEGER NOT NULL DEFAULT 1,
    description TEXT NOT NULL,
    tools_required TEXT,
    expected_values TEXT,
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_staging_steps_doc ON staging_diagnostic_steps (document_id);

CREATE TABLE IF NOT EXISTS staging_sensors (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    sensor_type TEXT,
    typical_range TEXT,
    unit TEXT,
    related_dtc_codes TEXT[] NOT NULL DEFAULT '{}',
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_staging_sensors_doc ON staging_sensors (document_id);

CREATE TABLE IF NOT EXISTS staging_tsb_references (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    tsb_number TEXT NOT NULL,
    title TEXT,
    affected_models TEXT,
    related_dtc_codes TEXT[] NOT NULL DEFAULT '{}',
    summary TEXT,
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_staging_tsbs_doc ON staging_tsb_references (document_id);

CREATE TABLE IF NOT EXISTS staging_vehicles (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    make TEXT NOT NULL,
    model TEXT,
    year_start INTEGER,
    year_end INTEGER,
    engine TEXT,
    transmission TEXT,
    related_dtc_codes TEXT[] NOT NULL DEFAULT '{}',
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_staging_vehicles_doc ON staging_vehicles (document_id);

-- =============================================================================
-- Knowledge Graph
-- =============================================================================

CREATE TABLE IF NOT EXISTS dtc_master (
    id UUID PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    generic_description TEXT,
    category TEXT,
    severity_level TEXT,
    confidence_score DOUBLE PRECISION NOT NULL DEFAULT 0,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS dtc_possible_causes (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    likelihood TEXT,
    probability_weight DOUBLE PRECISION NOT NULL DEFAULT 0.5,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_dtc_causes_text
    ON dtc_possible_causes (dtc_master_id, lower(description));

CREATE TABLE IF NOT EXISTS dtc_diagnostic_steps (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    step_order INTEGER NOT NULL DEFAULT 1,
    instruction TEXT NOT NULL,
    tools_required TEXT,
    expected_values TEXT,
    pass_next_step_id UUID REFERENCES dtc_diagnostic_steps(id),
    fail_next_step_id UUID REFERENCES dtc_diagnostic_steps(id),
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_dtc_steps_text
    ON dtc_diagnostic_steps (dtc_master_id, lower(instruction));

CREATE TABLE IF NOT EXISTS dtc_symptoms (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    frequency_score INTEGER NOT NULL DEFAULT 0,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_dtc_symptoms_text
    ON dtc_symptoms (dtc_master_id, lower(description));

CREATE TABLE IF NOT EXISTS dtc_verified_fixes (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    confirmed_repairs INTEGER NOT NULL DEFAULT 0,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_dtc_fixes_text
    ON dtc_verified_fixes (dtc_master_id, lower(description));

CREATE TABLE IF NOT EXISTS dtc_live_data_parameters (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    parameter_name TEXT NOT NULL,
    typical_range TEXT,
    unit TEXT,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_dtc_live_data_text
    ON dtc_live_data_parameters (dtc_master_id, lower(parameter_name));

-- =============================================================================
-- Reference Tables
-- =============================================================================

CREATE TABLE IF NOT EXISTS vehicle_makes (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_vehicle_makes_name ON vehicle_makes (lower(name));

CREATE TABLE IF NOT EXISTS vehicle_models (
    id UUID PRIMARY KEY,
    make_id UUID NOT NULL REFERENCES vehicle_makes(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    year_start INTEGER,
    year_end INTEGER,
    engine TEXT,
    transmission TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_vehicle_models_name
    ON vehicle_models (make_id, lower(name));

CREATE TABLE IF NOT EXISTS parts (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    part_number TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_parts_name ON parts (lower(name));

CREATE TABLE IF NOT EXISTS sensors (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    sensor_type TEXT,
    typical_range TEXT,
    unit TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_sensors_name ON sensors (lower(name));

CREATE TABLE IF NOT EXISTS tsb_bulletins (
    id UUID PRIMARY KEY,
    tsb_number TEXT NOT NULL,
    title TEXT,
    affected_models TEXT,
    summary TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_tsb_number ON tsb_bulletins (lower(tsb_number));

CREATE TABLE IF NOT EXISTS forum_threads (
    id UUID PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    solution_marked BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- =============================================================================
-- Junctions
-- =============================================================================

CREATE TABLE IF NOT EXISTS dtc_related_parts (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    part_id UUID NOT NULL REFERENCES parts(id) ON DELETE CASCADE,
    confirmed_repairs INTEGER NOT NULL DEFAULT 0,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (dtc_master_id, part_id)
);

CREATE TABLE IF NOT EXISTS dtc_related_sensors (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    sensor_id UUID NOT NULL REFERENCES sensors(id) ON DELETE CASCADE,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    conflict_flag BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (dtc_master_id, sensor_id)
);

CREATE TABLE IF NOT EXISTS dtc_tsb_links (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    tsb_id UUID NOT NULL REFERENCES tsb_bulletins(id) ON DELETE CASCADE,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    avg_trust DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_relevance DOUBLE PRECISION NOT NULL DEFAULT 0,
    UNIQUE (dtc_master_id, tsb_id)
);

CREATE TABLE IF NOT EXISTS dtc_vehicles (
    id UUID PRIMARY KEY,
    dtc_master_id UUID NOT NULL REFERENCES dtc_master(id) ON DELETE CASCADE,
    model_id UUID NOT NULL REFERENCES vehicle_models(id) ON DELETE CASCADE,
    year_start INTEGER,
    year_end INTEGER,
    evidence_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (dtc_master_id, model_id)
);

-- =============================================================================
-- Provenance and Audit (append-only)
-- =============================================================================

CREATE TABLE IF NOT EXISTS dtc_entity_sources (
    id BIGSERIAL PRIMARY KEY,
    entity_table TEXT NOT NULL,
    entity_id UUID NOT NULL,
    chunk_id UUID NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    trust_score DOUBLE PRECISION NOT NULL,
    relevance_score DOUBLE PRECISION NOT NULL,
    extracted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (entity_table, entity_id, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_entity_sources_entity
    ON dtc_entity_sources (entity_table, entity_id);

CREATE TABLE IF NOT EXISTS resolution_log (
    id BIGSERIAL PRIMARY KEY,
    run_id UUID NOT NULL,
    document_id UUID NOT NULL,
    entity_table TEXT,
    entity_id UUID,
    action TEXT NOT NULL,
    details TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_resolution_log_run ON resolution_log (run_id);

CREATE TABLE IF NOT EXISTS processing_log (
    id BIGSERIAL PRIMARY KEY,
    document_id UUID NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    duration_ms BIGINT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_processing_log_doc ON processing_log (document_id);
"#;

/// Bring the database to [`SCHEMA_VERSION`].
///
/// Fresh databases get the base schema and then every migration; existing
/// ones get only the migrations past their recorded version. A database
/// recorded at a version newer than this build is left alone.
pub async fn apply(pool: &PgPool) -> Result<(), PostgresError> {
    let from = match installed_version(pool).await? {
        Some(version) if version > SCHEMA_VERSION => {
            tracing::warn!(
                installed = version,
                supported = SCHEMA_VERSION,
                "Database schema is newer than this build; leaving it untouched"
            );
            return Ok(());
        }
        Some(version) => version,
        None => {
            sqlx::query(SCHEMA).execute(pool).await?;
            sqlx::query(
                "INSERT INTO schema_version (id, version, applied_at) VALUES (1, 1, $1)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(chrono::Utc::now().timestamp())
            .execute(pool)
            .await?;
            tracing::debug!("Base schema installed");
            1
        }
    };

    for (version, name, sql) in MIGRATIONS {
        if *version <= from {
            continue;
        }
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::MigrationFailed {
                version: *version,
                name: (*name).to_string(),
                error: e.to_string(),
            })?;
        sqlx::query("UPDATE schema_version SET version = $1, applied_at = $2 WHERE id = 1")
            .bind(*version)
            .bind(chrono::Utc::now().timestamp())
            .execute(pool)
            .await?;
        tracing::debug!(version = *version, name = *name, "Schema migration applied");
    }

    if from < SCHEMA_VERSION {
        tracing::debug!(version = SCHEMA_VERSION, "Schema is current");
    }
    Ok(())
}

/// The recorded schema version, or `None` on a fresh database.
async fn installed_version(pool: &PgPool) -> Result<Option<i32>, PostgresError> {
    let version_table: Option<String> =
        sqlx::query_scalar("SELECT to_regclass('public.schema_version')::text")
            .fetch_one(pool)
            .await?;
    if version_table.is_none() {
        return Ok(None);
    }
    let version = sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_covers_knowledge_tables() {
        for table in [
            "dtc_master",
            "dtc_possible_causes",
            "dtc_diagnostic_steps",
            "dtc_symptoms",
            "dtc_verified_fixes",
            "dtc_related_parts",
            "dtc_related_sensors",
            "dtc_live_data_parameters",
            "dtc_entity_sources",
            "resolution_log",
            "processing_log",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "schema missing {}",
                table
            );
        }
    }

    #[test]
    fn test_text_entities_dedup_on_lowercase() {
        assert!(SCHEMA.contains("ON dtc_possible_causes (dtc_master_id, lower(description))"));
        assert!(SCHEMA.contains("ON dtc_diagnostic_steps (dtc_master_id, lower(instruction))"));
    }

    #[test]
    fn test_provenance_unique_key() {
        assert!(SCHEMA.contains("UNIQUE (entity_table, entity_id, chunk_id)"));
    }

    #[test]
    fn test_chunks_unique_per_document() {
        assert!(SCHEMA.contains("UNIQUE (document_id, chunk_index)"));
    }

    #[test]
    fn test_migrations_are_ordered_and_end_at_current_version() {
        let mut last = 1;
        for (version, name, _) in MIGRATIONS {
            assert!(*version > last, "migration {} out of order", name);
            last = *version;
        }
        assert_eq!(last, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_rerun_safe() {
        // A crash between a migration and its version bump replays it.
        for (version, _, sql) in MIGRATIONS {
            assert!(
                sql.contains("IF NOT EXISTS") || sql.contains("IF EXISTS"),
                "migration v{} is not re-run safe",
                version
            );
        }
    }

    #[test]
    fn test_category_column_arrives_by_migration() {
        let documents_block = SCHEMA
            .split("CREATE TABLE IF NOT EXISTS documents")
            .nth(1)
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert!(!documents_block.contains("category"));
        assert!(
            MIGRATIONS
                .iter()
                .any(|(_, name, sql)| *name == "document_category"
                    && sql.contains("ADD COLUMN IF NOT EXISTS category"))
        );
    }
}
