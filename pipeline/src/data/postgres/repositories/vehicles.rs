//! Vehicle reference tables and DTC↔vehicle linkage

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::data::postgres::PostgresError;

/// Insert-or-lookup a make by name.
pub async fn upsert_make(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> Result<Uuid, PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO vehicle_makes (id, name)
         VALUES ($1, $2)
         ON CONFLICT (lower(name)) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(make_id) = inserted {
        return Ok(make_id);
    }

    let make_id: Uuid =
        sqlx::query_scalar("SELECT id FROM vehicle_makes WHERE lower(name) = lower($1)")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
    Ok(make_id)
}

/// Resolve a mention to a canonical model row: exact `(make, model)` match
/// with overlapping years wins; otherwise a new row is created.
pub async fn resolve_model(
    tx: &mut Transaction<'_, Postgres>,
    make_id: Uuid,
    name: &str,
    year_start: Option<i32>,
    year_end: Option<i32>,
    engine: Option<&str>,
    transmission: Option<&str>,
) -> Result<(Uuid, bool), PostgresError> {
    let existing: Option<(Uuid, Option<i32>, Option<i32>)> = sqlx::query_as(
        "SELECT id, year_start, year_end FROM vehicle_models
         WHERE make_id = $1 AND lower(name) = lower($2)",
    )
    .bind(make_id)
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((model_id, existing_start, existing_end)) = existing {
        let overlap = ranges_overlap(year_start, year_end, existing_start, existing_end);
        if overlap {
            // Widen the canonical range to cover the new observation.
            let merged_start = merge_min(existing_start, year_start);
            let merged_end = merge_max(existing_end, year_end);
            sqlx::query(
                "UPDATE vehicle_models SET year_start = $2, year_end = $3 WHERE id = $1",
            )
            .bind(model_id)
            .bind(merged_start)
            .bind(merged_end)
            .execute(&mut **tx)
            .await?;
            return Ok((model_id, false));
        }
        // Same name but disjoint years: the unique index keys on name, so
        // widen rather than split generations.
        let merged_start = merge_min(existing_start, year_start);
        let merged_end = merge_max(existing_end, year_end);
        sqlx::query("UPDATE vehicle_models SET year_start = $2, year_end = $3 WHERE id = $1")
            .bind(model_id)
            .bind(merged_start)
            .bind(merged_end)
            .execute(&mut **tx)
            .await?;
        return Ok((model_id, false));
    }

    let model_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO vehicle_models (id, make_id, name, year_start, year_end, engine, transmission)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (make_id, lower(name)) DO NOTHING",
    )
    .bind(model_id)
    .bind(make_id)
    .bind(name)
    .bind(year_start)
    .bind(year_end)
    .bind(engine)
    .bind(transmission)
    .execute(&mut **tx)
    .await?;

    // A concurrent insert can win the race; re-read the canonical row.
    let canonical: Uuid = sqlx::query_scalar(
        "SELECT id FROM vehicle_models WHERE make_id = $1 AND lower(name) = lower($2)",
    )
    .bind(make_id)
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;
    Ok((canonical, canonical == model_id))
}

fn ranges_overlap(
    start_a: Option<i32>,
    end_a: Option<i32>,
    start_b: Option<i32>,
    end_b: Option<i32>,
) -> bool {
    let sa = start_a.unwrap_or(i32::MIN);
    let ea = end_a.unwrap_or(i32::MAX);
    let sb = start_b.unwrap_or(i32::MIN);
    let eb = end_b.unwrap_or(i32::MAX);
    sa <= eb && sb <= ea
}

fn merge_min(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        _ => None,
    }
}

fn merge_max(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// Upsert the DTC↔vehicle junction. Evidence is bumped separately so a
/// replayed run (whose provenance rows dedup away) adds nothing.
pub async fn link_dtc_vehicle(
    tx: &mut Transaction<'_, Postgres>,
    dtc_master_id: Uuid,
    model_id: Uuid,
    year_start: Option<i32>,
    year_end: Option<i32>,
) -> Result<(Uuid, bool), PostgresError> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO dtc_vehicles (id, dtc_master_id, model_id, year_start, year_end, evidence_count)
         VALUES ($1, $2, $3, $4, $5, 0)
         ON CONFLICT (dtc_master_id, model_id) DO NOTHING
         RETURNING id",
    )
    .bind(id)
    .bind(dtc_master_id)
    .bind(model_id)
    .bind(year_start)
    .bind(year_end)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(link_id) = inserted {
        return Ok((link_id, true));
    }

    let link_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM dtc_vehicles WHERE dtc_master_id = $1 AND model_id = $2",
    )
    .bind(dtc_master_id)
    .bind(model_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok((link_id, false))
}

/// Add newly observed evidence to a vehicle link.
pub async fn bump_vehicle_evidence(
    tx: &mut Transaction<'_, Postgres>,
    link_id: Uuid,
    new_evidence: i64,
) -> Result<(), PostgresError> {
    if new_evidence <= 0 {
        return Ok(());
    }
    sqlx::query("UPDATE dtc_vehicles SET evidence_count = evidence_count + $2 WHERE id = $1")
        .bind(link_id)
        .bind(new_evidence as i32)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_overlap() {
        assert!(ranges_overlap(Some(2010), Some(2014), Some(2014), Some(2018)));
        assert!(!ranges_overlap(Some(2010), Some(2014), Some(2015), Some(2018)));
        assert!(ranges_overlap(None, None, Some(2015), Some(2018)));
    }

    #[test]
    fn test_merge_bounds() {
        assert_eq!(merge_min(Some(2010), Some(2008)), Some(2008));
        assert_eq!(merge_max(Some(2014), Some(2018)), Some(2018));
        // An open end stays open
        assert_eq!(merge_min(None, Some(2010)), None);
        assert_eq!(merge_max(Some(2014), None), None);
    }
}
