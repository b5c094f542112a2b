//! SQLite-backed [`Store`] implementation.
//!
//! Column encodings: JSON values (payloads, source config, cursors) are
//! stored as TEXT, instants as RFC 3339 TEXT, calendar dates as
//! `YYYY-MM-DD`, and enums by their upper-case database spelling.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use poolwatch_core::cursor::CursorState;
use poolwatch_core::models::{
    Facility, FacilityInsert, FacilityKey, InspectionEvent, Jurisdiction, NewFacility,
    NewInspection, NewRawRecord, RawRecord, Source, SourceDefinition, SourceSyncOutcome, SyncCounts,
    SyncLog, SyncLogFinal, SyncStatus, SyncType,
};
use poolwatch_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
///
/// Uniqueness is left to the schema's constraints; a facility insert that
/// trips one is reported as a [`FacilityInsert`] conflict, not an error.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SOURCE_SELECT: &str = r#"
    SELECT s.id, s.jurisdiction_id, s.name, s.adapter_type, s.endpoint, s.config_json,
           s.requests_per_minute, s.is_active, s.cursor_json, s.last_sync_at,
           s.last_sync_status, s.last_sync_error, s.last_record_count,
           j.slug AS j_slug, j.name AS j_name, j.state AS j_state
    FROM sources s
    JOIN jurisdictions j ON j.id = s.jurisdiction_id
"#;

fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date in database: {}", s))
}

fn cursor_to_json(cursor: Option<&CursorState>) -> Result<Option<String>> {
    Ok(cursor.map(serde_json::to_string).transpose()?)
}

fn cursor_from_json(s: Option<String>) -> Result<Option<CursorState>> {
    Ok(s.as_deref().map(serde_json::from_str).transpose()?)
}

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    let config_json: String = row.get("config_json");
    let last_status: Option<String> = row.get("last_sync_status");
    let last_count: Option<i64> = row.get("last_record_count");
    let requests_per_minute: i64 = row.get("requests_per_minute");
    let adapter_type: String = row.get("adapter_type");
    Ok(Source {
        id: row.get("id"),
        jurisdiction: Jurisdiction {
            id: row.get("jurisdiction_id"),
            slug: row.get("j_slug"),
            name: row.get("j_name"),
            state: row.get("j_state"),
        },
        name: row.get("name"),
        adapter_type: adapter_type.parse()?,
        endpoint: row.get("endpoint"),
        config: serde_json::from_str(&config_json)?,
        requests_per_minute: requests_per_minute as u32,
        is_active: row.get("is_active"),
        cursor: cursor_from_json(row.get("cursor_json"))?,
        last_sync_at: parse_opt_ts(row.get("last_sync_at"))?,
        last_sync_status: last_status.as_deref().map(str::parse).transpose()?,
        last_sync_error: row.get("last_sync_error"),
        last_record_count: last_count.map(|n| n as u64),
    })
}

fn row_to_sync_log(row: &SqliteRow) -> Result<SyncLog> {
    let sync_type: String = row.get("sync_type");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let count = |col: &str| -> u64 { row.get::<i64, _>(col) as u64 };
    Ok(SyncLog {
        id: row.get("id"),
        source_id: row.get("source_id"),
        sync_type: sync_type.parse::<SyncType>()?,
        status: status.parse::<SyncStatus>()?,
        started_at: parse_ts(&started_at)?,
        completed_at: parse_opt_ts(row.get("completed_at"))?,
        counts: SyncCounts {
            fetched: count("records_fetched"),
            created: count("records_created"),
            updated: count("records_updated"),
            skipped: count("records_skipped"),
            failed: count("records_failed"),
        },
        cursor_before: cursor_from_json(row.get("cursor_before"))?,
        cursor_after: cursor_from_json(row.get("cursor_after"))?,
        error_message: row.get("error_message"),
    })
}

fn row_to_raw_record(row: &SqliteRow) -> Result<RawRecord> {
    let payload: String = row.get("payload_json");
    Ok(RawRecord {
        id: row.get("id"),
        source_id: row.get("source_id"),
        external_id: row.get("external_id"),
        payload: serde_json::from_str(&payload)?,
        payload_hash: row.get("payload_hash"),
        processed_at: parse_opt_ts(row.get("processed_at"))?,
    })
}

fn row_to_facility(row: &SqliteRow) -> Result<Facility> {
    let last_date: Option<String> = row.get("last_inspection_date");
    let total: i64 = row.get("total_inspections");
    Ok(Facility {
        id: row.get("id"),
        jurisdiction_id: row.get("jurisdiction_id"),
        normalized_name: row.get("normalized_name"),
        normalized_address: row.get("normalized_address"),
        slug: row.get("slug"),
        external_id: row.get("external_id"),
        raw_name: row.get("raw_name"),
        raw_address: row.get("raw_address"),
        display_name: row.get("display_name"),
        display_address: row.get("display_address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        last_inspection_date: last_date.as_deref().map(parse_day).transpose()?,
        last_inspection_result: row.get("last_inspection_result"),
        total_inspections: total as u64,
    })
}

fn row_to_inspection(row: &SqliteRow) -> Result<InspectionEvent> {
    let date: String = row.get("inspection_date");
    let inspection_type: Option<String> = row.get("inspection_type");
    let result: Option<String> = row.get("result");
    Ok(InspectionEvent {
        id: row.get("id"),
        facility_id: row.get("facility_id"),
        raw_record_id: row.get("raw_record_id"),
        inspection_date: parse_day(&date)?,
        raw_inspection_type: row.get("raw_inspection_type"),
        raw_result: row.get("raw_result"),
        raw_score: row.get("raw_score"),
        inspection_type: inspection_type.as_deref().map(str::parse).transpose()?,
        result: result.as_deref().map(str::parse).transpose()?,
        demerits: row.get("demerits"),
        is_closure: row.get("is_closure"),
        is_passing: row.get("is_passing"),
        source_url: row.get("source_url"),
        report_url: row.get("report_url"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_jurisdiction(&self, jurisdiction: &Jurisdiction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jurisdictions (id, slug, name, state)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                name = excluded.name,
                state = excluded.state
            "#,
        )
        .bind(&jurisdiction.id)
        .bind(&jurisdiction.slug)
        .bind(&jurisdiction.name)
        .bind(&jurisdiction.state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_source(&self, def: &SourceDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, jurisdiction_id, name, adapter_type, endpoint,
                                 config_json, requests_per_minute, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                jurisdiction_id = excluded.jurisdiction_id,
                name = excluded.name,
                adapter_type = excluded.adapter_type,
                endpoint = excluded.endpoint,
                config_json = excluded.config_json,
                requests_per_minute = excluded.requests_per_minute,
                is_active = excluded.is_active
            "#,
        )
        .bind(&def.id)
        .bind(&def.jurisdiction_id)
        .bind(&def.name)
        .bind(def.adapter_type.as_str())
        .bind(&def.endpoint)
        .bind(def.config.to_string())
        .bind(def.requests_per_minute as i64)
        .bind(def.is_active)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert source '{}'", def.id))?;
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let sql = format!("{} WHERE s.id = ?", SOURCE_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn list_sources(&self, active_only: bool) -> Result<Vec<Source>> {
        let sql = if active_only {
            format!("{} WHERE s.is_active = 1 ORDER BY s.id", SOURCE_SELECT)
        } else {
            format!("{} ORDER BY s.id", SOURCE_SELECT)
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_source).collect()
    }

    async fn save_cursor(&self, source_id: &str, cursor: Option<&CursorState>) -> Result<()> {
        let result = sqlx::query("UPDATE sources SET cursor_json = ? WHERE id = ?")
            .bind(cursor_to_json(cursor)?)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("Unknown source '{}'", source_id);
        }
        Ok(())
    }

    async fn record_sync_outcome(&self, source_id: &str, outcome: &SourceSyncOutcome) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sources SET
                last_sync_at = ?,
                last_sync_status = ?,
                last_sync_error = ?,
                last_record_count = ?
            WHERE id = ?
            "#,
        )
        .bind(outcome.at.to_rfc3339())
        .bind(outcome.status.as_str())
        .bind(&outcome.error)
        .bind(outcome.record_count as i64)
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("Unknown source '{}'", source_id);
        }
        Ok(())
    }

    async fn create_sync_log(
        &self,
        source_id: &str,
        sync_type: SyncType,
        cursor_before: Option<&CursorState>,
        started_at: DateTime<Utc>,
    ) -> Result<SyncLog> {
        let log = SyncLog {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            sync_type,
            status: SyncStatus::Running,
            started_at,
            completed_at: None,
            counts: SyncCounts::default(),
            cursor_before: cursor_before.cloned(),
            cursor_after: None,
            error_message: None,
        };
        sqlx::query(
            r#"
            INSERT INTO sync_logs (id, source_id, sync_type, status, started_at, cursor_before)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.source_id)
        .bind(sync_type.as_str())
        .bind(SyncStatus::Running.as_str())
        .bind(started_at.to_rfc3339())
        .bind(cursor_to_json(cursor_before)?)
        .execute(&self.pool)
        .await?;
        Ok(log)
    }

    async fn finalize_sync_log(&self, id: &str, fin: &SyncLogFinal) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs SET
                status = ?,
                completed_at = ?,
                records_fetched = ?,
                records_created = ?,
                records_updated = ?,
                records_skipped = ?,
                records_failed = ?,
                cursor_after = ?,
                error_message = ?
            WHERE id = ? AND status = 'RUNNING'
            "#,
        )
        .bind(fin.status.as_str())
        .bind(fin.completed_at.to_rfc3339())
        .bind(fin.counts.fetched as i64)
        .bind(fin.counts.created as i64)
        .bind(fin.counts.updated as i64)
        .bind(fin.counts.skipped as i64)
        .bind(fin.counts.failed as i64)
        .bind(cursor_to_json(fin.cursor_after.as_ref())?)
        .bind(&fin.error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.get_sync_log(id).await?.is_none() {
            bail!("Unknown sync log '{}'", id);
        }
        Ok(false)
    }

    async fn get_sync_log(&self, id: &str) -> Result<Option<SyncLog>> {
        let row = sqlx::query("SELECT * FROM sync_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_sync_log).transpose()
    }

    async fn list_sync_logs(&self, source_id: &str, limit: usize) -> Result<Vec<SyncLog>> {
        let rows = sqlx::query("SELECT * FROM sync_logs WHERE source_id = ? ORDER BY rowid DESC LIMIT ?")
            .bind(source_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_sync_log).collect()
    }

    async fn find_raw_record(
        &self,
        source_id: &str,
        external_id: &str,
    ) -> Result<Option<RawRecord>> {
        let row = sqlx::query("SELECT * FROM raw_records WHERE source_id = ? AND external_id = ?")
            .bind(source_id)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_raw_record).transpose()
    }

    async fn upsert_raw_record(&self, rec: &NewRawRecord) -> Result<RawRecord> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO raw_records (id, source_id, external_id, payload_json, payload_hash,
                                     processed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT(source_id, external_id) DO UPDATE SET
                payload_json = excluded.payload_json,
                payload_hash = excluded.payload_hash,
                processed_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&rec.source_id)
        .bind(&rec.external_id)
        .bind(rec.payload.to_string())
        .bind(&rec.payload_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        match self.find_raw_record(&rec.source_id, &rec.external_id).await? {
            Some(row) => Ok(row),
            None => bail!("Raw record '{}' vanished after upsert", rec.external_id),
        }
    }

    async fn mark_raw_record_processed(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE raw_records SET processed_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_facility(&self, key: &FacilityKey) -> Result<Option<Facility>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM facilities
            WHERE jurisdiction_id = ? AND normalized_name = ? AND normalized_address = ?
            "#,
        )
        .bind(&key.jurisdiction_id)
        .bind(&key.normalized_name)
        .bind(&key.normalized_address)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_facility).transpose()
    }

    async fn get_facility(&self, id: &str) -> Result<Option<Facility>> {
        let row = sqlx::query("SELECT * FROM facilities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_facility).transpose()
    }

    async fn list_facilities(&self, jurisdiction_id: &str) -> Result<Vec<Facility>> {
        let rows = sqlx::query("SELECT * FROM facilities WHERE jurisdiction_id = ? ORDER BY rowid")
            .bind(jurisdiction_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_facility).collect()
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM facilities WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_facility(&self, new: &NewFacility) -> Result<FacilityInsert> {
        // Identity wins over slug when both collide.
        if self.find_facility(&new.key).await?.is_some() {
            return Ok(FacilityInsert::IdentityConflict);
        }

        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        let inserted = sqlx::query(
            r#"
            INSERT INTO facilities (id, jurisdiction_id, normalized_name, normalized_address,
                                    slug, external_id, raw_name, raw_address, display_name,
                                    display_address, city, state, zip_code, latitude, longitude,
                                    total_inspections, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.key.jurisdiction_id)
        .bind(&new.key.normalized_name)
        .bind(&new.key.normalized_address)
        .bind(&new.slug)
        .bind(&new.external_id)
        .bind(&new.raw_name)
        .bind(&new.raw_address)
        .bind(&new.display_name)
        .bind(&new.display_address)
        .bind(&new.city)
        .bind(&new.state)
        .bind(&new.zip_code)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return if db.message().contains("facilities.slug") {
                    Ok(FacilityInsert::SlugConflict)
                } else {
                    Ok(FacilityInsert::IdentityConflict)
                };
            }
            Err(e) => return Err(e.into()),
        }

        match self.get_facility(&id).await? {
            Some(f) => Ok(FacilityInsert::Created(f)),
            None => bail!("Facility '{}' vanished after insert", id),
        }
    }

    async fn backfill_coordinates(
        &self,
        facility_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE facilities SET
                latitude = COALESCE(latitude, ?),
                longitude = COALESCE(longitude, ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(latitude)
        .bind(longitude)
        .bind(now_ts())
        .bind(facility_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_inspection(&self, new: &NewInspection) -> Result<InspectionEvent> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO inspection_events (id, facility_id, raw_record_id, inspection_date,
                                           raw_inspection_type, raw_result, raw_score,
                                           inspection_type, result, demerits, is_closure,
                                           is_passing, source_url, report_url,
                                           created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(raw_record_id) DO UPDATE SET
                facility_id = excluded.facility_id,
                inspection_date = excluded.inspection_date,
                raw_inspection_type = excluded.raw_inspection_type,
                raw_result = excluded.raw_result,
                raw_score = excluded.raw_score,
                inspection_type = excluded.inspection_type,
                result = excluded.result,
                demerits = excluded.demerits,
                is_closure = excluded.is_closure,
                is_passing = excluded.is_passing,
                source_url = excluded.source_url,
                report_url = excluded.report_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&new.facility_id)
        .bind(&new.raw_record_id)
        .bind(format_date(new.inspection_date))
        .bind(&new.raw_inspection_type)
        .bind(&new.raw_result)
        .bind(&new.raw_score)
        .bind(new.inspection_type.map(|t| t.as_str()))
        .bind(new.result.map(|r| r.as_str()))
        .bind(new.demerits)
        .bind(new.is_closure)
        .bind(new.is_passing)
        .bind(&new.source_url)
        .bind(&new.report_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        match self.get_inspection_by_raw_record(&new.raw_record_id).await? {
            Some(event) => Ok(event),
            None => bail!("Inspection for raw record '{}' vanished after upsert", new.raw_record_id),
        }
    }

    async fn get_inspection_by_raw_record(
        &self,
        raw_record_id: &str,
    ) -> Result<Option<InspectionEvent>> {
        let row = sqlx::query("SELECT * FROM inspection_events WHERE raw_record_id = ?")
            .bind(raw_record_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_inspection).transpose()
    }

    async fn list_inspections(&self, facility_id: &str) -> Result<Vec<InspectionEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM inspection_events WHERE facility_id = ? ORDER BY inspection_date DESC, rowid ASC",
        )
        .bind(facility_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_inspection).collect()
    }

    async fn refresh_facility_stats(&self, facility_id: &str) -> Result<Facility> {
        let mut tx = self.pool.begin().await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inspection_events WHERE facility_id = ?")
                .bind(facility_id)
                .fetch_one(&mut *tx)
                .await?;

        // Latest date wins; a same-day tie goes to the most recently inserted row.
        let latest = sqlx::query(
            r#"
            SELECT inspection_date, raw_result FROM inspection_events
            WHERE facility_id = ?
            ORDER BY inspection_date DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(facility_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (last_date, last_result): (Option<String>, Option<String>) = match latest {
            Some(row) => (Some(row.get("inspection_date")), row.get("raw_result")),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE facilities SET
                total_inspections = ?,
                last_inspection_date = ?,
                last_inspection_result = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(total)
        .bind(last_date)
        .bind(last_result)
        .bind(now_ts())
        .bind(facility_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            bail!("Unknown facility '{}'", facility_id);
        }

        tx.commit().await?;

        match self.get_facility(facility_id).await? {
            Some(f) => Ok(f),
            None => bail!("Unknown facility '{}'", facility_id),
        }
    }
}
