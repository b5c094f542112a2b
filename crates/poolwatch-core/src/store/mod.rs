//! Storage abstraction for Poolwatch.
//!
//! The [`Store`] trait covers everything the ingestion pipeline persists:
//! source state and cursors, sync audit logs, raw payloads, facilities and
//! inspection events. Backends must be `Send + Sync` so independent sources
//! can be ingested from concurrent tasks against one store.
//!
//! Uniqueness is enforced by the backend, not by callers:
//!
//! - raw records are unique on `(source_id, external_id)`
//! - facilities are unique on [`FacilityKey`] and, separately, on slug
//! - inspection events are unique on `raw_record_id`

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cursor::CursorState;
use crate::models::{
    Facility, FacilityInsert, FacilityKey, InspectionEvent, Jurisdiction, NewFacility,
    NewInspection, NewRawRecord, RawRecord, Source, SourceDefinition, SourceSyncOutcome, SyncLog,
    SyncLogFinal, SyncType,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_source`](Store::upsert_source) | Register or reconfigure a source |
/// | [`save_cursor`](Store::save_cursor) | Persist pagination state after a batch |
/// | [`record_sync_outcome`](Store::record_sync_outcome) | Write last-sync fields at run end |
/// | [`create_sync_log`](Store::create_sync_log) / [`finalize_sync_log`](Store::finalize_sync_log) | Append-only run audit |
/// | [`upsert_raw_record`](Store::upsert_raw_record) | Store a payload and its hash |
/// | [`insert_facility`](Store::insert_facility) | Optimistic facility creation |
/// | [`upsert_inspection`](Store::upsert_inspection) | 1:1 inspection per raw record |
/// | [`refresh_facility_stats`](Store::refresh_facility_stats) | Recompute facility aggregates |
#[async_trait]
pub trait Store: Send + Sync {
    // ── Sources ─────────────────────────────────────────────────────────

    async fn upsert_jurisdiction(&self, jurisdiction: &Jurisdiction) -> Result<()>;

    /// Insert or update the configured fields of a source.
    ///
    /// Cursor and last-sync fields of an existing source are left alone.
    async fn upsert_source(&self, def: &SourceDefinition) -> Result<()>;

    async fn get_source(&self, id: &str) -> Result<Option<Source>>;

    /// All sources ordered by id, optionally only the active ones.
    async fn list_sources(&self, active_only: bool) -> Result<Vec<Source>>;

    async fn save_cursor(&self, source_id: &str, cursor: Option<&CursorState>) -> Result<()>;

    async fn record_sync_outcome(&self, source_id: &str, outcome: &SourceSyncOutcome) -> Result<()>;

    // ── Sync logs ───────────────────────────────────────────────────────

    /// Open a `Running` log for a run that is about to start.
    async fn create_sync_log(
        &self,
        source_id: &str,
        sync_type: SyncType,
        cursor_before: Option<&CursorState>,
        started_at: DateTime<Utc>,
    ) -> Result<SyncLog>;

    /// Close a running log.
    ///
    /// Returns `false` without writing if the log was already finalized.
    async fn finalize_sync_log(&self, id: &str, fin: &SyncLogFinal) -> Result<bool>;

    async fn get_sync_log(&self, id: &str) -> Result<Option<SyncLog>>;

    /// Logs for one source, newest first.
    async fn list_sync_logs(&self, source_id: &str, limit: usize) -> Result<Vec<SyncLog>>;

    // ── Raw records ─────────────────────────────────────────────────────

    async fn find_raw_record(&self, source_id: &str, external_id: &str)
        -> Result<Option<RawRecord>>;

    /// Insert or replace the payload for `(source_id, external_id)`.
    ///
    /// Keeps the row id stable and clears `processed_at`.
    async fn upsert_raw_record(&self, rec: &NewRawRecord) -> Result<RawRecord>;

    async fn mark_raw_record_processed(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    // ── Facilities ──────────────────────────────────────────────────────

    async fn find_facility(&self, key: &FacilityKey) -> Result<Option<Facility>>;

    async fn get_facility(&self, id: &str) -> Result<Option<Facility>>;

    async fn list_facilities(&self, jurisdiction_id: &str) -> Result<Vec<Facility>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Attempt to create a facility.
    ///
    /// Uniqueness violations come back as [`FacilityInsert::IdentityConflict`]
    /// or [`FacilityInsert::SlugConflict`]; only other failures are errors.
    async fn insert_facility(&self, facility: &NewFacility) -> Result<FacilityInsert>;

    /// Fill in coordinates that are currently null. Never overwrites.
    async fn backfill_coordinates(
        &self,
        facility_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()>;

    // ── Inspections ─────────────────────────────────────────────────────

    /// Insert or update the inspection linked to `raw_record_id`.
    async fn upsert_inspection(&self, inspection: &NewInspection) -> Result<InspectionEvent>;

    async fn get_inspection_by_raw_record(
        &self,
        raw_record_id: &str,
    ) -> Result<Option<InspectionEvent>>;

    async fn list_inspections(&self, facility_id: &str) -> Result<Vec<InspectionEvent>>;

    /// Recompute last inspection date/result and total count from the
    /// facility's full inspection set.
    async fn refresh_facility_stats(&self, facility_id: &str) -> Result<Facility>;
}
