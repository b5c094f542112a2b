//! In-memory [`Store`] implementation for testing.
//!
//! All tables live in one struct behind a single `std::sync::RwLock`, so
//! each operation is atomic with respect to the others. Uniqueness rules
//! match the SQLite schema.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cursor::CursorState;
use crate::models::{
    Facility, FacilityInsert, FacilityKey, InspectionEvent, Jurisdiction, NewFacility,
    NewInspection, NewRawRecord, RawRecord, Source, SourceDefinition, SourceSyncOutcome, SyncCounts,
    SyncLog, SyncLogFinal, SyncStatus, SyncType,
};

use super::Store;

struct StoredSource {
    def: SourceDefinition,
    cursor: Option<CursorState>,
    last_sync: Option<SourceSyncOutcome>,
}

#[derive(Default)]
struct Tables {
    jurisdictions: HashMap<String, Jurisdiction>,
    sources: BTreeMap<String, StoredSource>,
    sync_logs: Vec<SyncLog>,
    raw_records: HashMap<(String, String), RawRecord>,
    facilities: Vec<Facility>,
    /// Insertion order doubles as the tie-break for same-day inspections.
    inspections: Vec<InspectionEvent>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn build_source(tables: &Tables, stored: &StoredSource) -> Result<Source> {
    let Some(jurisdiction) = tables.jurisdictions.get(&stored.def.jurisdiction_id) else {
        bail!(
            "Source '{}' references unknown jurisdiction '{}'",
            stored.def.id,
            stored.def.jurisdiction_id
        );
    };
    let def = &stored.def;
    let last = stored.last_sync.as_ref();
    Ok(Source {
        id: def.id.clone(),
        jurisdiction: jurisdiction.clone(),
        name: def.name.clone(),
        adapter_type: def.adapter_type,
        endpoint: def.endpoint.clone(),
        config: def.config.clone(),
        requests_per_minute: def.requests_per_minute,
        is_active: def.is_active,
        cursor: stored.cursor.clone(),
        last_sync_at: last.map(|o| o.at),
        last_sync_status: last.map(|o| o.status),
        last_sync_error: last.and_then(|o| o.error.clone()),
        last_record_count: last.map(|o| o.record_count),
    })
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_jurisdiction(&self, jurisdiction: &Jurisdiction) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        t.jurisdictions
            .insert(jurisdiction.id.clone(), jurisdiction.clone());
        Ok(())
    }

    async fn upsert_source(&self, def: &SourceDefinition) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if !t.jurisdictions.contains_key(&def.jurisdiction_id) {
            bail!("Unknown jurisdiction '{}'", def.jurisdiction_id);
        }
        match t.sources.get_mut(&def.id) {
            Some(existing) => existing.def = def.clone(),
            None => {
                t.sources.insert(
                    def.id.clone(),
                    StoredSource {
                        def: def.clone(),
                        cursor: None,
                        last_sync: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let t = self.tables.read().unwrap();
        match t.sources.get(id) {
            Some(stored) => Ok(Some(build_source(&t, stored)?)),
            None => Ok(None),
        }
    }

    async fn list_sources(&self, active_only: bool) -> Result<Vec<Source>> {
        let t = self.tables.read().unwrap();
        t.sources
            .values()
            .filter(|s| !active_only || s.def.is_active)
            .map(|s| build_source(&t, s))
            .collect()
    }

    async fn save_cursor(&self, source_id: &str, cursor: Option<&CursorState>) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        let Some(stored) = t.sources.get_mut(source_id) else {
            bail!("Unknown source '{}'", source_id);
        };
        stored.cursor = cursor.cloned();
        Ok(())
    }

    async fn record_sync_outcome(&self, source_id: &str, outcome: &SourceSyncOutcome) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        let Some(stored) = t.sources.get_mut(source_id) else {
            bail!("Unknown source '{}'", source_id);
        };
        stored.last_sync = Some(outcome.clone());
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
        let mut t = self.tables.write().unwrap();
        t.sync_logs.push(log.clone());
        Ok(log)
    }

    async fn finalize_sync_log(&self, id: &str, fin: &SyncLogFinal) -> Result<bool> {
        let mut t = self.tables.write().unwrap();
        let Some(log) = t.sync_logs.iter_mut().find(|l| l.id == id) else {
            bail!("Unknown sync log '{}'", id);
        };
        if log.status != SyncStatus::Running {
            return Ok(false);
        }
        log.status = fin.status;
        log.completed_at = Some(fin.completed_at);
        log.counts = fin.counts;
        log.cursor_after = fin.cursor_after.clone();
        log.error_message = fin.error_message.clone();
        Ok(true)
    }

    async fn get_sync_log(&self, id: &str) -> Result<Option<SyncLog>> {
        let t = self.tables.read().unwrap();
        Ok(t.sync_logs.iter().find(|l| l.id == id).cloned())
    }

    async fn list_sync_logs(&self, source_id: &str, limit: usize) -> Result<Vec<SyncLog>> {
        let t = self.tables.read().unwrap();
        Ok(t.sync_logs
            .iter()
            .rev()
            .filter(|l| l.source_id == source_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_raw_record(
        &self,
        source_id: &str,
        external_id: &str,
    ) -> Result<Option<RawRecord>> {
        let t = self.tables.read().unwrap();
        Ok(t.raw_records
            .get(&(source_id.to_string(), external_id.to_string()))
            .cloned())
    }

    async fn upsert_raw_record(&self, rec: &NewRawRecord) -> Result<RawRecord> {
        let mut t = self.tables.write().unwrap();
        let key = (rec.source_id.clone(), rec.external_id.clone());
        let id = t
            .raw_records
            .get(&key)
            .map(|r| r.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let row = RawRecord {
            id,
            source_id: rec.source_id.clone(),
            external_id: rec.external_id.clone(),
            payload: rec.payload.clone(),
            payload_hash: rec.payload_hash.clone(),
            processed_at: None,
        };
        t.raw_records.insert(key, row.clone());
        Ok(row)
    }

    async fn mark_raw_record_processed(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if let Some(r) = t.raw_records.values_mut().find(|r| r.id == id) {
            r.processed_at = Some(at);
        }
        Ok(())
    }

    async fn find_facility(&self, key: &FacilityKey) -> Result<Option<Facility>> {
        let t = self.tables.read().unwrap();
        Ok(t.facilities.iter().find(|f| &f.key() == key).cloned())
    }

    async fn get_facility(&self, id: &str) -> Result<Option<Facility>> {
        let t = self.tables.read().unwrap();
        Ok(t.facilities.iter().find(|f| f.id == id).cloned())
    }

    async fn list_facilities(&self, jurisdiction_id: &str) -> Result<Vec<Facility>> {
        let t = self.tables.read().unwrap();
        Ok(t.facilities
            .iter()
            .filter(|f| f.jurisdiction_id == jurisdiction_id)
            .cloned()
            .collect())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let t = self.tables.read().unwrap();
        Ok(t.facilities.iter().any(|f| f.slug == slug))
    }

    async fn insert_facility(&self, new: &NewFacility) -> Result<FacilityInsert> {
        let mut t = self.tables.write().unwrap();
        if t.facilities.iter().any(|f| f.key() == new.key) {
            return Ok(FacilityInsert::IdentityConflict);
        }
        if t.facilities.iter().any(|f| f.slug == new.slug) {
            return Ok(FacilityInsert::SlugConflict);
        }
        let facility = Facility {
            id: Uuid::new_v4().to_string(),
            jurisdiction_id: new.key.jurisdiction_id.clone(),
            normalized_name: new.key.normalized_name.clone(),
            normalized_address: new.key.normalized_address.clone(),
            slug: new.slug.clone(),
            external_id: new.external_id.clone(),
            raw_name: new.raw_name.clone(),
            raw_address: new.raw_address.clone(),
            display_name: new.display_name.clone(),
            display_address: new.display_address.clone(),
            city: new.city.clone(),
            state: new.state.clone(),
            zip_code: new.zip_code.clone(),
            latitude: new.latitude,
            longitude: new.longitude,
            last_inspection_date: None,
            last_inspection_result: None,
            total_inspections: 0,
        };
        t.facilities.push(facility.clone());
        Ok(FacilityInsert::Created(facility))
    }

    async fn backfill_coordinates(
        &self,
        facility_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if let Some(f) = t.facilities.iter_mut().find(|f| f.id == facility_id) {
            if f.latitude.is_none() {
                f.latitude = latitude;
            }
            if f.longitude.is_none() {
                f.longitude = longitude;
            }
        }
        Ok(())
    }

    async fn upsert_inspection(&self, new: &NewInspection) -> Result<InspectionEvent> {
        let mut t = self.tables.write().unwrap();
        let existing = t
            .inspections
            .iter()
            .position(|i| i.raw_record_id == new.raw_record_id);
        let id = match existing {
            Some(idx) => t.inspections[idx].id.clone(),
            None => Uuid::new_v4().to_string(),
        };
        let event = InspectionEvent {
            id,
            facility_id: new.facility_id.clone(),
            raw_record_id: new.raw_record_id.clone(),
            inspection_date: new.inspection_date,
            raw_inspection_type: new.raw_inspection_type.clone(),
            raw_result: new.raw_result.clone(),
            raw_score: new.raw_score.clone(),
            inspection_type: new.inspection_type,
            result: new.result,
            demerits: new.demerits,
            is_closure: new.is_closure,
            is_passing: new.is_passing,
            source_url: new.source_url.clone(),
            report_url: new.report_url.clone(),
        };
        match existing {
            Some(idx) => t.inspections[idx] = event.clone(),
            None => t.inspections.push(event.clone()),
        }
        Ok(event)
    }

    async fn get_inspection_by_raw_record(
        &self,
        raw_record_id: &str,
    ) -> Result<Option<InspectionEvent>> {
        let t = self.tables.read().unwrap();
        Ok(t.inspections
            .iter()
            .find(|i| i.raw_record_id == raw_record_id)
            .cloned())
    }

    async fn list_inspections(&self, facility_id: &str) -> Result<Vec<InspectionEvent>> {
        let t = self.tables.read().unwrap();
        let mut out: Vec<InspectionEvent> = t
            .inspections
            .iter()
            .filter(|i| i.facility_id == facility_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.inspection_date.cmp(&a.inspection_date));
        Ok(out)
    }

    async fn refresh_facility_stats(&self, facility_id: &str) -> Result<Facility> {
        let mut t = self.tables.write().unwrap();
        let mut total = 0u64;
        let mut latest: Option<&InspectionEvent> = None;
        for event in t.inspections.iter().filter(|i| i.facility_id == facility_id) {
            total += 1;
            // `>=` so the most recently inserted wins a same-day tie.
            if latest.map_or(true, |l| event.inspection_date >= l.inspection_date) {
                latest = Some(event);
            }
        }
        let last_date = latest.map(|l| l.inspection_date);
        let last_result = latest.and_then(|l| l.raw_result.clone());

        let Some(f) = t.facilities.iter_mut().find(|f| f.id == facility_id) else {
            bail!("Unknown facility '{}'", facility_id);
        };
        f.total_inspections = total;
        f.last_inspection_date = last_date;
        f.last_inspection_result = last_result;
        Ok(f.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdapterType, InspectionResult};
    use chrono::NaiveDate;
    use serde_json::json;

    fn new_facility(name: &str, slug: &str) -> NewFacility {
        NewFacility {
            key: FacilityKey {
                jurisdiction_id: "j1".into(),
                normalized_name: name.into(),
                normalized_address: "1 MAIN ST".into(),
            },
            slug: slug.into(),
            external_id: None,
            raw_name: name.into(),
            raw_address: "1 Main St".into(),
            display_name: name.into(),
            display_address: "1 Main St".into(),
            city: "Austin".into(),
            state: "TX".into(),
            zip_code: None,
            latitude: None,
            longitude: None,
        }
    }

    fn inspection(facility_id: &str, raw_id: &str, date: (i32, u32, u32), result: InspectionResult) -> NewInspection {
        NewInspection {
            facility_id: facility_id.into(),
            raw_record_id: raw_id.into(),
            inspection_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            raw_inspection_type: None,
            raw_result: Some(result.as_str().into()),
            raw_score: None,
            inspection_type: None,
            result: Some(result),
            demerits: None,
            is_closure: false,
            is_passing: None,
            source_url: None,
            report_url: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_source_keeps_sync_state() {
        let store = InMemoryStore::new();
        store
            .upsert_jurisdiction(&Jurisdiction {
                id: "j1".into(),
                slug: "austin-tx".into(),
                name: "Austin".into(),
                state: "TX".into(),
            })
            .await
            .unwrap();
        let mut def = SourceDefinition {
            id: "s1".into(),
            jurisdiction_id: "j1".into(),
            name: "Austin pools".into(),
            adapter_type: AdapterType::Socrata,
            endpoint: "https://data.example.gov/resource/x.json".into(),
            config: json!({}),
            requests_per_minute: 60,
            is_active: true,
        };
        store.upsert_source(&def).await.unwrap();
        store
            .save_cursor("s1", Some(&CursorState::offset(500)))
            .await
            .unwrap();

        def.requests_per_minute = 30;
        store.upsert_source(&def).await.unwrap();

        let source = store.get_source("s1").await.unwrap().unwrap();
        assert_eq!(source.requests_per_minute, 30);
        assert_eq!(source.cursor, Some(CursorState::offset(500)));
        assert_eq!(source.jurisdiction.slug, "austin-tx");
    }

    #[tokio::test]
    async fn test_insert_facility_conflicts() {
        let store = InMemoryStore::new();
        let first = store.insert_facility(&new_facility("CITY", "city-austin-tx")).await.unwrap();
        assert!(matches!(first, FacilityInsert::Created(_)));

        let same_identity = store
            .insert_facility(&new_facility("CITY", "other-slug"))
            .await
            .unwrap();
        assert_eq!(same_identity, FacilityInsert::IdentityConflict);

        let same_slug = store
            .insert_facility(&new_facility("TOWN", "city-austin-tx"))
            .await
            .unwrap();
        assert_eq!(same_slug, FacilityInsert::SlugConflict);
    }

    #[tokio::test]
    async fn test_refresh_stats_recomputes_from_all_inspections() {
        let store = InMemoryStore::new();
        let FacilityInsert::Created(f) = store.insert_facility(&new_facility("CITY", "c")).await.unwrap()
        else {
            panic!("expected insert");
        };

        store
            .upsert_inspection(&inspection(&f.id, "r1", (2024, 5, 1), InspectionResult::Pass))
            .await
            .unwrap();
        // Backfilled older inspection must not move the latest date.
        store
            .upsert_inspection(&inspection(&f.id, "r2", (2023, 1, 1), InspectionResult::Fail))
            .await
            .unwrap();
        let refreshed = store.refresh_facility_stats(&f.id).await.unwrap();
        assert_eq!(refreshed.total_inspections, 2);
        assert_eq!(refreshed.last_inspection_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(refreshed.last_inspection_result.as_deref(), Some("PASS"));

        // Replay of r1 updates in place.
        let before = store.get_inspection_by_raw_record("r1").await.unwrap().unwrap();
        let after = store
            .upsert_inspection(&inspection(&f.id, "r1", (2024, 5, 1), InspectionResult::Closed))
            .await
            .unwrap();
        assert_eq!(before.id, after.id);
        let refreshed = store.refresh_facility_stats(&f.id).await.unwrap();
        assert_eq!(refreshed.total_inspections, 2);
        assert_eq!(refreshed.last_inspection_result.as_deref(), Some("CLOSED"));
    }

    #[tokio::test]
    async fn test_sync_log_finalized_once() {
        let store = InMemoryStore::new();
        let log = store
            .create_sync_log("s1", SyncType::Backfill, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(log.status, SyncStatus::Running);

        let fin = SyncLogFinal {
            status: SyncStatus::Success,
            completed_at: Utc::now(),
            counts: SyncCounts::default(),
            cursor_after: None,
            error_message: None,
        };
        assert!(store.finalize_sync_log(&log.id, &fin).await.unwrap());
        let again = SyncLogFinal {
            status: SyncStatus::Failed,
            ..fin
        };
        assert!(!store.finalize_sync_log(&log.id, &again).await.unwrap());
        let stored = store.get_sync_log(&log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_raw_record_upsert_keeps_id_and_clears_processed() {
        let store = InMemoryStore::new();
        let rec = NewRawRecord {
            source_id: "s1".into(),
            external_id: "e1".into(),
            payload: json!({"a": 1}),
            payload_hash: "h1".into(),
        };
        let first = store.upsert_raw_record(&rec).await.unwrap();
        store.mark_raw_record_processed(&first.id, Utc::now()).await.unwrap();
        assert!(store
            .find_raw_record("s1", "e1")
            .await
            .unwrap()
            .unwrap()
            .processed_at
            .is_some());

        let second = store
            .upsert_raw_record(&NewRawRecord {
                payload_hash: "h2".into(),
                ..rec
            })
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.processed_at, None);
    }
}
