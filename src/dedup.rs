//! Change detection and persistence for one canonical record.
//!
//! The payload hash decides whether a record is new, changed or already
//! seen. A record counts as seen only if the stored hash matches *and* the
//! earlier run finished processing it; a row left half-done by a crash is
//! reprocessed on the next pass.

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use poolwatch_core::hash::hash_payload;
use poolwatch_core::models::{CanonicalRecord, NewInspection, NewRawRecord, Source};
use poolwatch_core::normalizers::{
    is_closure, is_passing, normalize_inspection_result, normalize_inspection_type,
};
use poolwatch_core::store::Store;

use crate::resolver::resolve_facility;

/// How a record affected the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
    Skipped,
}

/// Persist `record` for `source`: raw payload, facility, inspection, stats.
pub async fn process_record(
    store: &dyn Store,
    source: &Source,
    record: &CanonicalRecord,
) -> Result<RecordOutcome> {
    let hash = hash_payload(&record.raw_payload);
    let existing = store.find_raw_record(&source.id, &record.external_id).await?;

    if let Some(raw) = &existing {
        if raw.payload_hash == hash && raw.processed_at.is_some() {
            return Ok(RecordOutcome::Skipped);
        }
    }

    let raw = store
        .upsert_raw_record(&NewRawRecord {
            source_id: source.id.clone(),
            external_id: record.external_id.clone(),
            payload: record.raw_payload.clone(),
            payload_hash: hash,
        })
        .await?;

    let facility = resolve_facility(store, &source.jurisdiction, &record.facility).await?;

    // A changed payload can move the inspection to another facility.
    let previous_facility = store
        .get_inspection_by_raw_record(&raw.id)
        .await?
        .map(|i| i.facility_id)
        .filter(|id| *id != facility.id);

    let insp = &record.inspection;
    let result = insp
        .raw_result
        .as_deref()
        .and_then(normalize_inspection_result);
    store
        .upsert_inspection(&NewInspection {
            facility_id: facility.id.clone(),
            raw_record_id: raw.id.clone(),
            inspection_date: insp.inspection_date,
            raw_inspection_type: insp.raw_inspection_type.clone(),
            raw_result: insp.raw_result.clone(),
            raw_score: insp.raw_score.clone(),
            inspection_type: insp
                .raw_inspection_type
                .as_deref()
                .and_then(normalize_inspection_type),
            result,
            demerits: insp.demerits,
            is_closure: is_closure(result, insp.raw_result.as_deref()),
            is_passing: is_passing(result),
            source_url: insp.source_url.clone(),
            report_url: insp.report_url.clone(),
        })
        .await?;

    store.refresh_facility_stats(&facility.id).await?;
    if let Some(old) = previous_facility {
        debug!(raw_record_id = %raw.id, from = %old, to = %facility.id, "Inspection moved facility");
        store.refresh_facility_stats(&old).await?;
    }

    store.mark_raw_record_processed(&raw.id, Utc::now()).await?;

    Ok(if existing.is_some() {
        RecordOutcome::Updated
    } else {
        RecordOutcome::Created
    })
}
