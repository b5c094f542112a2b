//! Core data models used throughout Poolwatch.
//!
//! These types describe the sources being polled, the records flowing
//! through the ingestion pipeline, and the rows the store persists.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cursor::CursorState;

// ═══════════════════════════════════════════════════════════════════════
// Sources
// ═══════════════════════════════════════════════════════════════════════

/// Protocol family an external provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterType {
    Socrata,
    Arcgis,
    Csv,
    Manual,
    Scraper,
}

impl AdapterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Socrata => "SOCRATA",
            AdapterType::Arcgis => "ARCGIS",
            AdapterType::Csv => "CSV",
            AdapterType::Manual => "MANUAL",
            AdapterType::Scraper => "SCRAPER",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SOCRATA" => Ok(AdapterType::Socrata),
            "ARCGIS" => Ok(AdapterType::Arcgis),
            "CSV" => Ok(AdapterType::Csv),
            "MANUAL" => Ok(AdapterType::Manual),
            "SCRAPER" => Ok(AdapterType::Scraper),
            other => anyhow::bail!("Unknown adapter type: '{}'", other),
        }
    }
}

/// How a run chooses its starting cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    Backfill,
    Incremental,
    Resume,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Backfill => "BACKFILL",
            SyncType::Incremental => "INCREMENTAL",
            SyncType::Resume => "RESUME",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BACKFILL" => Ok(SyncType::Backfill),
            "INCREMENTAL" => Ok(SyncType::Incremental),
            "RESUME" => Ok(SyncType::Resume),
            other => anyhow::bail!(
                "Unknown sync type: '{}'. Must be backfill, incremental, or resume.",
                other
            ),
        }
    }
}

/// Outcome of a sync run. `Running` only appears on a log that has not been
/// finalized yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "RUNNING",
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Partial => "PARTIAL",
            SyncStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(SyncStatus::Running),
            "SUCCESS" => Ok(SyncStatus::Success),
            "PARTIAL" => Ok(SyncStatus::Partial),
            "FAILED" => Ok(SyncStatus::Failed),
            other => anyhow::bail!("Unknown sync status: '{}'", other),
        }
    }
}

/// A government body whose inspections are aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub state: String,
}

/// The configured part of a [`Source`]: everything an operator writes down.
///
/// Loading a definition never touches the cursor or the last-sync fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDefinition {
    pub id: String,
    pub jurisdiction_id: String,
    pub name: String,
    pub adapter_type: AdapterType,
    pub endpoint: String,
    pub config: Value,
    pub requests_per_minute: u32,
    pub is_active: bool,
}

/// One configured external provider plus its mutable sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub jurisdiction: Jurisdiction,
    pub name: String,
    pub adapter_type: AdapterType,
    pub endpoint: String,
    pub config: Value,
    pub requests_per_minute: u32,
    pub is_active: bool,
    pub cursor: Option<CursorState>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    pub last_sync_error: Option<String>,
    pub last_record_count: Option<u64>,
}

/// Sync bookkeeping written back to a [`Source`] at the end of every run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSyncOutcome {
    pub at: DateTime<Utc>,
    pub status: SyncStatus,
    pub record_count: u64,
    pub error: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Fetch + transform
// ═══════════════════════════════════════════════════════════════════════

/// One fetched record, before any transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub external_id: String,
    pub data: Value,
}

impl RawPayload {
    pub fn new(external_id: impl Into<String>, data: Value) -> Self {
        Self {
            external_id: external_id.into(),
            data,
        }
    }
}

/// A batch returned by an adapter.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub records: Vec<RawPayload>,
    pub next_cursor: Option<CursorState>,
    pub has_more: bool,
    pub total_available: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    /// A final batch: no further cursor.
    pub fn last(records: Vec<RawPayload>) -> Self {
        Self {
            records,
            next_cursor: None,
            has_more: false,
            total_available: None,
            fetched_at: Utc::now(),
        }
    }

    /// A batch with more data behind `next`.
    pub fn more(records: Vec<RawPayload>, next: CursorState) -> Self {
        Self {
            records,
            next_cursor: Some(next),
            has_more: true,
            total_available: None,
            fetched_at: Utc::now(),
        }
    }
}

/// Facility half of a [`CanonicalRecord`], still in source spelling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalFacility {
    pub external_id: Option<String>,
    pub raw_name: String,
    pub raw_address: String,
    pub raw_city: Option<String>,
    pub raw_state: Option<String>,
    pub raw_zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Inspection half of a [`CanonicalRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalInspection {
    pub inspection_date: NaiveDate,
    pub raw_inspection_type: Option<String>,
    pub raw_result: Option<String>,
    pub raw_score: Option<String>,
    pub demerits: Option<i64>,
    pub source_url: Option<String>,
    pub report_url: Option<String>,
}

/// Normalized facility + inspection shape produced by a transformer.
/// Never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub external_id: String,
    pub facility: CanonicalFacility,
    pub inspection: CanonicalInspection,
    pub raw_payload: Value,
}

// ═══════════════════════════════════════════════════════════════════════
// Inspection vocabularies
// ═══════════════════════════════════════════════════════════════════════

/// Closed vocabulary for inspection outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionResult {
    Pass,
    Fail,
    Closed,
    ConditionalPass,
    NotInspected,
    Pending,
    Other,
}

impl InspectionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionResult::Pass => "PASS",
            InspectionResult::Fail => "FAIL",
            InspectionResult::Closed => "CLOSED",
            InspectionResult::ConditionalPass => "CONDITIONAL_PASS",
            InspectionResult::NotInspected => "NOT_INSPECTED",
            InspectionResult::Pending => "PENDING",
            InspectionResult::Other => "OTHER",
        }
    }
}

impl FromStr for InspectionResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(InspectionResult::Pass),
            "FAIL" => Ok(InspectionResult::Fail),
            "CLOSED" => Ok(InspectionResult::Closed),
            "CONDITIONAL_PASS" => Ok(InspectionResult::ConditionalPass),
            "NOT_INSPECTED" => Ok(InspectionResult::NotInspected),
            "PENDING" => Ok(InspectionResult::Pending),
            "OTHER" => Ok(InspectionResult::Other),
            other => anyhow::bail!("Unknown inspection result: '{}'", other),
        }
    }
}

/// Closed vocabulary for why an inspection happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionType {
    Routine,
    FollowUp,
    Reinspection,
    Complaint,
    Opening,
    Closing,
    Other,
}

impl InspectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionType::Routine => "ROUTINE",
            InspectionType::FollowUp => "FOLLOW_UP",
            InspectionType::Reinspection => "REINSPECTION",
            InspectionType::Complaint => "COMPLAINT",
            InspectionType::Opening => "OPENING",
            InspectionType::Closing => "CLOSING",
            InspectionType::Other => "OTHER",
        }
    }
}

impl FromStr for InspectionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROUTINE" => Ok(InspectionType::Routine),
            "FOLLOW_UP" => Ok(InspectionType::FollowUp),
            "REINSPECTION" => Ok(InspectionType::Reinspection),
            "COMPLAINT" => Ok(InspectionType::Complaint),
            "OPENING" => Ok(InspectionType::Opening),
            "CLOSING" => Ok(InspectionType::Closing),
            "OTHER" => Ok(InspectionType::Other),
            other => anyhow::bail!("Unknown inspection type: '{}'", other),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Persisted rows
// ═══════════════════════════════════════════════════════════════════════

/// Persisted raw payload plus its change marker.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub source_id: String,
    pub external_id: String,
    pub payload: Value,
    pub payload_hash: String,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRawRecord {
    pub source_id: String,
    pub external_id: String,
    pub payload: Value,
    pub payload_hash: String,
}

/// Identity of a physical site. Exact match only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacilityKey {
    pub jurisdiction_id: String,
    pub normalized_name: String,
    pub normalized_address: String,
}

/// A deduplicated physical site.
#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub id: String,
    pub jurisdiction_id: String,
    pub normalized_name: String,
    pub normalized_address: String,
    pub slug: String,
    pub external_id: Option<String>,
    pub raw_name: String,
    pub raw_address: String,
    pub display_name: String,
    pub display_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_inspection_date: Option<NaiveDate>,
    pub last_inspection_result: Option<String>,
    pub total_inspections: u64,
}

impl Facility {
    pub fn key(&self) -> FacilityKey {
        FacilityKey {
            jurisdiction_id: self.jurisdiction_id.clone(),
            normalized_name: self.normalized_name.clone(),
            normalized_address: self.normalized_address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFacility {
    pub key: FacilityKey,
    pub slug: String,
    pub external_id: Option<String>,
    pub raw_name: String,
    pub raw_address: String,
    pub display_name: String,
    pub display_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Result of an optimistic facility insert.
///
/// Uniqueness races are ordinary outcomes here, not errors: the resolver
/// decides how to recover from each.
#[derive(Debug, Clone, PartialEq)]
pub enum FacilityInsert {
    Created(Facility),
    /// Another writer already owns this `(jurisdiction, name, address)`.
    IdentityConflict,
    /// The identity is free but the slug was taken.
    SlugConflict,
}

/// One inspection outcome, 1:1 with a [`RawRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct InspectionEvent {
    pub id: String,
    pub facility_id: String,
    pub raw_record_id: String,
    pub inspection_date: NaiveDate,
    pub raw_inspection_type: Option<String>,
    pub raw_result: Option<String>,
    pub raw_score: Option<String>,
    pub inspection_type: Option<InspectionType>,
    pub result: Option<InspectionResult>,
    pub demerits: Option<i64>,
    pub is_closure: bool,
    pub is_passing: Option<bool>,
    pub source_url: Option<String>,
    pub report_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInspection {
    pub facility_id: String,
    pub raw_record_id: String,
    pub inspection_date: NaiveDate,
    pub raw_inspection_type: Option<String>,
    pub raw_result: Option<String>,
    pub raw_score: Option<String>,
    pub inspection_type: Option<InspectionType>,
    pub result: Option<InspectionResult>,
    pub demerits: Option<i64>,
    pub is_closure: bool,
    pub is_passing: Option<bool>,
    pub source_url: Option<String>,
    pub report_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Runs
// ═══════════════════════════════════════════════════════════════════════

/// Per-run record counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncCounts {
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Audit row for one run. Append-only: finalized once, never edited again.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLog {
    pub id: String,
    pub source_id: String,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: SyncCounts,
    pub cursor_before: Option<CursorState>,
    pub cursor_after: Option<CursorState>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogFinal {
    pub status: SyncStatus,
    pub completed_at: DateTime<Utc>,
    pub counts: SyncCounts,
    pub cursor_after: Option<CursorState>,
    pub error_message: Option<String>,
}

/// Input to a single ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionOptions {
    pub source_id: String,
    pub sync_type: SyncType,
    pub max_records: Option<u64>,
}

/// Structured outcome of a run. Returned on every path except an unknown source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionResult {
    pub success: bool,
    pub records_fetched: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_skipped: u64,
    pub records_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_log_id: Option<String>,
}

impl IngestionResult {
    pub fn from_counts(counts: SyncCounts, error: Option<String>, sync_log_id: Option<String>) -> Self {
        Self {
            success: error.is_none(),
            records_fetched: counts.fetched,
            records_created: counts.created,
            records_updated: counts.updated,
            records_skipped: counts.skipped,
            records_failed: counts.failed,
            error,
            sync_log_id,
        }
    }
}
