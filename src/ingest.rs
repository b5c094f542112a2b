//! Ingestion run orchestration.
//!
//! One run drives one source through:
//!
//! ```text
//! open sync log → pick cursor → loop {
//!     fetch batch → transform + persist each record → save cursor
//!     → stop? → rate-limit sleep
//! } → finalize sync log → write source outcome
//! ```
//!
//! Records are isolated: a transform or persistence failure is counted and
//! logged, and the batch continues. Only adapter errors (after retries) and
//! store failures outside a record stop the run, which then ends `FAILED`.
//! The cursor is saved right after each batch, so a crash loses at most the
//! batch in flight, and deduplication makes re-reading it harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use poolwatch_core::cursor::CursorState;
use poolwatch_core::models::{
    IngestionOptions, IngestionResult, Source, SourceSyncOutcome, SyncCounts, SyncLogFinal,
    SyncStatus, SyncType,
};
use poolwatch_core::store::Store;

use crate::adapters::Adapter;
use crate::dedup::{process_record, RecordOutcome};
use crate::error::IngestError;
use crate::registry::Registry;
use crate::transformers::Transformer;

/// Delay between batches for a source limited to `requests_per_minute`.
pub fn batch_delay(requests_per_minute: u32) -> Duration {
    let rpm = u64::from(requests_per_minute.max(1));
    Duration::from_millis(60_000u64.div_ceil(rpm))
}

/// Run one ingestion pass for `options.source_id`.
///
/// Returns `Err` only when the source does not exist or the run cannot be
/// recorded at all. Every other failure comes back as an
/// [`IngestionResult`] with `success == false` and a `FAILED` sync log.
pub async fn run_ingestion(
    store: &dyn Store,
    registry: &Registry,
    options: &IngestionOptions,
) -> Result<IngestionResult, IngestError> {
    let source = store
        .get_source(&options.source_id)
        .await?
        .ok_or_else(|| IngestError::SourceNotFound(options.source_id.clone()))?;

    let setup = registry
        .adapter_for(&source)
        .and_then(|a| Ok((a, registry.transformer_for(&source)?)));
    let start = setup
        .as_ref()
        .ok()
        .map(|(adapter, _)| starting_cursor(&source, &**adapter, options.sync_type));

    let started_at = Utc::now();
    let log = store
        .create_sync_log(&source.id, options.sync_type, start.as_ref(), started_at)
        .await?;

    info!(
        source = %source.id,
        sync_type = %options.sync_type,
        sync_log = %log.id,
        cursor = ?start,
        "Starting ingestion"
    );

    let mut run = RunState {
        counts: SyncCounts::default(),
        cursor: start,
    };

    let outcome = match setup {
        Ok((adapter, transformer)) => {
            drive(store, &source, &*adapter, transformer, options, &mut run).await
        }
        Err(e) => Err(e),
    };

    let error = match outcome {
        Ok(()) => None,
        Err(e) => {
            error!(source = %source.id, error = %e, "Ingestion failed");
            Some(e.to_string())
        }
    };

    let status = match (&error, run.counts.failed) {
        (Some(_), _) => SyncStatus::Failed,
        (None, 0) => SyncStatus::Success,
        (None, _) => SyncStatus::Partial,
    };
    let completed_at = Utc::now();

    let fin = SyncLogFinal {
        status,
        completed_at,
        counts: run.counts,
        cursor_after: run.cursor.clone(),
        error_message: error.clone(),
    };
    if let Err(e) = store.finalize_sync_log(&log.id, &fin).await {
        error!(sync_log = %log.id, error = %e, "Failed to finalize sync log");
    }

    let outcome = SourceSyncOutcome {
        at: completed_at,
        status,
        record_count: run.counts.fetched,
        error: error.clone(),
    };
    if let Err(e) = store.record_sync_outcome(&source.id, &outcome).await {
        error!(source = %source.id, error = %e, "Failed to record sync outcome");
    }

    info!(
        source = %source.id,
        status = %status,
        fetched = run.counts.fetched,
        created = run.counts.created,
        updated = run.counts.updated,
        skipped = run.counts.skipped,
        failed = run.counts.failed,
        elapsed_ms = (completed_at - started_at).num_milliseconds(),
        "Ingestion finished"
    );

    Ok(IngestionResult::from_counts(run.counts, error, Some(log.id)))
}

/// Run every active source in id order, one after another.
///
/// A source that fails, or cannot even be started, never stops the rest.
pub async fn run_all_active(
    store: &dyn Store,
    registry: &Registry,
    sync_type: SyncType,
) -> Result<Vec<(String, IngestionResult)>, IngestError> {
    let sources = store.list_sources(true).await?;
    info!(count = sources.len(), sync_type = %sync_type, "Running all active sources");

    let mut results = Vec::with_capacity(sources.len());
    for source in sources {
        let options = IngestionOptions {
            source_id: source.id.clone(),
            sync_type,
            max_records: None,
        };
        let result = match run_ingestion(store, registry, &options).await {
            Ok(r) => r,
            Err(e) => {
                error!(source = %source.id, error = %e, "Could not run source");
                IngestionResult::from_counts(SyncCounts::default(), Some(e.to_string()), None)
            }
        };
        results.push((source.id, result));
    }
    Ok(results)
}

struct RunState {
    counts: SyncCounts,
    /// Position after the last completed batch.
    cursor: Option<CursorState>,
}

fn starting_cursor(source: &Source, adapter: &dyn Adapter, sync_type: SyncType) -> CursorState {
    match sync_type {
        SyncType::Backfill => adapter.initial_cursor(),
        SyncType::Incremental => adapter.incremental_cursor(source.last_sync_at),
        SyncType::Resume => match &source.cursor {
            Some(saved) => saved.clone(),
            None => {
                info!(source = %source.id, "No saved cursor, resuming from the beginning");
                adapter.initial_cursor()
            }
        },
    }
}

async fn drive(
    store: &dyn Store,
    source: &Source,
    adapter: &dyn Adapter,
    transformer: Arc<dyn Transformer>,
    options: &IngestionOptions,
    run: &mut RunState,
) -> Result<(), IngestError> {
    let delay = batch_delay(source.requests_per_minute);
    let mut batch_no = 0u64;

    loop {
        batch_no += 1;
        let batch = adapter.fetch(run.cursor.as_ref()).await?;
        run.counts.fetched += batch.records.len() as u64;

        for raw in &batch.records {
            let canonical = match transformer.transform(raw, source) {
                Ok(c) => c,
                Err(e) => {
                    run.counts.failed += 1;
                    warn!(source = %source.id, external_id = %raw.external_id, error = %e, "Failed to transform record");
                    continue;
                }
            };
            match process_record(store, source, &canonical).await {
                Ok(RecordOutcome::Created) => run.counts.created += 1,
                Ok(RecordOutcome::Updated) => run.counts.updated += 1,
                Ok(RecordOutcome::Skipped) => run.counts.skipped += 1,
                Err(e) => {
                    run.counts.failed += 1;
                    warn!(source = %source.id, external_id = %raw.external_id, error = %e, "Failed to persist record");
                }
            }
        }

        if let Some(next) = &batch.next_cursor {
            store.save_cursor(&source.id, Some(next)).await?;
            run.cursor = Some(next.clone());
        }

        info!(
            source = %source.id,
            batch = batch_no,
            records = batch.records.len(),
            total = run.counts.fetched,
            has_more = batch.has_more,
            "Processed batch"
        );

        if !batch.has_more {
            break;
        }
        if batch.next_cursor.is_none() {
            warn!(source = %source.id, adapter = adapter.name(), "Adapter reported more data without a cursor, stopping");
            break;
        }
        if options.max_records.is_some_and(|max| run.counts.fetched >= max) {
            info!(source = %source.id, max_records = ?options.max_records, "Reached record limit");
            break;
        }

        tokio::time::sleep(delay).await;
    }

    Ok(())
}
