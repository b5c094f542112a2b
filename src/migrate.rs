use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create jurisdictions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jurisdictions (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            state TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create sources table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            jurisdiction_id TEXT NOT NULL,
            name TEXT NOT NULL,
            adapter_type TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            config_json TEXT NOT NULL DEFAULT '{}',
            requests_per_minute INTEGER NOT NULL DEFAULT 60,
            is_active INTEGER NOT NULL DEFAULT 1,
            cursor_json TEXT,
            last_sync_at TEXT,
            last_sync_status TEXT,
            last_sync_error TEXT,
            last_record_count INTEGER,
            FOREIGN KEY (jurisdiction_id) REFERENCES jurisdictions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create sync_logs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_logs (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            sync_type TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            records_fetched INTEGER NOT NULL DEFAULT 0,
            records_created INTEGER NOT NULL DEFAULT 0,
            records_updated INTEGER NOT NULL DEFAULT 0,
            records_skipped INTEGER NOT NULL DEFAULT 0,
            records_failed INTEGER NOT NULL DEFAULT 0,
            cursor_before TEXT,
            cursor_after TEXT,
            error_message TEXT,
            FOREIGN KEY (source_id) REFERENCES sources(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create raw_records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_records (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            external_id TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            payload_hash TEXT NOT NULL,
            processed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(source_id, external_id),
            FOREIGN KEY (source_id) REFERENCES sources(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create facilities table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facilities (
            id TEXT PRIMARY KEY,
            jurisdiction_id TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            normalized_address TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            external_id TEXT,
            raw_name TEXT NOT NULL,
            raw_address TEXT NOT NULL,
            display_name TEXT NOT NULL,
            display_address TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            zip_code TEXT,
            latitude REAL,
            longitude REAL,
            last_inspection_date TEXT,
            last_inspection_result TEXT,
            total_inspections INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(jurisdiction_id, normalized_name, normalized_address),
            FOREIGN KEY (jurisdiction_id) REFERENCES jurisdictions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create inspection_events table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspection_events (
            id TEXT PRIMARY KEY,
            facility_id TEXT NOT NULL,
            raw_record_id TEXT NOT NULL UNIQUE,
            inspection_date TEXT NOT NULL,
            raw_inspection_type TEXT,
            raw_result TEXT,
            raw_score TEXT,
            inspection_type TEXT,
            result TEXT,
            demerits INTEGER,
            is_closure INTEGER NOT NULL DEFAULT 0,
            is_passing INTEGER,
            source_url TEXT,
            report_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (facility_id) REFERENCES facilities(id),
            FOREIGN KEY (raw_record_id) REFERENCES raw_records(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sources_active ON sources(is_active)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_logs_source ON sync_logs(source_id, started_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_raw_records_unprocessed ON raw_records(processed_at) WHERE processed_at IS NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_facilities_jurisdiction ON facilities(jurisdiction_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_inspections_facility_date ON inspection_events(facility_id, inspection_date DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
