//! Source bookkeeping: config → store synchronization and health checks.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use poolwatch_core::models::{AdapterType, SyncStatus};
use poolwatch_core::store::Store;

use crate::config::Config;
use crate::registry::Registry;

/// What [`sync_config`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigSync {
    pub jurisdictions: usize,
    pub sources: usize,
}

/// Upsert every configured jurisdiction and source.
///
/// Only configured fields are written; a source's cursor and last-sync
/// state survive a config reload untouched.
pub async fn sync_config(store: &dyn Store, config: &Config) -> Result<ConfigSync> {
    for j in &config.jurisdictions {
        store
            .upsert_jurisdiction(&j.to_jurisdiction())
            .await
            .with_context(|| format!("Failed to save jurisdiction '{}'", j.slug))?;
    }
    for s in &config.sources {
        let def = s.to_definition()?;
        store
            .upsert_source(&def)
            .await
            .with_context(|| format!("Failed to save source '{}'", s.id))?;
    }
    let summary = ConfigSync {
        jurisdictions: config.jurisdictions.len(),
        sources: config.sources.len(),
    };
    info!(
        jurisdictions = summary.jurisdictions,
        sources = summary.sources,
        "Synchronized configuration"
    );
    Ok(summary)
}

/// Health and last-run summary for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub id: String,
    pub jurisdiction: String,
    pub adapter_type: AdapterType,
    pub is_active: bool,
    /// `None` for inactive sources, which are not probed.
    pub healthy: Option<bool>,
    /// Why no adapter could be built, if that is what failed.
    pub error: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
}

/// Probe every active source's adapter.
pub async fn check_sources(store: &dyn Store, registry: &Registry) -> Result<Vec<SourceStatus>> {
    let sources = store.list_sources(false).await?;
    let mut statuses = Vec::with_capacity(sources.len());

    for source in sources {
        let (healthy, error) = if !source.is_active {
            (None, None)
        } else {
            match registry.adapter_for(&source) {
                Ok(adapter) => (Some(adapter.health_check().await), None),
                Err(e) => (Some(false), Some(e.to_string())),
            }
        };
        if healthy == Some(false) {
            warn!(source = %source.id, error = ?error, "Source failed health check");
        }
        statuses.push(SourceStatus {
            id: source.id,
            jurisdiction: source.jurisdiction.slug,
            adapter_type: source.adapter_type,
            is_active: source.is_active,
            healthy,
            error,
            last_sync_at: source.last_sync_at,
            last_sync_status: source.last_sync_status,
        });
    }

    Ok(statuses)
}
