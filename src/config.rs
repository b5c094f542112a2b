use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use poolwatch_core::models::{AdapterType, Jurisdiction, SourceDefinition};

use crate::logging::{LogFormat, LogLevel};
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub jurisdictions: Vec<JurisdictionConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JurisdictionConfig {
    pub slug: String,
    pub name: String,
    pub state: String,
}

impl JurisdictionConfig {
    /// Jurisdictions are keyed by slug.
    pub fn to_jurisdiction(&self) -> Jurisdiction {
        Jurisdiction {
            id: self.slug.clone(),
            slug: self.slug.clone(),
            name: self.name.clone(),
            state: self.state.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub id: String,
    /// Slug of a `[[jurisdictions]]` entry.
    pub jurisdiction: String,
    pub name: String,
    pub adapter_type: String,
    pub endpoint: String,
    /// Adapter-specific settings, handed to the adapter as JSON.
    #[serde(default = "default_source_config")]
    pub config: serde_json::Value,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_source_config() -> serde_json::Value {
    serde_json::json!({})
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_is_active() -> bool {
    true
}

impl SourceConfig {
    pub fn to_definition(&self) -> Result<SourceDefinition> {
        let adapter_type: AdapterType = self
            .adapter_type
            .parse()
            .with_context(|| format!("sources '{}': invalid adapter_type", self.id))?;
        Ok(SourceDefinition {
            id: self.id.clone(),
            jurisdiction_id: self.jurisdiction.clone(),
            name: self.name.clone(),
            adapter_type,
            endpoint: self.endpoint.clone(),
            config: self.config.clone(),
            requests_per_minute: self.requests_per_minute,
            is_active: self.is_active,
        })
    }
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        // Validate retry
        if self.retry.attempts < 1 {
            anyhow::bail!("retry.attempts must be >= 1");
        }
        if self.retry.multiplier < 1.0 {
            anyhow::bail!("retry.multiplier must be >= 1.0");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            anyhow::bail!("retry.max_delay_ms must be >= retry.initial_delay_ms");
        }

        // Validate jurisdictions
        let mut slugs = HashSet::new();
        for j in &self.jurisdictions {
            if j.slug.trim().is_empty() {
                anyhow::bail!("jurisdictions.slug must not be empty");
            }
            if !slugs.insert(j.slug.as_str()) {
                anyhow::bail!("Duplicate jurisdiction slug: '{}'", j.slug);
            }
        }

        // Validate sources
        let mut ids = HashSet::new();
        for s in &self.sources {
            if !ids.insert(s.id.as_str()) {
                anyhow::bail!("Duplicate source id: '{}'", s.id);
            }
            if !slugs.contains(s.jurisdiction.as_str()) {
                anyhow::bail!(
                    "sources '{}' references unknown jurisdiction '{}'",
                    s.id,
                    s.jurisdiction
                );
            }
            if s.requests_per_minute == 0 {
                anyhow::bail!("sources '{}': requests_per_minute must be > 0", s.id);
            }
            if !s.config.is_object() {
                anyhow::bail!("sources '{}': config must be a table", s.id);
            }
            s.to_definition()?;
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
