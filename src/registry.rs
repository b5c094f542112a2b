//! Adapter and transformer lookup.
//!
//! A [`Registry`] is built once at process start and handed to the
//! orchestrator. It resolves:
//!
//! - a [`Transformer`] by the source's jurisdiction slug
//! - an [`Adapter`] by, in order of precedence: a factory registered for the
//!   source id, a scraper registered for the jurisdiction slug (for
//!   `SCRAPER` sources), then the built-in adapter for the adapter type
//!
//! ```text
//! SOCRATA  → SocrataAdapter
//! ARCGIS   → ArcgisAdapter
//! SCRAPER  → scraper registered for the jurisdiction (houston-tx)
//! CSV      → unsupported
//! MANUAL   → unsupported
//! ```
//!
//! Nothing here is global: tests build their own registry with fake
//! adapters and transformers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use poolwatch_core::models::{AdapterType, Source};

use crate::adapters::scraper::{Browser, HttpBrowser};
use crate::adapters::{Adapter, ArcgisAdapter, HoustonScraper, SocrataAdapter};
use crate::error::{AdapterError, IngestError};
use crate::retry::RetryPolicy;
use crate::transformers::{
    ArlingtonTransformer, AustinTransformer, HoustonTransformer, Transformer,
};

/// Builds an adapter for one run of a specific source.
pub type AdapterFactory =
    Arc<dyn Fn(&Source, &RetryPolicy) -> Result<Box<dyn Adapter>, AdapterError> + Send + Sync>;

/// Builds a browser-driven adapter on a shared [`Browser`].
pub type ScraperFactory = Arc<
    dyn Fn(&Source, &RetryPolicy, Arc<dyn Browser>) -> Result<Box<dyn Adapter>, AdapterError>
        + Send
        + Sync,
>;

const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Registry {
    policy: RetryPolicy,
    transformers: HashMap<String, Arc<dyn Transformer>>,
    adapters: HashMap<String, AdapterFactory>,
    scrapers: HashMap<String, ScraperFactory>,
    browser: Option<Arc<dyn Browser>>,
}

impl Registry {
    /// An empty registry. Only the built-in SOCRATA and ARCGIS adapters
    /// resolve; no transformers or scrapers are known.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            transformers: HashMap::new(),
            adapters: HashMap::new(),
            scrapers: HashMap::new(),
            browser: None,
        }
    }

    /// A registry with every shipped transformer and scraper.
    pub fn with_builtins(policy: RetryPolicy) -> Self {
        let mut registry = Self::new(policy);
        registry.register_transformer("austin-tx", AustinTransformer);
        registry.register_transformer("arlington-tx", ArlingtonTransformer);
        registry.register_transformer("houston-tx", HoustonTransformer);
        registry.register_scraper(
            "houston-tx",
            Arc::new(|source: &Source, policy: &RetryPolicy, browser: Arc<dyn Browser>| {
                Ok(Box::new(HoustonScraper::new(source, policy, browser)?) as Box<dyn Adapter>)
            }),
        );
        registry
    }

    /// Register (or replace) the transformer for a jurisdiction slug.
    pub fn register_transformer<T>(&mut self, jurisdiction_slug: &str, transformer: T)
    where
        T: Transformer + 'static,
    {
        self.transformers
            .insert(jurisdiction_slug.to_string(), Arc::new(transformer));
    }

    /// Override adapter construction for one source id.
    pub fn register_adapter(&mut self, source_id: &str, factory: AdapterFactory) {
        self.adapters.insert(source_id.to_string(), factory);
    }

    pub fn register_scraper(&mut self, jurisdiction_slug: &str, factory: ScraperFactory) {
        self.scrapers.insert(jurisdiction_slug.to_string(), factory);
    }

    /// Browser handed to scrapers. Defaults to [`HttpBrowser`].
    pub fn set_browser(&mut self, browser: Arc<dyn Browser>) {
        self.browser = Some(browser);
    }

    pub fn transformer_for(&self, source: &Source) -> Result<Arc<dyn Transformer>, IngestError> {
        let slug = &source.jurisdiction.slug;
        self.transformers.get(slug).cloned().ok_or_else(|| {
            IngestError::Registry(format!(
                "No transformer registered for jurisdiction '{}'",
                slug
            ))
        })
    }

    pub fn adapter_for(&self, source: &Source) -> Result<Box<dyn Adapter>, IngestError> {
        if let Some(factory) = self.adapters.get(&source.id) {
            return Ok(factory(source, &self.policy)?);
        }

        match source.adapter_type {
            AdapterType::Socrata => Ok(Box::new(SocrataAdapter::new(source, &self.policy)?)),
            AdapterType::Arcgis => Ok(Box::new(ArcgisAdapter::new(source, &self.policy)?)),
            AdapterType::Scraper => {
                let slug = &source.jurisdiction.slug;
                let Some(factory) = self.scrapers.get(slug) else {
                    return Err(IngestError::Registry(format!(
                        "No scraper registered for jurisdiction '{}'",
                        slug
                    )));
                };
                let browser: Arc<dyn Browser> = match &self.browser {
                    Some(b) => b.clone(),
                    None => Arc::new(HttpBrowser::new(DEFAULT_PAGE_TIMEOUT)?),
                };
                Ok(factory(source, &self.policy, browser)?)
            }
            AdapterType::Csv | AdapterType::Manual => Err(IngestError::Registry(format!(
                "Adapter type {} is not supported (source '{}')",
                source.adapter_type, source.id
            ))),
        }
    }
}
