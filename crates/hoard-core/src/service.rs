//! Hoard - the cache service instance
//!
//! Wires the entity cache, the registry, the warm-up loader and the refresh
//! scheduler together. Constructed explicitly; there is no process-global
//! cache.

use crate::cache::EntityCache;
use crate::config::HoardConfig;
use crate::error::{HoardError, LoadError, LoadReport};
use crate::event::{CacheEvent, EventBus};
use crate::inspector::{CacheInspector, CacheReport};
use crate::loader::CacheLoader;
use crate::refresh::{RefreshReport, RefreshScheduler, RefreshSettings, RefreshSnapshot};
use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Hoard {
    cache: Arc<EntityCache>,
    registry: Arc<Registry>,
    config: HoardConfig,
    events: EventBus,
    scheduler: RefreshScheduler,
}

impl Hoard {
    pub fn new(registry: Registry, config: HoardConfig) -> Self {
        let cache = Arc::new(EntityCache::new());
        let registry = Arc::new(registry);
        let events = EventBus::default_capacity();
        let scheduler = RefreshScheduler::new(
            Arc::clone(&cache),
            Arc::clone(&registry),
            events.clone(),
            RefreshSettings::from_config(&config.cache),
        );

        Self {
            cache,
            registry,
            config,
            events,
            scheduler,
        }
    }

    pub fn with_defaults(registry: Registry) -> Self {
        Self::new(registry, HoardConfig::default())
    }

    /// Shared handle to the cache, for lookups and incremental writes
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &HoardConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Warm up every registered type on the blocking pool
    pub async fn initialize(&self) -> LoadReport {
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();
        let config = self.config.cache.clone();

        let task = tokio::task::spawn_blocking(move || {
            CacheLoader::new(&cache, &registry, &events).initialize(&config)
        });

        match task.await {
            Ok(report) => report,
            Err(e) => {
                let mut report = LoadReport::new();
                report.add_error(LoadError::error(
                    "initialization",
                    format!("Warm-up task failed: {}", e),
                ));
                report
            }
        }
    }

    /// Start periodic refresh if enabled by configuration
    pub fn start_refresh(&self) -> Result<bool, HoardError> {
        let started = self.scheduler.start()?;
        if started {
            info!(
                interval_minutes = self.config.cache.refresh.interval_minutes,
                delay_minutes = self.config.cache.refresh.delay_minutes,
                "Periodic refresh scheduled"
            );
        }
        Ok(started)
    }

    pub fn is_refreshing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub async fn refresh_now(&self) -> RefreshReport {
        self.scheduler.refresh_now().await
    }

    pub fn refresh_metrics(&self) -> RefreshSnapshot {
        self.scheduler.metrics()
    }

    /// Stop the refresh task, aborting it after `grace`
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.scheduler.shutdown(grace).await
    }

    /// Size analysis of the current cache contents
    pub fn report(&self) -> CacheReport {
        CacheInspector::new(&self.cache).report()
    }

    /// Drop every cached record
    pub fn clear(&self) {
        self.cache.clear();
        self.events.publish(CacheEvent::Cleared);
    }
}
