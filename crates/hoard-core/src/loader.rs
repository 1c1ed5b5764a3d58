//! Cache warm-up
//!
//! Fetches every registered entity type once and populates both indices.
//! One failing type never prevents the others from loading.

use crate::cache::EntityCache;
use crate::config::CacheConfig;
use crate::error::{HoardError, LoadError, LoadReport};
use crate::event::{CacheEvent, EventBus};
use crate::models::Record;
use crate::registry::{EntityRegistration, Registry};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, trace, warn};

/// What one registration contributed to the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Populated {
    pub records: usize,
    pub columns: usize,
}

/// Preload `records` by id and by every registered column
///
/// Shared by warm-up and refresh; callers skip registrations without an id
/// accessor before fetching.
pub(crate) fn populate(
    cache: &EntityCache,
    registration: &EntityRegistration,
    records: &[Record],
) -> Populated {
    let entity = registration.entity();
    let mut populated = Populated::default();

    if let Some(id_of) = registration.id_accessor() {
        populated.records = cache.preload_records(entity, records, id_of);
        trace!(entity = %entity, records = populated.records, "Cached by id");
    }

    for column in registration.columns() {
        let groups = cache.preload_records_by_column(entity, &column.name, records, &column.accessor);
        trace!(entity = %entity, column = %column.name, groups, "Cached by column");
        populated.columns += 1;
    }

    populated
}

/// Fetch through the collaborator, turning errors and panics into [`HoardError`]
pub(crate) fn fetch_records(registration: &EntityRegistration) -> Result<Vec<Record>, HoardError> {
    let entity = registration.entity().name();
    match panic::catch_unwind(AssertUnwindSafe(|| registration.fetch_all())) {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(e)) => Err(HoardError::fetch(entity, &e)),
        Err(payload) => Err(HoardError::Panicked {
            entity,
            reason: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Initial population of the cache from a [`Registry`]
pub struct CacheLoader<'a> {
    cache: &'a EntityCache,
    registry: &'a Registry,
    events: &'a EventBus,
}

impl<'a> CacheLoader<'a> {
    pub fn new(cache: &'a EntityCache, registry: &'a Registry, events: &'a EventBus) -> Self {
        Self {
            cache,
            registry,
            events,
        }
    }

    /// Load every registered type; blocking (fetch functions hit the store)
    pub fn initialize(&self, config: &CacheConfig) -> LoadReport {
        if !config.enabled {
            info!("Cache disabled, skipping initialization");
            return LoadReport::disabled();
        }

        let mut report = LoadReport::new();
        info!(entities = self.registry.len(), "Starting cache initialization");

        for registration in self.registry.iter() {
            self.load_entity(registration, &mut report);
        }

        self.events.publish(CacheEvent::LoadCompleted);

        let (warnings, errors) = report.error_count();
        info!(
            entities_processed = report.entities_processed,
            records_cached = report.records_cached,
            columns_cached = report.columns_cached,
            warnings,
            errors,
            "Cache initialization complete"
        );

        report
    }

    fn load_entity(&self, registration: &EntityRegistration, report: &mut LoadReport) {
        let entity = registration.entity();

        if registration.id_accessor().is_none() {
            let missing = HoardError::MissingIdAccessor {
                entity: entity.name(),
            };
            warn!(entity = %entity, "No identifier accessor, skipping entity");
            report.add_error(LoadError::from_hoard_error(entity.name(), &missing));
            return;
        }

        let records = match fetch_records(registration) {
            Ok(records) => records,
            Err(e) => {
                error!(entity = %entity, error = %e, "Failed to cache entity");
                report.add_error(LoadError::from_hoard_error(entity.name(), &e));
                return;
            }
        };

        if records.is_empty() {
            debug!(entity = %entity, "No records found, skipping");
            return;
        }

        let populated =
            match panic::catch_unwind(AssertUnwindSafe(|| populate(self.cache, registration, &records))) {
                Ok(populated) => populated,
                Err(payload) => {
                    let e = HoardError::Panicked {
                        entity: entity.name(),
                        reason: panic_message(payload.as_ref()),
                    };
                    error!(entity = %entity, error = %e, "Failed to cache entity");
                    report.add_error(LoadError::from_hoard_error(entity.name(), &e));
                    return;
                }
            };

        report.entities_processed += 1;
        report.records_cached += populated.records;
        report.columns_cached += populated.columns;

        debug!(
            entity = %entity,
            fetched = records.len(),
            cached = populated.records,
            columns = populated.columns,
            "Entity cached"
        );
        self.events.publish(CacheEvent::Preloaded {
            entity: entity.name().to_string(),
            records: populated.records,
        });
    }
}
