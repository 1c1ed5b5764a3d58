//! In-memory element table standing in for a database
//!
//! Every query sleeps for a configurable latency so cached and uncached
//! lookups can be compared.

use anyhow::{Context, Result};
use hoard_core::{EntityCache, EntityRegistration};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const ELEMENTS_JSON: &str = include_str!("../data/elements.json");

/// One row of the periodic table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub atomic_number: i32,
    pub element: String,
    pub symbol: String,
    pub atomic_mass: f64,
    pub period: i32,
    pub group: Option<i32>,
    pub phase: String,
    pub metal: bool,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Columns registered for secondary lookups
pub const COLUMNS: [&str; 5] = ["symbol", "period", "group", "phase", "type"];

pub struct ElementStore {
    rows: RwLock<Vec<Element>>,
    latency: Duration,
    queries: AtomicU64,
}

impl ElementStore {
    pub fn new(rows: Vec<Element>, latency: Duration) -> Self {
        Self {
            rows: RwLock::new(rows),
            latency,
            queries: AtomicU64::new(0),
        }
    }

    /// Store seeded with the bundled sample data
    pub fn builtin(latency: Duration) -> Result<Self> {
        let rows: Vec<Element> =
            serde_json::from_str(ELEMENTS_JSON).context("Failed to parse bundled element data")?;
        Ok(Self::new(rows, latency))
    }

    pub fn find_all(&self) -> Vec<Element> {
        self.simulate_query();
        self.rows.read().clone()
    }

    pub fn find_by_id(&self, id: i32) -> Option<Element> {
        self.simulate_query();
        self.rows
            .read()
            .iter()
            .find(|e| e.atomic_number == id)
            .cloned()
    }

    pub fn upsert(&self, element: Element) {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|e| e.atomic_number == element.atomic_number) {
            Some(existing) => *existing = element,
            None => rows.push(element),
        }
    }

    pub fn remove(&self, id: i32) -> bool {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|e| e.atomic_number != id);
        rows.len() != before
    }

    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn simulate_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }
}

/// Registration exposing the store to the cache
pub fn registration(store: Arc<ElementStore>) -> EntityRegistration {
    EntityRegistration::builder(move || Ok(store.find_all()))
        .id(|e: &Element| e.atomic_number)
        .column("symbol", |e: &Element| e.symbol.clone())
        .column("period", |e: &Element| e.period)
        .column("group", |e: &Element| e.group)
        .column("phase", |e: &Element| e.phase.clone())
        .column("type", |e: &Element| e.kind.clone())
        .build()
}

/// Read-through lookups: consult the cache first, fill it on a miss
pub struct ElementRepository {
    store: Arc<ElementStore>,
    cache: Arc<EntityCache>,
    cache_enabled: bool,
}

impl ElementRepository {
    pub fn new(store: Arc<ElementStore>, cache: Arc<EntityCache>, cache_enabled: bool) -> Self {
        Self {
            store,
            cache,
            cache_enabled,
        }
    }

    pub fn find_by_id(&self, id: i32) -> Option<Arc<Element>> {
        if !self.cache_enabled {
            return self.store.find_by_id(id).map(Arc::new);
        }

        if let Some(hit) = self.cache.get::<Element>(id) {
            debug!(id, "Returning cached element");
            return Some(hit);
        }

        debug!(id, "Cache miss, querying store");
        let element = Arc::new(self.store.find_by_id(id)?);
        self.cache.put(id, Arc::clone(&element));
        Some(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::{CacheLoader, EventBus, HoardConfig, Registry};

    fn store() -> Arc<ElementStore> {
        Arc::new(ElementStore::builtin(Duration::ZERO).unwrap())
    }

    #[test]
    fn test_builtin_data_parses() {
        let store = store();
        let rows = store.find_all();
        assert_eq!(rows.len(), 36);
        assert_eq!(rows[25].symbol, "Fe");
        assert_eq!(store.find_by_id(35).unwrap().phase, "liquid");
    }

    #[test]
    fn test_upsert_and_remove() {
        let store = store();
        let mut iron = store.find_by_id(26).unwrap();
        iron.phase = "plasma".to_string();
        store.upsert(iron);

        assert_eq!(store.find_by_id(26).unwrap().phase, "plasma");
        assert!(store.remove(26));
        assert!(!store.remove(26));
        assert!(store.find_by_id(26).is_none());
    }

    #[test]
    fn test_registration_indexes_columns() {
        let store = store();
        let cache = EntityCache::new();
        let registry = Registry::new().with(registration(Arc::clone(&store)));
        CacheLoader::new(&cache, &registry, &EventBus::default_capacity())
            .initialize(&HoardConfig::default().cache);

        assert_eq!(cache.get_by_column::<Element>("symbol", "Kr").unwrap().atomic_number, 36);
        assert_eq!(cache.get_all_by_column::<Element>("group", 18).len(), 4);
        assert_eq!(cache.get_all_by_column::<Element>("phase", "gas").len(), 9);
        for column in COLUMNS {
            assert!(cache.is_column_cached::<Element>(column));
        }
    }

    #[test]
    fn test_repository_fills_cache_on_miss() {
        let store = store();
        let cache = Arc::new(EntityCache::new());
        let repo = ElementRepository::new(Arc::clone(&store), Arc::clone(&cache), true);

        assert_eq!(repo.find_by_id(8).unwrap().symbol, "O");
        assert_eq!(store.query_count(), 1);
        assert_eq!(repo.find_by_id(8).unwrap().symbol, "O");
        assert_eq!(store.query_count(), 1);
        assert!(repo.find_by_id(999).is_none());
    }

    #[test]
    fn test_repository_bypasses_disabled_cache() {
        let store = store();
        let cache = Arc::new(EntityCache::new());
        let repo = ElementRepository::new(Arc::clone(&store), Arc::clone(&cache), false);

        repo.find_by_id(1);
        repo.find_by_id(1);
        assert_eq!(store.query_count(), 2);
        assert!(!cache.is_cached::<Element>());
    }
}
