//! Cache size analysis
//!
//! Walks both indices and produces per-type and per-column counts with
//! estimated memory. Estimates come from [`crate::size`] and are diagnostic
//! only.

use crate::cache::EntityCache;
use crate::size::{estimate_column_index, estimate_column_map, estimate_primary_map};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Primary index usage for one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityUsage {
    pub entity: String,
    pub entries: usize,
    pub bytes: u64,
}

/// Column index usage for one `(type, column)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnUsage {
    pub entity: String,
    pub column: String,
    pub distinct_values: usize,
    /// Record references across all value groups
    pub references: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheTotals {
    pub primary_entries: usize,
    pub primary_bytes: u64,
    pub column_distinct_values: usize,
    pub column_references: usize,
    /// Includes the per-type column-name maps
    pub column_bytes: u64,
    pub primary_types: usize,
    pub column_types: usize,
    pub total_bytes: u64,
}

/// Point-in-time size report
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub generated_at: DateTime<Utc>,
    /// Sorted by entity name
    pub entities: Vec<EntityUsage>,
    /// Sorted by entity then column name
    pub columns: Vec<ColumnUsage>,
    /// Column memory per type, keyed by entity name
    pub column_bytes_by_entity: BTreeMap<String, u64>,
    pub totals: CacheTotals,
}

impl CacheReport {
    /// Emit the report at INFO, one line per type and column plus a summary
    pub fn log(&self) {
        info!("=== Cache Size Analysis ===");
        for usage in &self.entities {
            info!(
                entity = %usage.entity,
                entries = usage.entries,
                bytes = usage.bytes,
                mb = %format_mb(usage.bytes),
                "Primary index"
            );
        }
        for usage in &self.columns {
            info!(
                entity = %usage.entity,
                column = %usage.column,
                distinct_values = usage.distinct_values,
                references = usage.references,
                bytes = usage.bytes,
                mb = %format_mb(usage.bytes),
                "Column index"
            );
        }

        let totals = &self.totals;
        info!(
            primary_entries = totals.primary_entries,
            primary_mb = %format_mb(totals.primary_bytes),
            column_distinct_values = totals.column_distinct_values,
            column_references = totals.column_references,
            column_mb = %format_mb(totals.column_bytes),
            primary_types = totals.primary_types,
            column_types = totals.column_types,
            total_bytes = totals.total_bytes,
            total_mb = %format_mb(totals.total_bytes),
            "Cache summary"
        );
    }
}

/// Bytes as megabytes with two decimals
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}

/// Read-only view producing [`CacheReport`]s
pub struct CacheInspector<'a> {
    cache: &'a EntityCache,
}

impl<'a> CacheInspector<'a> {
    pub fn new(cache: &'a EntityCache) -> Self {
        Self { cache }
    }

    /// Snapshot both indices
    ///
    /// Each map is walked independently while writers may still be active,
    /// so counts reflect some recent state rather than one instant.
    pub fn report(&self) -> CacheReport {
        let mut totals = CacheTotals::default();

        let mut entities: Vec<EntityUsage> = self
            .cache
            .primary_indices()
            .into_iter()
            .map(|(entity, map)| EntityUsage {
                entity: entity.name().to_string(),
                entries: map.len(),
                bytes: estimate_primary_map(&map),
            })
            .collect();
        entities.sort_by(|a, b| a.entity.cmp(&b.entity));

        for usage in &entities {
            totals.primary_entries += usage.entries;
            totals.primary_bytes += usage.bytes;
        }
        totals.primary_types = entities.len();

        let mut columns = Vec::new();
        let mut column_bytes_by_entity = BTreeMap::new();
        for (entity, index) in self.cache.column_indices() {
            let entity_bytes = estimate_column_index(&index);
            *column_bytes_by_entity
                .entry(entity.name().to_string())
                .or_insert(0) += entity_bytes;
            totals.column_bytes += entity_bytes;
            totals.column_types += 1;

            for column in index.iter() {
                let map = column.value();
                let references = map.iter().map(|group| group.value().len()).sum();
                columns.push(ColumnUsage {
                    entity: entity.name().to_string(),
                    column: column.key().clone(),
                    distinct_values: map.len(),
                    references,
                    bytes: estimate_column_map(map),
                });
            }
        }
        columns.sort_by(|a, b| (&a.entity, &a.column).cmp(&(&b.entity, &b.column)));

        for usage in &columns {
            totals.column_distinct_values += usage.distinct_values;
            totals.column_references += usage.references;
        }
        totals.total_bytes = totals.primary_bytes + totals.column_bytes;

        CacheReport {
            generated_at: Utc::now(),
            entities,
            columns,
            column_bytes_by_entity,
            totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Element {
        id: i32,
        group: i32,
    }

    fn elements(count: i32) -> Vec<Arc<Element>> {
        (1..=count)
            .map(|id| Arc::new(Element { id, group: id % 18 }))
            .collect()
    }

    #[test]
    fn test_empty_cache_report() {
        let cache = EntityCache::new();
        let report = CacheInspector::new(&cache).report();

        assert!(report.entities.is_empty());
        assert!(report.columns.is_empty());
        assert_eq!(report.totals, CacheTotals::default());
    }

    #[test]
    fn test_report_counts_entries() {
        let cache = EntityCache::new();
        cache.preload(&elements(100), |e| e.id);

        let report = CacheInspector::new(&cache).report();

        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.entities[0].entity, "Element");
        assert_eq!(report.entities[0].entries, 100);
        assert!(report.entities[0].bytes > 0);
        assert_eq!(report.totals.primary_entries, 100);
        assert_eq!(report.totals.total_bytes, report.totals.primary_bytes);
    }

    #[test]
    fn test_memory_grows_with_contents() {
        let cache = EntityCache::new();
        cache.preload(&elements(10), |e| e.id);
        let small = CacheInspector::new(&cache).report().totals.total_bytes;

        cache.preload(&elements(50), |e| e.id);
        let large = CacheInspector::new(&cache).report().totals.total_bytes;

        assert!(small > 0);
        assert!(large > small);
    }

    #[test]
    fn test_column_usage() {
        let cache = EntityCache::new();
        let records = elements(36);
        cache.preload(&records, |e| e.id);
        cache.preload_by_column("group", &records, |e| e.group);

        let report = CacheInspector::new(&cache).report();

        assert_eq!(report.columns.len(), 1);
        let column = &report.columns[0];
        assert_eq!(column.column, "group");
        assert_eq!(column.distinct_values, 18);
        assert_eq!(column.references, 36);
        assert_eq!(report.totals.column_types, 1);
        assert!(report.column_bytes_by_entity["Element"] > column.bytes);
        assert_eq!(
            report.totals.total_bytes,
            report.totals.primary_bytes + report.totals.column_bytes
        );
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(0), "0.00");
        assert_eq!(format_mb(1024 * 1024), "1.00");
        assert_eq!(format_mb(1536 * 1024), "1.50");
    }

    #[test]
    fn test_report_serializes() {
        let cache = EntityCache::new();
        cache.preload(&elements(3), |e| e.id);

        let json = serde_json::to_value(CacheInspector::new(&cache).report()).unwrap();
        assert_eq!(json["totals"]["primary_entries"], 3);
        assert!(json["generated_at"].is_string());
    }
}
