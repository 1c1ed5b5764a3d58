//! Dual-index entity cache
//!
//! Two independent DashMap-backed indices per cached type:
//! - primary: id → record (last write wins)
//! - column: column name → value → records (append order preserved)
//!
//! Both indices are internally synchronized; per-key operations are
//! linearizable through DashMap shard locks. There is no ordering across keys
//! or across the two indices: a refresh clears and repopulates a type
//! non-atomically, so concurrent readers may see misses for that type until
//! the reload completes, but never a partially built record.

use crate::models::{Accessor, EntityType, IntoKey, Key, Record};
use dashmap::DashMap;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) type PrimaryMap = DashMap<Key, Record>;
pub(crate) type ColumnMap = DashMap<Key, Vec<Record>>;
pub(crate) type ColumnIndex = DashMap<String, Arc<ColumnMap>>;

/// Counts returned by [`EntityCache::clear_for_entity`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedCounts {
    /// Primary index entries removed
    pub entries: usize,
    /// Column value groups removed, summed over all columns
    pub column_groups: usize,
}

/// Process-local record cache keyed by entity type
///
/// Constructed explicitly and shared via `Arc`; independent instances never
/// observe each other.
#[derive(Default)]
pub struct EntityCache {
    primary: DashMap<EntityType, Arc<PrimaryMap>>,
    columns: DashMap<EntityType, Arc<ColumnIndex>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ===================
    // Preload
    // ===================

    /// Upsert `records` into the primary index by extracted id
    ///
    /// Additive: ids not present in `records` keep their current entry. Records
    /// whose id is absent are skipped. Returns the number of records inserted.
    pub fn preload<T, K, F>(&self, records: &[Arc<T>], id_of: F) -> usize
    where
        T: Any + Send + Sync,
        K: IntoKey,
        F: Fn(&T) -> K,
    {
        self.upsert_primary(
            EntityType::of::<T>(),
            records
                .iter()
                .map(|r| (id_of(&**r).into_key(), Arc::clone(r) as Record)),
        )
    }

    /// Type-erased [`preload`](Self::preload)
    pub fn preload_records(&self, entity: EntityType, records: &[Record], id_of: &Accessor) -> usize {
        self.upsert_primary(
            entity,
            records.iter().map(|r| (id_of(r), Arc::clone(r))),
        )
    }

    /// Group `records` by extracted column value and store each group
    ///
    /// Each group replaces any existing group for the same value; values not
    /// present in `records` are kept. Records with an absent value are
    /// excluded. Returns the number of groups written.
    pub fn preload_by_column<T, K, F>(&self, column: &str, records: &[Arc<T>], column_of: F) -> usize
    where
        T: Any + Send + Sync,
        K: IntoKey,
        F: Fn(&T) -> K,
    {
        self.replace_groups(
            EntityType::of::<T>(),
            column,
            records
                .iter()
                .map(|r| (column_of(&**r).into_key(), Arc::clone(r) as Record)),
        )
    }

    /// Type-erased [`preload_by_column`](Self::preload_by_column)
    pub fn preload_records_by_column(
        &self,
        entity: EntityType,
        column: &str,
        records: &[Record],
        column_of: &Accessor,
    ) -> usize {
        self.replace_groups(
            entity,
            column,
            records.iter().map(|r| (column_of(r), Arc::clone(r))),
        )
    }

    fn upsert_primary<I>(&self, entity: EntityType, entries: I) -> usize
    where
        I: ExactSizeIterator<Item = (Option<Key>, Record)>,
    {
        if entries.len() == 0 {
            return 0;
        }

        let map = self.primary_or_create(entity);
        let mut inserted = 0;
        let mut skipped = 0;
        for (id, record) in entries {
            match id {
                Some(id) => {
                    map.insert(id, record);
                    inserted += 1;
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            trace!(entity = %entity, skipped, "Skipped records without identifier");
        }
        debug!(entity = %entity, inserted, total = map.len(), "Primary index preloaded");
        inserted
    }

    fn replace_groups<I>(&self, entity: EntityType, column: &str, entries: I) -> usize
    where
        I: ExactSizeIterator<Item = (Option<Key>, Record)>,
    {
        if entries.len() == 0 {
            return 0;
        }

        // Group locally first so each value is published in one insert
        let mut groups: HashMap<Key, Vec<Record>> = HashMap::new();
        let mut skipped = 0;
        for (value, record) in entries {
            match value {
                Some(value) => groups.entry(value).or_default().push(record),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            trace!(entity = %entity, column, skipped, "Skipped records without column value");
        }

        let index = self.column_or_create(entity, column);
        let written = groups.len();
        for (value, group) in groups {
            index.insert(value, group);
        }

        debug!(entity = %entity, column, groups = written, "Column index preloaded");
        written
    }

    // ===================
    // Lookups
    // ===================

    /// Record for `id`, or `None` on a miss or an absent id
    pub fn get<T>(&self, id: impl IntoKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let id = id.into_key()?;
        let record = self
            .primary_for(EntityType::of::<T>())?
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))?;
        downcast(record)
    }

    /// First record of the `(column, value)` group
    pub fn get_by_column<T>(&self, column: &str, value: impl IntoKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = value.into_key()?;
        let record = self
            .column_for(EntityType::of::<T>(), column)?
            .get(&value)
            .and_then(|group| group.first().cloned())?;
        downcast(record)
    }

    /// Whole `(column, value)` group in insertion order; empty on a miss
    pub fn get_all_by_column<T>(&self, column: &str, value: impl IntoKey) -> Vec<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let Some(value) = value.into_key() else {
            return Vec::new();
        };
        let Some(index) = self.column_for(EntityType::of::<T>(), column) else {
            return Vec::new();
        };

        // Clone the Arcs out so no shard lock is held while downcasting
        let group: Vec<Record> = index
            .get(&value)
            .map(|group| group.value().clone())
            .unwrap_or_default();
        group.into_iter().filter_map(downcast).collect()
    }

    // ===================
    // Incremental writes
    // ===================

    /// Insert or overwrite a single primary entry; no-op on an absent id
    pub fn put<T>(&self, id: impl IntoKey, record: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let Some(id) = id.into_key() else {
            return;
        };
        let entity = EntityType::of::<T>();
        trace!(entity = %entity, id = %id, "Caching record");
        self.primary_or_create(entity).insert(id, record);
    }

    /// Append to the `(column, value)` group; no-op on an absent value
    pub fn put_by_column<T>(&self, column: &str, value: impl IntoKey, record: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let Some(value) = value.into_key() else {
            return;
        };
        self.column_or_create(EntityType::of::<T>(), column)
            .entry(value)
            .or_default()
            .push(record);
    }

    // ===================
    // State
    // ===================

    pub fn is_cached<T: Any>(&self) -> bool {
        self.is_type_cached(EntityType::of::<T>())
    }

    /// True once a primary index exists for `entity`, even if empty
    pub fn is_type_cached(&self, entity: EntityType) -> bool {
        self.primary.contains_key(&entity)
    }

    pub fn is_column_cached<T: Any>(&self, column: &str) -> bool {
        self.column_for(EntityType::of::<T>(), column).is_some()
    }

    /// Snapshot of the types that currently have a primary index
    pub fn cached_types(&self) -> Vec<EntityType> {
        self.primary.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of primary entries for `entity`
    pub fn entry_count(&self, entity: EntityType) -> usize {
        self.primary_for(entity).map(|m| m.len()).unwrap_or(0)
    }

    /// Empty both indices for every type
    pub fn clear(&self) {
        let types = self.primary.len();
        self.primary.clear();
        self.columns.clear();
        debug!(types, "Cache cleared");
    }

    /// Empty both indices for `entity` only
    pub fn clear_for_entity(&self, entity: EntityType) -> ClearedCounts {
        let entries = self
            .primary
            .remove(&entity)
            .map(|(_, map)| map.len())
            .unwrap_or(0);
        let column_groups = self
            .columns
            .remove(&entity)
            .map(|(_, index)| index.iter().map(|column| column.value().len()).sum())
            .unwrap_or(0);

        debug!(entity = %entity, entries, column_groups, "Entity cleared");
        ClearedCounts {
            entries,
            column_groups,
        }
    }

    // ===================
    // Internal access
    // ===================

    /// Keep `entity` marked as cached with an empty primary index
    pub(crate) fn retain_type(&self, entity: EntityType) {
        self.primary_or_create(entity);
    }

    pub(crate) fn primary_indices(&self) -> Vec<(EntityType, Arc<PrimaryMap>)> {
        self.primary
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    pub(crate) fn column_indices(&self) -> Vec<(EntityType, Arc<ColumnIndex>)> {
        self.columns
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    // Outer guards are dropped before the inner map is touched, so no
    // operation ever holds an outer shard lock while locking an inner one.

    fn primary_for(&self, entity: EntityType) -> Option<Arc<PrimaryMap>> {
        self.primary.get(&entity).map(|m| Arc::clone(m.value()))
    }

    fn primary_or_create(&self, entity: EntityType) -> Arc<PrimaryMap> {
        Arc::clone(&self.primary.entry(entity).or_default())
    }

    fn column_for(&self, entity: EntityType, column: &str) -> Option<Arc<ColumnMap>> {
        let index = self.columns.get(&entity).map(|i| Arc::clone(i.value()))?;
        let map = index.get(column).map(|m| Arc::clone(m.value()));
        map
    }

    fn column_or_create(&self, entity: EntityType, column: &str) -> Arc<ColumnMap> {
        let index = Arc::clone(&self.columns.entry(entity).or_default());
        let map = Arc::clone(&index.entry(column.to_owned()).or_default());
        map
    }
}

fn downcast<T: Any + Send + Sync>(record: Record) -> Option<Arc<T>> {
    record.downcast::<T>().ok()
}
