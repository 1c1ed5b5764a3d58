//! Registration table for cached entity types
//!
//! Built once at startup by the discovery collaborator: for each type, a fetch
//! function supplying the full record set, an identifier accessor and any
//! number of named column accessors.

use crate::models::{erase_accessor, Accessor, EntityType, IntoKey, Record};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Supplies every current record of one entity type (blocking)
pub type FetchFn = Arc<dyn Fn() -> anyhow::Result<Vec<Record>> + Send + Sync>;

/// Named column accessor
#[derive(Clone)]
pub struct ColumnAccessor {
    pub name: String,
    pub accessor: Accessor,
}

/// Everything the cache needs to load one entity type
#[derive(Clone)]
pub struct EntityRegistration {
    entity: EntityType,
    fetch: FetchFn,
    id_accessor: Option<Accessor>,
    columns: Vec<ColumnAccessor>,
}

impl EntityRegistration {
    /// Start a typed registration from a fetch function
    pub fn builder<T, F>(fetch: F) -> EntityRegistrationBuilder<T>
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<Vec<T>> + Send + Sync + 'static,
    {
        EntityRegistrationBuilder {
            fetch: Arc::new(move || {
                Ok(fetch()?
                    .into_iter()
                    .map(|record| Arc::new(record) as Record)
                    .collect())
            }),
            id_accessor: None,
            columns: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Run the collaborator fetch function
    pub fn fetch_all(&self) -> anyhow::Result<Vec<Record>> {
        (self.fetch)()
    }

    pub fn id_accessor(&self) -> Option<&Accessor> {
        self.id_accessor.as_ref()
    }

    pub fn columns(&self) -> &[ColumnAccessor] {
        &self.columns
    }
}

impl fmt::Debug for EntityRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistration")
            .field("entity", &self.entity)
            .field("has_id_accessor", &self.id_accessor.is_some())
            .field(
                "columns",
                &self.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Typed builder for [`EntityRegistration`]
pub struct EntityRegistrationBuilder<T> {
    fetch: FetchFn,
    id_accessor: Option<Accessor>,
    columns: Vec<ColumnAccessor>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> EntityRegistrationBuilder<T> {
    /// Identifier accessor; records yielding `None` are skipped
    pub fn id<K, F>(mut self, accessor: F) -> Self
    where
        K: IntoKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.id_accessor = Some(erase_accessor(accessor));
        self
    }

    /// Secondary column accessor
    pub fn column<K, F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        K: IntoKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.columns.push(ColumnAccessor {
            name: name.into(),
            accessor: erase_accessor(accessor),
        });
        self
    }

    pub fn build(self) -> EntityRegistration {
        EntityRegistration {
            entity: EntityType::of::<T>(),
            fetch: self.fetch,
            id_accessor: self.id_accessor,
            columns: self.columns,
        }
    }
}

/// Registration table, iterated in registration order
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: Vec<Arc<EntityRegistration>>,
    by_type: HashMap<EntityType, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration; a second registration for the same type replaces the first
    pub fn register(&mut self, registration: EntityRegistration) {
        let entity = registration.entity();
        let registration = Arc::new(registration);
        match self.by_type.get(&entity) {
            Some(&index) => {
                warn!(entity = %entity, "Entity registered twice, keeping the latest");
                self.entries[index] = registration;
            }
            None => {
                self.by_type.insert(entity, self.entries.len());
                self.entries.push(registration);
            }
        }
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, registration: EntityRegistration) -> Self {
        self.register(registration);
        self
    }

    pub fn get(&self, entity: EntityType) -> Option<Arc<EntityRegistration>> {
        self.by_type
            .get(&entity)
            .map(|&index| Arc::clone(&self.entries[index]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityRegistration>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
