//! Cached type descriptors and type-erased records

use super::key::Key;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A cached record as stored in the indices.
///
/// Records are opaque to the cache: they are shared via `Arc` between the
/// primary and column indices and handed back to callers as `Arc<T>`.
pub type Record = Arc<dyn Any + Send + Sync>;

/// Type-erased accessor extracting an identifier or column value from a record.
///
/// Returns `None` when the record has no value (null column, failed extraction
/// or a record of an unexpected type).
pub type Accessor = Arc<dyn Fn(&Record) -> Option<Key> + Send + Sync>;

/// Wrap a typed accessor so it can be applied to type-erased records
pub fn erase_accessor<T, K, F>(accessor: F) -> Accessor
where
    T: Any + Send + Sync,
    K: super::IntoKey,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    Arc::new(move |record: &Record| {
        (**record)
            .downcast_ref::<T>()
            .and_then(|typed| accessor(typed).into_key())
    })
}

/// Descriptor of a cached record type
///
/// Equality and hashing use the Rust `TypeId` only; the name is kept for
/// logging and reports.
#[derive(Clone, Copy)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    /// Descriptor for the Rust type `T`
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    /// Short display name (module path stripped)
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityType({})", self.name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Strip the module path from a `type_name`, keeping generic arguments intact.
///
/// `app::model::Element` → `Element`, `app::Wrapper<app::Inner>` → `Wrapper<app::Inner>`
fn short_type_name(full: &'static str) -> &'static str {
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}
