//! hoard-core - Core library for hoard
//!
//! In-process secondary cache for persisted records: a primary-key index and
//! grouped secondary-column indices per entity type, a warm-up loader, a
//! periodic refresh scheduler and a size inspector.

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod inspector;
pub mod loader;
pub mod models;
pub mod refresh;
pub mod registry;
pub mod service;
pub mod size;

pub use cache::{ClearedCounts, EntityCache};
pub use config::{CacheConfig, HoardConfig, LogLevel, LoggingConfig, RefreshConfig};
pub use error::{ErrorSeverity, HoardError, LoadError, LoadReport};
pub use event::{CacheEvent, EventBus};
pub use inspector::{format_mb, CacheInspector, CacheReport};
pub use loader::CacheLoader;
pub use models::{EntityType, IntoKey, Key, Record};
pub use refresh::{RefreshReport, RefreshScheduler, RefreshSettings};
pub use registry::{EntityRegistration, Registry};
pub use service::Hoard;
