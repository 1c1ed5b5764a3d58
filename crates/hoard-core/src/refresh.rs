//! Periodic cache refresh
//!
//! A single background task reloads every cached type at a fixed rate:
//! fetch from the backing store, clear the type, preload by id, then re-preload
//! its registered columns. Between the clear and the completed preload,
//! readers of that type see misses and fall back to the store.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start()--> Running --shutdown(grace)--> Idle
//! ```
//!
//! Cycles never overlap: the periodic loop awaits each cycle before the next
//! tick, and on-demand cycles ([`RefreshScheduler::refresh_now`]) serialize
//! with it through a cycle lock.

use crate::cache::EntityCache;
use crate::config::CacheConfig;
use crate::error::HoardError;
use crate::event::{CacheEvent, EventBus};
use crate::loader::{fetch_records, panic_message, populate};
use crate::models::EntityType;
use crate::registry::{EntityRegistration, Registry};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Effective scheduling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Both `cache.enabled` and `cache.refresh.enabled`
    pub enabled: bool,
    pub delay: Duration,
    pub interval: Duration,
}

impl RefreshSettings {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled && config.refresh.enabled,
            delay: config.refresh.delay(),
            interval: config.refresh.interval(),
        }
    }
}

/// Outcome for one refreshed type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRefresh {
    pub entity: String,
    /// Primary entries dropped by the clear
    pub removed: usize,
    /// Primary entries after the reload
    pub loaded: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshFailure {
    pub entity: String,
    pub reason: String,
}

/// Type left untouched because it cannot be reloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshSkip {
    pub entity: String,
    pub reason: String,
}

/// Summary of one refresh cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    /// 1-based cycle number since the scheduler was created
    pub cycle: u64,
    pub refreshed: Vec<EntityRefresh>,
    /// Types with no registration or no identifier accessor
    pub skipped: Vec<RefreshSkip>,
    pub failed: Vec<RefreshFailure>,
    /// Stop was requested before every type was visited
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl RefreshReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

/// Counters accumulated across cycles
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    pub cycles: AtomicU64,
    pub entities_refreshed: AtomicU64,
    pub records_loaded: AtomicU64,
    pub failures: AtomicU64,
}

impl RefreshMetrics {
    pub fn snapshot(&self) -> RefreshSnapshot {
        RefreshSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entities_refreshed: self.entities_refreshed.load(Ordering::Relaxed),
            records_loaded: self.records_loaded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshSnapshot {
    pub cycles: u64,
    pub entities_refreshed: u64,
    pub records_loaded: u64,
    pub failures: u64,
}

/// State shared between the scheduler handle and its background task
struct RefreshContext {
    cache: Arc<EntityCache>,
    registry: Arc<Registry>,
    events: EventBus,
    cycle_lock: tokio::sync::Mutex<()>,
    metrics: RefreshMetrics,
}

impl RefreshContext {
    async fn run_cycle(&self, stop: Option<&watch::Receiver<bool>>) -> RefreshReport {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let mut report = RefreshReport {
            cycle: self.metrics.cycles.fetch_add(1, Ordering::Relaxed) + 1,
            ..RefreshReport::default()
        };

        let mut types = self.cache.cached_types();
        types.sort_by_key(|entity| entity.name());
        debug!(cycle = report.cycle, types = types.len(), "Refresh cycle started");

        for entity in types {
            if stop.is_some_and(|rx| *rx.borrow()) {
                info!(cycle = report.cycle, "Stop requested, ending refresh cycle early");
                report.interrupted = true;
                break;
            }

            let registration = match self.resolve(entity) {
                Ok(registration) => registration,
                Err(e) => {
                    warn!(entity = %entity, reason = %e, "Skipping refresh");
                    report.skipped.push(RefreshSkip {
                        entity: entity.name().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.refresh_entity(entity, registration).await {
                Ok(outcome) => {
                    self.metrics.entities_refreshed.fetch_add(1, Ordering::Relaxed);
                    self.metrics
                        .records_loaded
                        .fetch_add(outcome.loaded as u64, Ordering::Relaxed);
                    report.refreshed.push(outcome);
                }
                Err(e) => {
                    error!(entity = %entity, error = %e, "Failed to refresh entity");
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    self.events.publish(CacheEvent::RefreshFailed {
                        entity: entity.name().to_string(),
                        reason: e.to_string(),
                    });
                    report.failed.push(RefreshFailure {
                        entity: entity.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            cycle = report.cycle,
            refreshed = report.refreshed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            interrupted = report.interrupted,
            duration_ms = report.duration_ms,
            "Refresh cycle complete"
        );
        self.events
            .publish(CacheEvent::RefreshCompleted(report.clone()));
        report
    }

    /// Registration usable for a reload
    fn resolve(&self, entity: EntityType) -> Result<Arc<EntityRegistration>, HoardError> {
        let registration = self
            .registry
            .get(entity)
            .ok_or(HoardError::MissingRegistration {
                entity: entity.name(),
            })?;
        if registration.id_accessor().is_none() {
            return Err(HoardError::MissingIdAccessor {
                entity: entity.name(),
            });
        }
        Ok(registration)
    }

    /// Reload one type on the blocking pool
    ///
    /// The fetch happens before the clear, so a failed fetch leaves the stale
    /// entries in place.
    async fn refresh_entity(
        &self,
        entity: EntityType,
        registration: Arc<EntityRegistration>,
    ) -> Result<EntityRefresh, HoardError> {
        let cache = Arc::clone(&self.cache);
        let task = tokio::task::spawn_blocking(move || {
            let records = fetch_records(&registration)?;
            let cleared = cache.clear_for_entity(entity);
            let populated = populate(&cache, &registration, &records);
            cache.retain_type(entity);
            Ok::<_, HoardError>(EntityRefresh {
                entity: entity.name().to_string(),
                removed: cleared.entries,
                loaded: populated.records,
                columns: populated.columns,
            })
        });

        match task.await {
            Ok(result) => {
                if let Ok(outcome) = &result {
                    debug!(
                        entity = %entity,
                        removed = outcome.removed,
                        loaded = outcome.loaded,
                        "Entity refreshed"
                    );
                }
                result
            }
            Err(join) if join.is_panic() => Err(HoardError::Panicked {
                entity: entity.name(),
                reason: panic_message(join.into_panic().as_ref()),
            }),
            Err(join) => Err(HoardError::Panicked {
                entity: entity.name(),
                reason: join.to_string(),
            }),
        }
    }
}

enum SchedulerState {
    Idle,
    Running {
        stop_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

/// Owns the periodic refresh task
pub struct RefreshScheduler {
    ctx: Arc<RefreshContext>,
    settings: RefreshSettings,
    state: Mutex<SchedulerState>,
}

impl RefreshScheduler {
    pub fn new(
        cache: Arc<EntityCache>,
        registry: Arc<Registry>,
        events: EventBus,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(RefreshContext {
                cache,
                registry,
                events,
                cycle_lock: tokio::sync::Mutex::new(()),
                metrics: RefreshMetrics::default(),
            }),
            settings,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn settings(&self) -> RefreshSettings {
        self.settings
    }

    /// Arm the periodic task
    ///
    /// Returns `Ok(false)` without spawning anything when refresh is disabled.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<bool, HoardError> {
        if !self.settings.enabled {
            info!("Periodic refresh disabled");
            return Ok(false);
        }
        if self.settings.interval.is_zero() {
            return Err(HoardError::InvalidConfig {
                message: "refresh interval must be greater than 0".to_string(),
            });
        }
        let first_tick = tokio::time::Instant::now()
            .checked_add(self.settings.delay)
            .filter(|at| at.checked_add(self.settings.interval).is_some())
            .ok_or_else(|| HoardError::InvalidConfig {
                message: format!(
                    "refresh delay {:?} and interval {:?} exceed the timer range",
                    self.settings.delay, self.settings.interval
                ),
            })?;

        let mut state = self.state.lock();
        if let SchedulerState::Running { handle, .. } = &*state {
            if !handle.is_finished() {
                return Err(HoardError::SchedulerAlreadyRunning);
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.ctx), self.settings, first_tick, stop_rx));
        *state = SchedulerState::Running { stop_tx, handle };
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        match &*self.state.lock() {
            SchedulerState::Running { handle, .. } => !handle.is_finished(),
            SchedulerState::Idle => false,
        }
    }

    /// Run one cycle now, waiting for any in-flight cycle first
    pub async fn refresh_now(&self) -> RefreshReport {
        self.ctx.run_cycle(None).await
    }

    pub fn metrics(&self) -> RefreshSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// Signal stop and wait up to `grace` for the in-flight cycle
    ///
    /// Returns `false` if the task had to be aborted. A fetch already running
    /// on the blocking pool still runs to completion after an abort.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let state = std::mem::replace(&mut *self.state.lock(), SchedulerState::Idle);
        let SchedulerState::Running { stop_tx, mut handle } = state else {
            return true;
        };

        let _ = stop_tx.send(true);
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Refresh task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Refresh task did not stop within grace period, aborting"
                );
                handle.abort();
                self.ctx.events.publish(CacheEvent::SchedulerStopped);
                false
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let SchedulerState::Running { handle, .. } = &*self.state.get_mut() {
            handle.abort();
        }
    }
}

async fn run_loop(
    ctx: Arc<RefreshContext>,
    settings: RefreshSettings,
    first_tick: tokio::time::Instant,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(first_tick, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        delay_secs = settings.delay.as_secs(),
        interval_secs = settings.interval.as_secs(),
        "Refresh scheduler started"
    );

    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                ctx.run_cycle(Some(&stop_rx)).await;
            }
        }
    }

    let snapshot = ctx.metrics.snapshot();
    info!(
        cycles = snapshot.cycles,
        entities_refreshed = snapshot.entities_refreshed,
        failures = snapshot.failures,
        "Refresh scheduler stopped"
    );
    ctx.events.publish(CacheEvent::SchedulerStopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefreshConfig;
    use crate::loader::CacheLoader;

    #[derive(Debug, Clone)]
    struct Element {
        id: i32,
        phase: &'static str,
    }

    #[derive(Debug)]
    struct Isotope {
        mass: u32,
    }

    type Store = Arc<Mutex<Vec<Element>>>;

    fn element(id: i32, phase: &'static str) -> Element {
        Element { id, phase }
    }

    fn registry_over(store: &Store) -> Registry {
        let store = Arc::clone(store);
        Registry::new().with(
            EntityRegistration::builder(move || Ok(store.lock().clone()))
                .id(|e: &Element| e.id)
                .column("phase", |e: &Element| e.phase)
                .build(),
        )
    }

    fn scheduler(cache: &Arc<EntityCache>, registry: Registry, settings: RefreshSettings) -> RefreshScheduler {
        RefreshScheduler::new(
            Arc::clone(cache),
            Arc::new(registry),
            EventBus::default_capacity(),
            settings,
        )
    }

    fn disabled() -> RefreshSettings {
        RefreshSettings::from_config(&CacheConfig::default())
    }

    #[test]
    fn test_settings_require_both_flags() {
        assert!(!disabled().enabled);

        let config = CacheConfig {
            enabled: false,
            refresh: RefreshConfig {
                enabled: true,
                ..RefreshConfig::default()
            },
        };
        assert!(!RefreshSettings::from_config(&config).enabled);
    }

    #[tokio::test]
    async fn test_refresh_replaces_entity_contents() {
        let store: Store = Arc::new(Mutex::new(vec![
            element(1, "gas"),
            element(2, "gas"),
            element(3, "solid"),
        ]));
        let cache = Arc::new(EntityCache::new());
        let registry = registry_over(&store);
        CacheLoader::new(&cache, &registry, &EventBus::default_capacity())
            .initialize(&CacheConfig::default());
        assert!(cache.get::<Element>(3).is_some());

        *store.lock() = vec![element(1, "gas"), element(2, "gas"), element(4, "liquid")];
        let refresh = scheduler(&cache, registry, disabled());
        let report = refresh.refresh_now().await;

        assert!(report.is_clean());
        assert_eq!(report.refreshed.len(), 1);
        assert_eq!(report.refreshed[0].removed, 3);
        assert_eq!(report.refreshed[0].loaded, 3);

        assert!(cache.get::<Element>(1).is_some());
        assert!(cache.get::<Element>(2).is_some());
        assert!(cache.get::<Element>(3).is_none());
        assert_eq!(cache.get::<Element>(4).unwrap().phase, "liquid");
        assert!(cache.get_by_column::<Element>("phase", "solid").is_none());
        assert_eq!(cache.get_all_by_column::<Element>("phase", "liquid").len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_stale_entries() {
        let cache = Arc::new(EntityCache::new());
        cache.put(12_u32, Arc::new(Isotope { mass: 12 }));
        cache.put(1, Arc::new(element(1, "gas")));

        let store: Store = Arc::new(Mutex::new(vec![element(2, "gas")]));
        let registry = registry_over(&store).with(
            EntityRegistration::builder(|| -> anyhow::Result<Vec<Isotope>> {
                anyhow::bail!("connection reset")
            })
            .id(|i: &Isotope| i.mass)
            .build(),
        );

        let refresh = scheduler(&cache, registry, disabled());
        let report = refresh.refresh_now().await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entity, "Isotope");
        assert!(report.failed[0].reason.contains("connection reset"));
        assert_eq!(cache.get::<Isotope>(12_u32).unwrap().mass, 12);

        assert!(cache.get::<Element>(1).is_none());
        assert!(cache.get::<Element>(2).is_some());
        assert_eq!(refresh.metrics().failures, 1);
    }

    #[tokio::test]
    async fn test_panicking_accessor_is_contained() {
        let cache = Arc::new(EntityCache::new());
        cache.put(1_u32, Arc::new(Isotope { mass: 1 }));
        cache.put(1, Arc::new(element(1, "gas")));

        let store: Store = Arc::new(Mutex::new(vec![element(1, "solid")]));
        let registry = registry_over(&store).with(
            EntityRegistration::builder(|| Ok(vec![Isotope { mass: 1 }]))
                .id(|_: &Isotope| -> u32 { panic!("bad accessor") })
                .build(),
        );

        let refresh = scheduler(&cache, registry, disabled());
        let report = refresh.refresh_now().await;

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("bad accessor"));
        assert_eq!(cache.get::<Element>(1).unwrap().phase, "solid");
    }

    #[tokio::test]
    async fn test_unregistered_type_is_skipped() {
        let cache = Arc::new(EntityCache::new());
        cache.put(6_u32, Arc::new(Isotope { mass: 6 }));

        let refresh = scheduler(&cache, Registry::new(), disabled());
        let report = refresh.refresh_now().await;

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].entity, "Isotope");
        assert!(report.skipped[0].reason.contains("not registered"));
        assert!(cache.get::<Isotope>(6_u32).is_some());
    }

    #[tokio::test]
    async fn test_type_without_id_accessor_is_skipped() {
        let cache = Arc::new(EntityCache::new());
        cache.put(6_u32, Arc::new(Isotope { mass: 6 }));
        let registry = Registry::new().with(
            EntityRegistration::builder(|| Ok(vec![Isotope { mass: 7 }]))
                .column("mass", |i: &Isotope| i.mass)
                .build(),
        );

        let refresh = scheduler(&cache, registry, disabled());
        let report = refresh.refresh_now().await;

        assert!(report.is_clean());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("No identifier accessor"));
        assert!(cache.get::<Isotope>(6_u32).is_some());
        assert!(cache.get::<Isotope>(7_u32).is_none());
    }

    #[tokio::test]
    async fn test_empty_reload_keeps_type_cached() {
        let store: Store = Arc::new(Mutex::new(vec![element(1, "gas")]));
        let cache = Arc::new(EntityCache::new());
        cache.put(1, Arc::new(element(1, "gas")));

        let refresh = scheduler(&cache, registry_over(&store), disabled());
        store.lock().clear();
        refresh.refresh_now().await;

        assert!(cache.is_cached::<Element>());
        assert!(cache.get::<Element>(1).is_none());

        store.lock().push(element(7, "solid"));
        refresh.refresh_now().await;
        assert!(cache.get::<Element>(7).is_some());
    }

    #[tokio::test]
    async fn test_cycles_are_numbered_and_published() {
        let cache = Arc::new(EntityCache::new());
        let refresh = scheduler(&cache, Registry::new(), disabled());
        let mut rx = refresh.ctx.events.subscribe();

        assert_eq!(refresh.refresh_now().await.cycle, 1);
        assert_eq!(refresh.refresh_now().await.cycle, 2);

        match rx.recv().await.unwrap() {
            CacheEvent::RefreshCompleted(report) => assert_eq!(report.cycle, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_disabled_is_noop() {
        let cache = Arc::new(EntityCache::new());
        let refresh = scheduler(&cache, Registry::new(), disabled());

        assert!(!refresh.start().unwrap());
        assert!(!refresh.is_running());
        assert!(refresh.shutdown(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_start_twice_rejected_then_stops() {
        let cache = Arc::new(EntityCache::new());
        let settings = RefreshSettings {
            enabled: true,
            delay: Duration::from_secs(3600),
            interval: Duration::from_secs(3600),
        };
        let refresh = scheduler(&cache, Registry::new(), settings);

        assert!(refresh.start().unwrap());
        assert!(refresh.is_running());
        assert!(matches!(
            refresh.start(),
            Err(HoardError::SchedulerAlreadyRunning)
        ));

        assert!(refresh.shutdown(Duration::from_secs(1)).await);
        assert!(!refresh.is_running());
        assert_eq!(refresh.metrics().cycles, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let cache = Arc::new(EntityCache::new());
        let settings = RefreshSettings {
            enabled: true,
            delay: Duration::ZERO,
            interval: Duration::ZERO,
        };
        let refresh = scheduler(&cache, Registry::new(), settings);
        assert!(matches!(refresh.start(), Err(HoardError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_unrepresentable_delay_rejected() {
        let cache = Arc::new(EntityCache::new());
        let settings = RefreshSettings {
            enabled: true,
            delay: Duration::MAX,
            interval: Duration::from_secs(60),
        };
        let refresh = scheduler(&cache, Registry::new(), settings);

        assert!(matches!(refresh.start(), Err(HoardError::InvalidConfig { .. })));
        assert!(!refresh.is_running());
    }

    #[tokio::test]
    async fn test_capped_config_starts() {
        let mut config = CacheConfig::default();
        config.refresh.enabled = true;
        config.refresh.delay_minutes = crate::config::MAX_REFRESH_MINUTES;
        config.refresh.interval_minutes = crate::config::MAX_REFRESH_MINUTES;
        let cache = Arc::new(EntityCache::new());
        let refresh = scheduler(&cache, Registry::new(), RefreshSettings::from_config(&config));

        assert!(refresh.start().unwrap());
        assert!(refresh.shutdown(Duration::from_secs(1)).await);
    }
}
