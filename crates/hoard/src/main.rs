//! hoard - demo and diagnostics for the hoard entity cache

mod cli;
mod store;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hoard_core::{
    CacheEvent, CacheLoader, EntityCache, EventBus, Hoard, HoardConfig, Key, LoadReport,
    LoggingConfig, RefreshScheduler, RefreshSettings, Registry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{Element, ElementRepository, ElementStore, COLUMNS};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hoard",
    version,
    about = "In-process entity cache demo and diagnostics",
    long_about = "Preloads a sample periodic-table store into the hoard entity cache and\n\
                  exercises primary-key lookups, secondary-column lookups, refresh and\n\
                  size analysis.\n\
                  \n\
                  Examples:\n\
                    hoard                              # Cached vs uncached timing (default)\n\
                    hoard demo 26 8 1 --json           # Timing for specific ids\n\
                    hoard inspect                      # Cache size analysis\n\
                    hoard lookup Fe --column symbol    # Secondary-column lookup\n\
                    hoard lookup 18 --column group     # All noble gases\n\
                    hoard refresh --remove 36          # Reload after a store change\n\
                    hoard watch --interval-secs 2      # Run the periodic scheduler\n\
                  \n\
                  Environment Variables:\n\
                    HOARD_CONFIG                       # Config file path\n\
                    HOARD_CACHE_ENABLED                # cache.enabled\n\
                    HOARD_REFRESH_ENABLED              # cache.refresh.enabled\n\
                    HOARD_REFRESH_INTERVAL_MINUTES     # cache.refresh.intervalMinutes\n\
                    HOARD_REFRESH_DELAY_MINUTES        # cache.refresh.delayMinutes\n\
                    HOARD_LOG_ENABLED                  # logging.enabled\n\
                    HOARD_LOG_LEVEL                    # logging.level\n\
                    RUST_LOG                           # Overrides logging.level when set"
)]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Path to the TOML configuration file (missing file uses defaults)
    #[arg(long, env = "HOARD_CONFIG", default_value = "hoard.toml")]
    config: PathBuf,

    /// Simulated store latency per query, in milliseconds
    #[arg(long, env = "HOARD_LATENCY_MS", default_value = "20")]
    latency_ms: u64,

    /// Disable ANSI colors in tables
    #[arg(long, env = "HOARD_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Compare cached and uncached lookups (default)
    Demo {
        /// Atomic numbers to look up
        #[arg(default_values_t = [1, 2, 3, 4, 5])]
        ids: Vec<i32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Warm up the cache and print the size analysis
    Inspect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up elements by atomic number or by column value
    Lookup {
        /// Atomic number, or the column value when --column is given
        value: String,
        /// Secondary column: symbol, period, group, phase, type
        #[arg(long)]
        column: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Warm up, change the store, then run one refresh cycle
    Refresh {
        /// Atomic numbers to delete from the store before refreshing
        #[arg(long)]
        remove: Vec<i32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the periodic scheduler with second-level timings
    Watch {
        /// Seconds between refresh cycles
        #[arg(long, default_value = "2")]
        interval_secs: u64,
        /// Stop after this many seconds
        #[arg(long, default_value = "10")]
        duration_secs: u64,
        /// Grace period for the final shutdown
        #[arg(long, default_value = "5")]
        grace_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = HoardConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    config
        .apply_env()
        .context("Invalid HOARD_* environment override")?;

    init_tracing(&config.logging);

    let store = Arc::new(ElementStore::builtin(Duration::from_millis(cli.latency_ms))?);
    let no_color = cli.no_color;

    let mode = cli.mode.unwrap_or(Mode::Demo {
        ids: vec![1, 2, 3, 4, 5],
        json: false,
    });

    match mode {
        Mode::Demo { ids, json } => run_demo(config, store, ids, json).await?,
        Mode::Inspect { json } => run_inspect(config, store, json, no_color).await?,
        Mode::Lookup {
            value,
            column,
            json,
        } => run_lookup(config, store, value, column, json, no_color).await?,
        Mode::Refresh { remove, json } => {
            run_refresh(config, store, remove, json, no_color).await?
        }
        Mode::Watch {
            interval_secs,
            duration_secs,
            grace_secs,
        } => run_watch(config, store, interval_secs, duration_secs, grace_secs).await?,
    }

    Ok(())
}

/// fmt subscriber on stderr; `RUST_LOG` takes precedence over `logging.level`
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(logging.level_filter().into()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn registry(store: &Arc<ElementStore>) -> Registry {
    Registry::new().with(store::registration(Arc::clone(store)))
}

async fn warm_up(config: HoardConfig, store: &Arc<ElementStore>) -> Hoard {
    let hoard = Hoard::new(registry(store), config);
    let report = hoard.initialize().await;
    print_load_errors(&report);
    hoard
}

fn print_load_errors(report: &LoadReport) {
    if !report.has_errors() {
        return;
    }
    let (warnings, errors) = report.error_count();
    eprintln!("Cache warm-up: {} warnings, {} errors", warnings, errors);
    for error in &report.errors {
        eprintln!("  - {}: {}", error.entity, error.message);
    }
}

async fn run_demo(
    config: HoardConfig,
    store: Arc<ElementStore>,
    ids: Vec<i32>,
    json: bool,
) -> Result<()> {
    let cache_enabled = config.cache.enabled;
    let hoard = warm_up(config, &store).await;
    let repository = Arc::new(ElementRepository::new(
        Arc::clone(&store),
        Arc::clone(hoard.cache()),
        cache_enabled,
    ));

    let queries_before = store.query_count();
    let cache_time = timed_lookups(&repository, &ids).await?;

    if !json {
        println!("Current cache status:");
        for usage in hoard.report().entities {
            println!("  {}: {} cached entities", usage.entity, usage.entries);
        }
        println!();
    }

    // Second pass goes to the store
    hoard.clear();
    let store_time = timed_lookups(&repository, &ids).await?;

    let timing = cli::DemoTiming::new(
        ids,
        cache_time,
        store_time,
        store.query_count() - queries_before,
    );
    println!("{}", cli::format_timing(&timing, json));
    Ok(())
}

/// Run the lookups on the blocking pool; store queries sleep
async fn timed_lookups(repository: &Arc<ElementRepository>, ids: &[i32]) -> Result<Duration> {
    let repository = Arc::clone(repository);
    let ids = ids.to_vec();
    tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        for id in ids {
            repository.find_by_id(id);
        }
        start.elapsed()
    })
    .await
    .context("Lookup task failed")
}

async fn run_inspect(
    config: HoardConfig,
    store: Arc<ElementStore>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let hoard = warm_up(config, &store).await;
    let report = hoard.report();
    report.log();
    println!("{}", cli::format_report(&report, json, no_color));
    Ok(())
}

/// Integers become integer keys; anything else is matched as text
fn parse_column_value(value: &str) -> Key {
    match value.parse::<i64>() {
        Ok(n) => Key::Int(n),
        Err(_) => Key::text(value),
    }
}

async fn run_lookup(
    config: HoardConfig,
    store: Arc<ElementStore>,
    value: String,
    column: Option<String>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let hoard = warm_up(config, &store).await;
    let cache = hoard.cache();

    let found: Vec<Arc<Element>> = match column {
        None => {
            let id: i32 = value
                .parse()
                .with_context(|| format!("'{}' is not an atomic number; use --column", value))?;
            cache.get::<Element>(id).into_iter().collect()
        }
        Some(column) => {
            if !COLUMNS.contains(&column.as_str()) {
                bail!(
                    "Unknown column '{}' (expected one of: {})",
                    column,
                    COLUMNS.join(", ")
                );
            }
            cache.get_all_by_column::<Element>(&column, parse_column_value(&value))
        }
    };

    println!("{}", cli::format_elements(&found, json, no_color));
    Ok(())
}

async fn run_refresh(
    config: HoardConfig,
    store: Arc<ElementStore>,
    remove: Vec<i32>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let hoard = warm_up(config, &store).await;

    for id in &remove {
        if !store.remove(*id) {
            eprintln!("No element {} in the store", id);
        }
    }

    let report = hoard.refresh_now().await;
    println!("{}", cli::format_refresh(&report, json, no_color));

    if !json {
        for id in &remove {
            let state = if hoard.cache().get::<Element>(*id).is_some() {
                "still cached"
            } else {
                "evicted"
            };
            println!("Element {}: {}", id, state);
        }
    }
    Ok(())
}

async fn run_watch(
    config: HoardConfig,
    store: Arc<ElementStore>,
    interval_secs: u64,
    duration_secs: u64,
    grace_secs: u64,
) -> Result<()> {
    if !config.cache.enabled {
        println!("Cache disabled (cache.enabled = false), nothing to refresh.");
        return Ok(());
    }
    if interval_secs == 0 {
        bail!("--interval-secs must be greater than 0");
    }

    let cache = Arc::new(EntityCache::new());
    let registry = Arc::new(registry(&store));
    let events = EventBus::default_capacity();
    let mut rx = events.subscribe();

    let report = CacheLoader::new(&cache, &registry, &events).initialize(&config.cache);
    print_load_errors(&report);

    let interval = Duration::from_secs(interval_secs);
    let scheduler = RefreshScheduler::new(
        Arc::clone(&cache),
        registry,
        events,
        RefreshSettings {
            enabled: true,
            delay: interval,
            interval,
        },
    );
    scheduler.start()?;
    println!(
        "Refreshing every {}s for {}s ({} elements cached)",
        interval_secs,
        duration_secs,
        report.records_cached
    );

    let deadline = tokio::time::sleep(Duration::from_secs(duration_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = rx.recv() => match event {
                Ok(CacheEvent::RefreshCompleted(report)) => println!(
                    "cycle {}: {} refreshed, {} failed in {} ms",
                    report.cycle,
                    report.refreshed.len(),
                    report.failed.len(),
                    report.duration_ms
                ),
                Ok(CacheEvent::RefreshFailed { entity, reason }) => {
                    eprintln!("refresh of {} failed: {}", entity, reason)
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("missed {} events", skipped)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let graceful = scheduler.shutdown(Duration::from_secs(grace_secs)).await;
    let metrics = scheduler.metrics();
    println!(
        "Stopped{}: {} cycles, {} entity reloads, {} failures",
        if graceful { "" } else { " (aborted)" },
        metrics.cycles,
        metrics.entities_refreshed,
        metrics.failures
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_mode_is_demo() {
        let cli = Cli::try_parse_from(["hoard"]).unwrap();
        assert!(cli.mode.is_none());
        assert_eq!(cli.latency_ms, 20);
    }

    #[test]
    fn test_demo_ids_default() {
        let cli = Cli::try_parse_from(["hoard", "demo"]).unwrap();
        match cli.mode {
            Some(Mode::Demo { ids, json }) => {
                assert_eq!(ids, vec![1, 2, 3, 4, 5]);
                assert!(!json);
            }
            _ => panic!("expected demo mode"),
        }
    }

    #[test]
    fn test_parse_column_value() {
        assert_eq!(parse_column_value("18"), Key::Int(18));
        assert_eq!(parse_column_value("gas"), Key::text("gas"));
    }

    #[tokio::test]
    async fn test_timed_lookups_run_off_the_runtime() {
        let store = Arc::new(ElementStore::builtin(Duration::from_millis(5)).unwrap());
        let cache = Arc::new(EntityCache::new());
        let repository = Arc::new(ElementRepository::new(Arc::clone(&store), Arc::clone(&cache), true));

        // A current-thread runtime keeps ticking while the lookups sleep
        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
        });
        let elapsed = timed_lookups(&repository, &[1, 2]).await.unwrap();
        assert!(ticker.is_finished());

        assert!(elapsed >= Duration::from_millis(10));
        assert_eq!(store.query_count(), 2);
        assert!(cache.get::<Element>(2).is_some());

        timed_lookups(&repository, &[1, 2]).await.unwrap();
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_evicts_removed_element() {
        let store = Arc::new(ElementStore::builtin(Duration::ZERO).unwrap());
        let hoard = warm_up(HoardConfig::default(), &store).await;
        assert!(hoard.cache().get::<Element>(36).is_some());

        store.remove(36);
        let report = hoard.refresh_now().await;

        assert!(report.is_clean());
        assert!(hoard.cache().get::<Element>(36).is_none());
        assert_eq!(hoard.cache().get_all_by_column::<Element>("group", 18).len(), 3);
    }
}
