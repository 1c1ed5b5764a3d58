//! Output formatting for the hoard commands
//!
//! Every formatter renders either a comfy-table (human) or pretty JSON.

use crate::store::Element;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use hoard_core::{format_mb, CacheReport, RefreshReport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Demo timing
// ============================================================================

/// Cached vs uncached lookup timing for the same ids
#[derive(Debug, Clone, Serialize)]
pub struct DemoTiming {
    pub ids: Vec<i32>,
    pub cache_ms: f64,
    pub store_ms: f64,
    pub store_queries: u64,
}

impl DemoTiming {
    pub fn new(ids: Vec<i32>, cache: Duration, store: Duration, store_queries: u64) -> Self {
        Self {
            ids,
            cache_ms: cache.as_secs_f64() * 1000.0,
            store_ms: store.as_secs_f64() * 1000.0,
            store_queries,
        }
    }

    /// Store time over cache time, `None` when the cache time rounds to zero
    pub fn speedup(&self) -> Option<f64> {
        (self.cache_ms > 0.0).then(|| self.store_ms / self.cache_ms)
    }
}

pub fn format_timing(timing: &DemoTiming, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(timing).unwrap_or_else(|_| "{}".to_string());
    }

    let speedup = timing
        .speedup()
        .map(|s| format!("{:.2}x", s))
        .unwrap_or_else(|| "N/A".to_string());
    [
        format!("Lookups:            {:?}", timing.ids),
        format!("Cache time:         {:.3} ms", timing.cache_ms),
        format!("Store time:         {:.3} ms", timing.store_ms),
        format!("Store queries:      {}", timing.store_queries),
        format!("Speed improvement:  {}", speedup),
    ]
    .join("\n")
}

// ============================================================================
// Cache report
// ============================================================================

fn header(table: &mut Table, columns: &[&str], no_color: bool) {
    if no_color {
        table.set_header(columns.to_vec());
    } else {
        table.set_header(
            columns
                .iter()
                .map(|c| Cell::new(c).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
}

pub fn format_report(report: &CacheReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    if report.entities.is_empty() && report.columns.is_empty() {
        return "Cache is empty.".to_string();
    }

    let mut out = Vec::new();

    let mut primary = Table::new();
    primary.set_content_arrangement(ContentArrangement::Dynamic);
    header(&mut primary, &["Entity", "Entries", "Bytes", "MB"], no_color);
    for usage in &report.entities {
        primary.add_row(Row::from(vec![
            usage.entity.clone(),
            usage.entries.to_string(),
            usage.bytes.to_string(),
            format_mb(usage.bytes),
        ]));
    }
    out.push(primary.to_string());

    if !report.columns.is_empty() {
        let mut columns = Table::new();
        columns.set_content_arrangement(ContentArrangement::Dynamic);
        header(
            &mut columns,
            &["Entity", "Column", "Distinct", "References", "Bytes", "MB"],
            no_color,
        );
        for usage in &report.columns {
            columns.add_row(Row::from(vec![
                usage.entity.clone(),
                usage.column.clone(),
                usage.distinct_values.to_string(),
                usage.references.to_string(),
                usage.bytes.to_string(),
                format_mb(usage.bytes),
            ]));
        }
        out.push(columns.to_string());
    }

    let totals = &report.totals;
    out.push(format!(
        "Primary: {} entries, {} MB | Columns: {} values, {} references, {} MB | Total: {} bytes ({} MB)",
        totals.primary_entries,
        format_mb(totals.primary_bytes),
        totals.column_distinct_values,
        totals.column_references,
        format_mb(totals.column_bytes),
        totals.total_bytes,
        format_mb(totals.total_bytes),
    ));

    out.join("\n\n")
}

// ============================================================================
// Refresh report
// ============================================================================

pub fn format_refresh(report: &RefreshReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    header(&mut table, &["Entity", "Outcome", "Removed", "Loaded", "Columns"], no_color);

    for refreshed in &report.refreshed {
        table.add_row(Row::from(vec![
            refreshed.entity.clone(),
            "refreshed".to_string(),
            refreshed.removed.to_string(),
            refreshed.loaded.to_string(),
            refreshed.columns.to_string(),
        ]));
    }
    for skip in &report.skipped {
        table.add_row(Row::from(vec![
            skip.entity.clone(),
            format!("skipped: {}", skip.reason),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
        ]));
    }
    for failure in &report.failed {
        let outcome = if no_color {
            Cell::new(format!("failed: {}", failure.reason))
        } else {
            Cell::new(format!("failed: {}", failure.reason)).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&failure.entity),
            outcome,
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
        ]);
    }

    format!(
        "Cycle {} ({} ms{})\n{}",
        report.cycle,
        report.duration_ms,
        if report.interrupted { ", interrupted" } else { "" },
        table
    )
}

// ============================================================================
// Elements
// ============================================================================

pub fn format_elements(elements: &[Arc<Element>], json: bool, no_color: bool) -> String {
    if json {
        let rows: Vec<&Element> = elements.iter().map(|e| e.as_ref()).collect();
        return serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string());
    }

    if elements.is_empty() {
        return "No elements found.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    header(
        &mut table,
        &["#", "Symbol", "Element", "Mass", "Period", "Group", "Phase", "Type"],
        no_color,
    );

    for e in elements {
        table.add_row(Row::from(vec![
            e.atomic_number.to_string(),
            e.symbol.clone(),
            e.element.clone(),
            format!("{:.3}", e.atomic_mass),
            e.period.to_string(),
            e.group.map(|g| g.to_string()).unwrap_or_else(|| "-".to_string()),
            e.phase.clone(),
            e.kind.clone(),
        ]));
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::refresh::{RefreshFailure, RefreshSkip};

    fn hydrogen() -> Arc<Element> {
        Arc::new(Element {
            atomic_number: 1,
            element: "Hydrogen".to_string(),
            symbol: "H".to_string(),
            atomic_mass: 1.007,
            period: 1,
            group: Some(1),
            phase: "gas".to_string(),
            metal: false,
            kind: "Nonmetal".to_string(),
        })
    }

    #[test]
    fn test_speedup() {
        let timing = DemoTiming::new(
            vec![1, 2],
            Duration::from_millis(2),
            Duration::from_millis(50),
            2,
        );
        let speedup = timing.speedup().unwrap();
        assert!((speedup - 25.0).abs() < 1e-9);

        let instant = DemoTiming::new(vec![], Duration::ZERO, Duration::from_millis(5), 0);
        assert!(instant.speedup().is_none());
        assert!(format_timing(&instant, false).contains("N/A"));
    }

    #[test]
    fn test_format_elements_table() {
        let out = format_elements(&[hydrogen()], false, true);
        assert!(out.contains("Hydrogen"));
        assert!(out.contains("1.007"));
        assert_eq!(format_elements(&[], false, true), "No elements found.");
    }

    #[test]
    fn test_format_elements_json() {
        let out = format_elements(&[hydrogen()], true, true);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["symbol"], "H");
        assert_eq!(value[0]["type"], "Nonmetal");
    }

    #[test]
    fn test_format_report_table() {
        let cache = hoard_core::EntityCache::new();
        cache.preload(&[hydrogen()], |e| e.atomic_number);
        cache.preload_by_column("phase", &[hydrogen()], |e| e.phase.clone());
        let report = hoard_core::CacheInspector::new(&cache).report();

        let out = format_report(&report, false, true);
        assert!(out.contains("Element"));
        assert!(out.contains("phase"));
        assert!(out.contains(&format!("Total: {} bytes", report.totals.total_bytes)));
    }

    #[test]
    fn test_format_empty_report() {
        let cache = hoard_core::EntityCache::new();
        let report = hoard_core::CacheInspector::new(&cache).report();
        assert_eq!(format_report(&report, false, true), "Cache is empty.");
    }

    #[test]
    fn test_format_refresh_lists_failures() {
        let report = RefreshReport {
            cycle: 3,
            failed: vec![RefreshFailure {
                entity: "Isotope".to_string(),
                reason: "timeout".to_string(),
            }],
            ..RefreshReport::default()
        };

        let out = format_refresh(&report, false, true);
        assert!(out.starts_with("Cycle 3"));
        assert!(out.contains("failed: timeout"));
    }

    #[test]
    fn test_format_refresh_lists_skips() {
        let report = RefreshReport {
            cycle: 1,
            skipped: vec![RefreshSkip {
                entity: "Compound".to_string(),
                reason: "Entity type not registered: Compound".to_string(),
            }],
            ..RefreshReport::default()
        };

        let out = format_refresh(&report, false, true);
        assert!(out.contains("Compound"));
        assert!(out.contains("skipped:"));
    }
}
