//! Heuristic memory footprint estimation
//!
//! Estimates are diagnostic only: fixed container overheads plus per-scalar
//! costs. They are not exact, but grow monotonically with cache contents.

use crate::cache::{ColumnIndex, ColumnMap, PrimaryMap};
use crate::models::Key;
use std::any::Any;

/// Map header
pub const MAP_OVERHEAD: u64 = 32;
/// Per-entry bookkeeping in a map
pub const MAP_ENTRY_OVERHEAD: u64 = 32;
/// List header
pub const LIST_OVERHEAD: u64 = 24;
/// One shared record reference
pub const REFERENCE_SIZE: u64 = 8;
/// Text header; each character adds 2 bytes
pub const TEXT_OVERHEAD: u64 = 40;
/// Narrow integers and booleans
pub const SMALL_SCALAR_SIZE: u64 = 16;
/// Wide integers and floats
pub const WIDE_SCALAR_SIZE: u64 = 24;
/// Flat estimate for unrecognized record types
pub const FALLBACK_OBJECT_SIZE: u64 = 48;

pub fn estimate_text(text: &str) -> u64 {
    TEXT_OVERHEAD + text.chars().count() as u64 * 2
}

pub fn estimate_key(key: &Key) -> u64 {
    match key {
        Key::Bool(_) => SMALL_SCALAR_SIZE,
        Key::Int(v) if i32::try_from(*v).is_ok() => SMALL_SCALAR_SIZE,
        Key::Int(_) | Key::UInt(_) => WIDE_SCALAR_SIZE,
        Key::Text(s) => estimate_text(s),
        Key::Bytes(b) => TEXT_OVERHEAD + b.len() as u64,
        Key::Composite(parts) => {
            LIST_OVERHEAD
                + parts
                    .iter()
                    .map(|p| REFERENCE_SIZE + estimate_key(p))
                    .sum::<u64>()
        }
    }
}

/// Estimate for an opaque cached value
pub fn estimate_value(value: &(dyn Any + Send + Sync)) -> u64 {
    if let Some(s) = value.downcast_ref::<String>() {
        return estimate_text(s);
    }
    if let Some(s) = value.downcast_ref::<&'static str>() {
        return estimate_text(s);
    }
    if value.is::<i32>() || value.is::<u32>() || value.is::<bool>() {
        return SMALL_SCALAR_SIZE;
    }
    if value.is::<i64>() || value.is::<u64>() || value.is::<f64>() {
        return WIDE_SCALAR_SIZE;
    }
    if let Some(key) = value.downcast_ref::<Key>() {
        return estimate_key(key);
    }
    FALLBACK_OBJECT_SIZE
}

/// Primary index for one type: header, entries, keys and records
pub(crate) fn estimate_primary_map(map: &PrimaryMap) -> u64 {
    let mut size = MAP_OVERHEAD + map.len() as u64 * MAP_ENTRY_OVERHEAD;
    for entry in map.iter() {
        size += estimate_key(entry.key());
        size += estimate_value(&**entry.value());
    }
    size
}

/// One column: header, entries, value keys and record-reference lists
pub(crate) fn estimate_column_map(map: &ColumnMap) -> u64 {
    let mut size = MAP_OVERHEAD + map.len() as u64 * MAP_ENTRY_OVERHEAD;
    for entry in map.iter() {
        size += estimate_key(entry.key());
        size += LIST_OVERHEAD + entry.value().len() as u64 * REFERENCE_SIZE;
    }
    size
}

/// All columns of one type, including the column-name map
pub(crate) fn estimate_column_index(index: &ColumnIndex) -> u64 {
    let mut size = MAP_OVERHEAD + index.len() as u64 * MAP_ENTRY_OVERHEAD;
    for entry in index.iter() {
        size += estimate_text(entry.key());
        size += estimate_column_map(entry.value());
    }
    size
}
