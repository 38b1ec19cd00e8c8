//! Grid codec — repairs raw grid documents into a rectangular `Grid`.
//!
//! A grid read back from disk is a clean `rows → cells → tag names` nesting.
//! A grid read back from the remote document store is not: the store has no
//! sparse arrays, so any level may come back as a map keyed by `"0"`, `"1"`, …
//! with gaps, and empty lists come back as `null` or vanish entirely. The
//! codec folds all of those shapes back into nested sequences and pads rows
//! so every row has the same length.
//!
//! Leaves that are neither null, sequence nor mapping are passed through
//! untouched and trusted to be tag names.

use bevy::log::{debug, warn};
use serde_json::{Map, Value};

use super::grid::{CellTags, Grid};

/// Index keys beyond this are treated as an opaque mapping, not an array.
pub const MAX_SPARSE_INDEX: usize = 1 << 16;

/// Tagged view of an untyped document value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Sequence(Vec<RawValue>),
    Mapping(Vec<(String, RawValue)>),
    Leaf(Value),
}

impl From<&Value> for RawValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Array(items) => RawValue::Sequence(items.iter().map(RawValue::from).collect()),
            Value::Object(map) => RawValue::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), RawValue::from(v)))
                    .collect(),
            ),
            leaf => RawValue::Leaf(leaf.clone()),
        }
    }
}

impl RawValue {
    pub fn into_value(self) -> Value {
        match self {
            RawValue::Null => Value::Null,
            RawValue::Sequence(items) => {
                Value::Array(items.into_iter().map(RawValue::into_value).collect())
            }
            RawValue::Mapping(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect::<Map<String, Value>>(),
            ),
            RawValue::Leaf(value) => value,
        }
    }
}

fn is_index_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// Parses every key of a mapping as an array index, or `None` if any key is not one.
fn index_keys(entries: &[(String, RawValue)]) -> Option<Vec<usize>> {
    entries
        .iter()
        .map(|(key, _)| {
            if !is_index_key(key) {
                return None;
            }
            key.parse::<usize>().ok().filter(|&i| i <= MAX_SPARSE_INDEX)
        })
        .collect()
}

/// Recursive-descent repair of one value.
pub fn repair(raw: RawValue) -> RawValue {
    match raw {
        RawValue::Null => RawValue::Sequence(Vec::new()),
        RawValue::Sequence(items) => RawValue::Sequence(items.into_iter().map(repair).collect()),
        RawValue::Mapping(entries) => match index_keys(&entries) {
            Some(indices) => {
                let len = indices.iter().max().map_or(0, |&max| max + 1);
                let mut slots: Vec<Option<RawValue>> = vec![None; len];
                for (index, (_, value)) in indices.into_iter().zip(entries) {
                    slots[index] = Some(value);
                }
                if slots.iter().any(Option::is_none) {
                    debug!("grid codec: filling gaps in sparse index map of length {len}");
                }
                RawValue::Sequence(
                    slots
                        .into_iter()
                        .map(|slot| slot.map_or(RawValue::Sequence(Vec::new()), repair))
                        .collect(),
                )
            }
            None => RawValue::Mapping(entries),
        },
        leaf @ RawValue::Leaf(_) => leaf,
    }
}

/// Like [`repair`], but the outer levels are cut to `limits` (rows, then
/// cells) before anything is expanded, so index keys past the limit never
/// allocate.
fn repair_within(raw: RawValue, limits: &[usize]) -> RawValue {
    let Some((&limit, rest)) = limits.split_first() else {
        return repair(raw);
    };
    match raw {
        RawValue::Null => RawValue::Sequence(Vec::new()),
        RawValue::Sequence(mut items) => {
            if items.len() > limit {
                debug!("grid codec: dropping {} entries past {limit}", items.len() - limit);
                items.truncate(limit);
            }
            RawValue::Sequence(
                items
                    .into_iter()
                    .map(|item| repair_within(item, rest))
                    .collect(),
            )
        }
        RawValue::Mapping(entries) if entries.iter().all(|(key, _)| is_index_key(key)) => {
            let mut slots: Vec<Option<RawValue>> = Vec::new();
            let mut dropped = 0usize;
            for (key, value) in entries {
                match key.parse::<usize>().ok().filter(|&i| i < limit) {
                    Some(index) => {
                        if slots.len() <= index {
                            slots.resize(index + 1, None);
                        }
                        slots[index] = Some(value);
                    }
                    None => dropped += 1,
                }
            }
            if dropped > 0 {
                debug!("grid codec: dropping {dropped} sparse entries past {limit}");
            }
            RawValue::Sequence(
                slots
                    .into_iter()
                    .map(|slot| {
                        slot.map_or(RawValue::Sequence(Vec::new()), |value| {
                            repair_within(value, rest)
                        })
                    })
                    .collect(),
            )
        }
        mapping @ RawValue::Mapping(_) => mapping,
        leaf @ RawValue::Leaf(_) => leaf,
    }
}

/// Pads every row of a repaired top-level sequence to the longest row.
fn rectangularize(raw: RawValue) -> RawValue {
    let RawValue::Sequence(rows) = raw else {
        return raw;
    };

    let rows: Vec<Vec<RawValue>> = rows
        .into_iter()
        .map(|row| match row {
            RawValue::Sequence(cells) => cells,
            other => {
                debug!("grid codec: replacing malformed row {other:?} with an empty row");
                Vec::new()
            }
        })
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    RawValue::Sequence(
        rows.into_iter()
            .map(|mut cells| {
                cells.resize(width, RawValue::Sequence(Vec::new()));
                RawValue::Sequence(cells)
            })
            .collect(),
    )
}

fn cell_from_raw(raw: &RawValue) -> CellTags {
    let mut cell = CellTags::EMPTY;
    let mut add = |value: &Value| match value.as_str().and_then(CellTags::from_tag_name) {
        Some(tag) => cell.insert(tag),
        None => warn!("grid codec: ignoring unknown cell tag {value}"),
    };

    match raw {
        RawValue::Sequence(items) => {
            for item in items {
                match item {
                    RawValue::Leaf(value) => add(value),
                    other => warn!("grid codec: ignoring nested value {other:?} inside a cell"),
                }
            }
        }
        RawValue::Leaf(value) => add(value),
        other => warn!("grid codec: treating unreadable cell {other:?} as empty"),
    }
    cell
}

pub struct GridCodec;

impl GridCodec {
    /// Structural repair only: returns the canonical nested-array document.
    pub fn normalize_value(raw: &Value) -> Value {
        rectangularize(repair(RawValue::from(raw))).into_value()
    }

    /// Repairs `raw` and decodes it into a rectangular grid.
    pub fn normalize(raw: &Value) -> Grid {
        decode(rectangularize(repair(RawValue::from(raw))))
    }

    /// Repairs `raw` into a grid of exactly `height` × `width`. Rows and
    /// cells outside that box are discarded before they are expanded.
    pub fn normalize_within(raw: &Value, height: usize, width: usize) -> Grid {
        let repaired = repair_within(RawValue::from(raw), &[height, width]);
        decode(rectangularize(repaired)).fit_to(height, width)
    }
}

fn decode(repaired: RawValue) -> Grid {
    let RawValue::Sequence(rows) = repaired else {
        warn!("grid codec: top-level grid value is not a sequence, using an empty grid");
        return Grid::default();
    };

    let rows = rows
        .iter()
        .map(|row| match row {
            RawValue::Sequence(cells) => cells.iter().map(cell_from_raw).collect(),
            _ => Vec::new(),
        })
        .collect();
    Grid::from_rows(rows)
}
