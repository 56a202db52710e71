//! Inclusion and exclusion masks.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::access::{expand_parts, remove_parts};
use super::{parse_index, parse_pointer, ParsedPointer};
use crate::error::PointerError;

/// Build a document holding only the paths referenced by `pointers`.
///
/// Star pointers contribute every match. Array positions are kept, with
/// unselected slots filled by `null`. A key pointer (`/a/*#`) contributes
/// `null` placeholders for the keys it names, unless another pointer in the
/// list already descends below the same path.
///
/// # Errors
///
/// Fails on malformed or relative pointers and on `-` segments.
pub fn pointer_inclusion_mask<S: AsRef<str>>(
    data: &Value,
    pointers: &[S],
) -> Result<Value, PointerError> {
    let parsed = parse_mask_pointers(pointers)?;
    let mut out = empty_like(data);

    for (i, (pointer, p)) in parsed.iter().enumerate() {
        if p.key_modifier && is_covered(&parsed, i) {
            continue;
        }
        for found in expand_parts(data, pointer, &p.parts, usize::MAX)? {
            let value = if p.key_modifier {
                None
            } else {
                Some(found.value.clone())
            };
            insert_mirrored(&mut out, data, &found.parts, value);
        }
    }

    Ok(out)
}

/// Clone `data` without the paths referenced by `pointers`.
///
/// Key pointers remove the keyed entries.
pub fn pointer_exclusion_mask<S: AsRef<str>>(
    data: &Value,
    pointers: &[S],
) -> Result<Value, PointerError> {
    let parsed = parse_mask_pointers(pointers)?;

    let mut targets = Vec::new();
    for (pointer, p) in &parsed {
        for found in expand_parts(data, pointer, &p.parts, usize::MAX)? {
            targets.push(found.parts);
        }
    }

    // Deepest and highest-indexed first so earlier removals never shift later ones.
    targets.sort_by(|a, b| compare_paths(b, a));
    targets.dedup();

    let mut out = data.clone();
    for parts in &targets {
        remove_parts(&mut out, "", parts)?;
    }
    Ok(out)
}

fn parse_mask_pointers<S: AsRef<str>>(
    pointers: &[S],
) -> Result<Vec<(&str, ParsedPointer)>, PointerError> {
    pointers
        .iter()
        .map(|p| {
            let pointer = p.as_ref();
            let parsed = parse_pointer(pointer)?;
            if parsed.is_relative() {
                return Err(PointerError::MissingRoot {
                    pointer: pointer.to_string(),
                });
            }
            Ok((pointer, parsed))
        })
        .collect()
}

/// A key pointer is covered when a value pointer in the same mask extends it.
fn is_covered(parsed: &[(&str, ParsedPointer)], index: usize) -> bool {
    let key_parts = &parsed[index].1.parts;
    parsed.iter().enumerate().any(|(i, (_, other))| {
        i != index
            && !other.key_modifier
            && other.parts.len() >= key_parts.len()
            && other.parts.starts_with(key_parts)
    })
}

fn empty_like(data: &Value) -> Value {
    match data {
        Value::Object(_) => Value::Object(Map::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        _ => Value::Null,
    }
}

/// Copy `value` into `out` at `parts`, creating containers shaped like the
/// corresponding containers in `source`. `None` inserts a `null` placeholder
/// without overwriting anything already there.
fn insert_mirrored(out: &mut Value, source: &Value, parts: &[String], value: Option<Value>) {
    let Some((last, init)) = parts.split_last() else {
        if let Some(value) = value {
            *out = value;
        }
        return;
    };

    let mut out_cur = out;
    let mut src_cur = source;
    for part in init {
        let Some(src_next) = source_child(src_cur, part) else {
            return;
        };
        let Some(slot) = mirrored_slot(out_cur, src_cur, part) else {
            return;
        };
        if !matches!(slot, Value::Object(_) | Value::Array(_)) {
            *slot = empty_like(src_next);
        }
        out_cur = slot;
        src_cur = src_next;
    }

    if let Some(slot) = mirrored_slot(out_cur, src_cur, last) {
        if let Some(value) = value {
            *slot = value;
        }
    }
}

fn source_child<'a>(source: &'a Value, part: &str) -> Option<&'a Value> {
    match source {
        Value::Object(map) => map.get(part),
        Value::Array(arr) => parse_index(part).and_then(|i| arr.get(i)),
        _ => None,
    }
}

fn mirrored_slot<'o>(out: &'o mut Value, source: &Value, part: &str) -> Option<&'o mut Value> {
    match source {
        Value::Object(_) => {
            if !out.is_object() {
                *out = Value::Object(Map::new());
            }
            match out {
                Value::Object(map) => Some(map.entry(part.to_string()).or_insert(Value::Null)),
                _ => None,
            }
        }
        Value::Array(_) => {
            let index = parse_index(part)?;
            if !out.is_array() {
                *out = Value::Array(Vec::new());
            }
            match out {
                Value::Array(arr) => {
                    if arr.len() <= index {
                        arr.resize(index + 1, Value::Null);
                    }
                    arr.get_mut(index)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Segment-wise ordering with numeric comparison for array indices; a path
/// sorts after its own prefixes.
fn compare_paths(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = match (parse_index(x), parse_index(y)) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
