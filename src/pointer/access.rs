//! Reading and writing through pointers.

use serde_json::{Map, Value};

use super::compiled::{compile_pointer_get, Step};
use super::{
    format_pointer, is_array_token, parse_index, parse_pointer_root_adjusted, AdjustedPointer,
    DASH, STAR,
};
use crate::error::PointerError;
use crate::types::{json_type_name, DEFAULT_GET_ALL_LIMIT};

/// Location of a segment that was missing during a read.
#[derive(Debug, Clone)]
pub struct MissingPath<'a> {
    /// The pointer being resolved.
    pub pointer: &'a str,
    /// Absolute pointer up to and including the missing segment.
    pub partial: String,
    /// Zero-based index of the missing segment.
    pub segment: usize,
}

/// Supplies a value for a missing segment, or fails the read.
pub trait DefaultGenerator {
    fn generate(&self, missing: &MissingPath<'_>, root: &Value) -> Result<Value, PointerError>;
}

impl<F> DefaultGenerator for F
where
    F: Fn(&MissingPath<'_>, &Value) -> Result<Value, PointerError>,
{
    fn generate(&self, missing: &MissingPath<'_>, root: &Value) -> Result<Value, PointerError> {
        self(missing, root)
    }
}

/// The default read policy: a missing segment is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundDefault;

impl DefaultGenerator for NotFoundDefault {
    fn generate(&self, missing: &MissingPath<'_>, _root: &Value) -> Result<Value, PointerError> {
        Err(PointerError::NotFound {
            pointer: missing.pointer.to_string(),
            segment: missing.segment,
        })
    }
}

/// Read the value at an absolute or star pointer.
///
/// # Errors
///
/// Returns `PointerError` if the pointer is malformed, uses `-`, or names a
/// path that does not exist.
pub fn pointer_get(data: &Value, pointer: &str) -> Result<Value, PointerError> {
    pointer_get_with(data, pointer, None, &NotFoundDefault)
}

/// Read through `pointer`, resolving relative pointers against `root` and
/// asking `default` for missing segments.
pub fn pointer_get_with(
    data: &Value,
    pointer: &str,
    root: Option<&str>,
    default: &dyn DefaultGenerator,
) -> Result<Value, PointerError> {
    let compiled = compile_pointer_get(pointer, root)?;
    Ok(compiled.get_with(data, default)?.into_owned())
}

/// Best-effort read: any error becomes `None`.
pub fn try_pointer_get(data: &Value, pointer: &str) -> Option<Value> {
    pointer_get(data, pointer).ok()
}

/// Borrowing read of an absolute pointer without defaults or key modifiers.
pub fn pointer_get_ref<'a>(data: &'a Value, pointer: &str) -> Result<&'a Value, PointerError> {
    let parts = read_parts(pointer)?;
    let mut current = data;
    for (segment, part) in parts.iter().enumerate() {
        let next = match (Step::from_part(part), current) {
            (Step::Dash, _) => {
                return Err(PointerError::DashInRead {
                    pointer: pointer.to_string(),
                    segment,
                })
            }
            (Step::Star, Value::Array(arr)) => arr.first(),
            (Step::Star, Value::Object(map)) => map.values().next(),
            (Step::Token { key, .. }, Value::Object(map)) => map.get(&key),
            (Step::Token { index: Some(i), .. }, Value::Array(arr)) => arr.get(i),
            (Step::Token { key, index: None }, Value::Array(_)) => {
                return Err(PointerError::InvalidIndex {
                    pointer: pointer.to_string(),
                    segment,
                    token: key,
                })
            }
            _ => None,
        };
        current = next.ok_or_else(|| PointerError::NotFound {
            pointer: pointer.to_string(),
            segment,
        })?;
    }
    Ok(current)
}

/// Read every value a star pointer reaches, depth-first, up to `limit`
/// results (default 40).
///
/// Branches that do not contain the remaining path are skipped rather than
/// reported as errors.
pub fn pointer_get_all(
    data: &Value,
    pointer: &str,
    root: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<Value>, PointerError> {
    let limit = limit.unwrap_or(DEFAULT_GET_ALL_LIMIT);
    match parse_pointer_root_adjusted(pointer, root)? {
        AdjustedPointer::Key { parent, key } => {
            let Some(container) = expand_parts(data, pointer, &parent, 1)?.into_iter().next() else {
                return Ok(Vec::new());
            };
            let key = match (container.value, parse_index(&key)) {
                (Value::Array(_), Some(i)) => Value::from(i),
                _ => Value::String(key),
            };
            Ok(vec![key])
        }
        AdjustedPointer::Path {
            parts,
            key_modifier,
        } => {
            let found = expand_parts(data, pointer, &parts, limit)?;
            Ok(found
                .into_iter()
                .filter_map(|e| {
                    if key_modifier {
                        e.key
                    } else {
                        Some(e.value.clone())
                    }
                })
                .collect())
        }
    }
}

/// Concrete absolute pointers reached by expanding every `*` in `pointer`.
///
/// `limit` of `None` means unbounded. A trailing `#` is ignored: the pointers
/// returned name the keyed locations themselves.
pub fn pointer_expand(
    data: &Value,
    pointer: &str,
    limit: Option<usize>,
) -> Result<Vec<String>, PointerError> {
    let parts = match parse_pointer_root_adjusted(pointer, None)? {
        AdjustedPointer::Path { parts, .. } => parts,
        AdjustedPointer::Key { .. } => {
            return Err(PointerError::MissingRoot {
                pointer: pointer.to_string(),
            })
        }
    };
    Ok(expand_parts(data, pointer, &parts, limit.unwrap_or(usize::MAX))?
        .into_iter()
        .map(|e| format_pointer(&e.parts))
        .collect())
}

/// Write `value` at `pointer`, creating missing containers along the way.
///
/// # Errors
///
/// Fails on `*` or `#` pointers, `-` before the last segment, array indices
/// past the end, and attempts to descend into scalars.
pub fn pointer_set(data: &mut Value, pointer: &str, value: Value) -> Result<(), PointerError> {
    pointer_set_with(data, pointer, None, value)
}

/// [`pointer_set`] with relative pointers resolved against `root`.
pub fn pointer_set_with(
    data: &mut Value,
    pointer: &str,
    root: Option<&str>,
    value: Value,
) -> Result<(), PointerError> {
    let parts = write_parts(pointer, root)?;
    let Some((last, init)) = parts.split_last() else {
        *data = value;
        return Ok(());
    };

    let mut current = data;
    for (segment, part) in init.iter().enumerate() {
        let next_is_array = is_array_token(&parts[segment + 1]);
        current = child_or_create(current, part, next_is_array, pointer, segment)?;
    }
    assign(current, last, value, pointer, parts.len() - 1)
}

/// Remove the value at `pointer`, returning it, or `None` if it was absent.
pub fn pointer_remove(data: &mut Value, pointer: &str) -> Result<Option<Value>, PointerError> {
    pointer_remove_with(data, pointer, None)
}

/// [`pointer_remove`] with relative pointers resolved against `root`.
pub fn pointer_remove_with(
    data: &mut Value,
    pointer: &str,
    root: Option<&str>,
) -> Result<Option<Value>, PointerError> {
    let parts = write_parts(pointer, root)?;
    remove_parts(data, pointer, &parts)
}

/// Copy the value at `from` in `source` to `to` in `target`.
pub fn pointer_copy(
    source: &Value,
    from: &str,
    target: &mut Value,
    to: &str,
) -> Result<(), PointerError> {
    let value = pointer_get(source, from)?;
    pointer_set(target, to, value)
}

// --- Internal implementation ---

pub(crate) struct Expanded<'a> {
    pub parts: Vec<String>,
    pub value: &'a Value,
    pub key: Option<Value>,
}

pub(crate) fn expand_parts<'a>(
    data: &'a Value,
    pointer: &str,
    parts: &[String],
    limit: usize,
) -> Result<Vec<Expanded<'a>>, PointerError> {
    if let Some(segment) = parts.iter().position(|p| p == DASH) {
        return Err(PointerError::DashInRead {
            pointer: pointer.to_string(),
            segment,
        });
    }

    let mut out = Vec::new();
    let mut prefix = Vec::with_capacity(parts.len());
    expand_into(data, parts, &mut prefix, None, &mut out, limit);
    Ok(out)
}

fn expand_into<'a>(
    current: &'a Value,
    rest: &[String],
    prefix: &mut Vec<String>,
    key: Option<Value>,
    out: &mut Vec<Expanded<'a>>,
    limit: usize,
) {
    if out.len() >= limit {
        return;
    }
    let Some((head, tail)) = rest.split_first() else {
        out.push(Expanded {
            parts: prefix.clone(),
            value: current,
            key,
        });
        return;
    };

    let mut visit = |k: String, key: Value, child: &'a Value, out: &mut Vec<Expanded<'a>>| {
        prefix.push(k);
        expand_into(child, tail, prefix, Some(key), out, limit);
        prefix.pop();
    };

    match (current, head.as_str()) {
        (Value::Array(arr), STAR) => {
            for (i, child) in arr.iter().enumerate() {
                if out.len() >= limit {
                    break;
                }
                visit(i.to_string(), Value::from(i), child, out);
            }
        }
        (Value::Object(map), STAR) => {
            for (k, child) in map {
                if out.len() >= limit {
                    break;
                }
                visit(k.clone(), Value::String(k.clone()), child, out);
            }
        }
        (Value::Object(map), key) => {
            if let Some(child) = map.get(key) {
                visit(key.to_string(), Value::String(key.to_string()), child, out);
            }
        }
        (Value::Array(arr), key) => {
            if let Some((i, child)) = parse_index(key).and_then(|i| arr.get(i).map(|c| (i, c))) {
                visit(key.to_string(), Value::from(i), child, out);
            }
        }
        _ => {}
    }
}

fn read_parts(pointer: &str) -> Result<Vec<String>, PointerError> {
    match parse_pointer_root_adjusted(pointer, None)? {
        AdjustedPointer::Path {
            parts,
            key_modifier: false,
        } => Ok(parts),
        _ => Err(PointerError::Parse {
            pointer: pointer.to_string(),
            reason: "expected an absolute pointer without '#'".to_string(),
        }),
    }
}

/// Resolve `pointer` to concrete write segments, rejecting ambiguous forms.
fn write_parts(pointer: &str, root: Option<&str>) -> Result<Vec<String>, PointerError> {
    let parts = match parse_pointer_root_adjusted(pointer, root)? {
        AdjustedPointer::Path {
            parts,
            key_modifier: false,
        } => parts,
        _ => {
            return Err(PointerError::KeyInWrite {
                pointer: pointer.to_string(),
            })
        }
    };

    if let Some(segment) = parts.iter().position(|p| p == STAR) {
        return Err(PointerError::StarInWrite {
            pointer: pointer.to_string(),
            segment,
        });
    }
    if let Some(segment) = parts.iter().position(|p| p == DASH) {
        if segment + 1 != parts.len() {
            return Err(PointerError::DashNotLast {
                pointer: pointer.to_string(),
                segment,
            });
        }
    }
    Ok(parts)
}

fn new_container(array: bool) -> Value {
    if array {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn array_slot(
    arr: &[Value],
    part: &str,
    pointer: &str,
    segment: usize,
) -> Result<usize, PointerError> {
    let index = if part == DASH {
        arr.len()
    } else {
        parse_index(part).ok_or_else(|| PointerError::InvalidIndex {
            pointer: pointer.to_string(),
            segment,
            token: part.to_string(),
        })?
    };
    if index > arr.len() {
        return Err(PointerError::IndexOutOfBounds {
            pointer: pointer.to_string(),
            segment,
            index,
            len: arr.len(),
        });
    }
    Ok(index)
}

fn child_or_create<'v>(
    current: &'v mut Value,
    part: &str,
    next_is_array: bool,
    pointer: &str,
    segment: usize,
) -> Result<&'v mut Value, PointerError> {
    if current.is_null() {
        *current = new_container(is_array_token(part));
    }

    let slot = match current {
        Value::Object(map) => map.entry(part.to_string()).or_insert(Value::Null),
        Value::Array(arr) => {
            let index = array_slot(arr, part, pointer, segment)?;
            if index == arr.len() {
                arr.push(Value::Null);
            }
            &mut arr[index]
        }
        other => {
            return Err(PointerError::NotContainer {
                pointer: pointer.to_string(),
                segment,
                actual: json_type_name(other).to_string(),
            })
        }
    };

    if slot.is_null() {
        *slot = new_container(next_is_array);
    }
    Ok(slot)
}

fn assign(
    current: &mut Value,
    part: &str,
    value: Value,
    pointer: &str,
    segment: usize,
) -> Result<(), PointerError> {
    if current.is_null() {
        *current = new_container(is_array_token(part));
    }

    match current {
        Value::Object(map) => {
            map.insert(part.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let index = array_slot(arr, part, pointer, segment)?;
            if index == arr.len() {
                arr.push(value);
            } else {
                arr[index] = value;
            }
            Ok(())
        }
        other => Err(PointerError::NotContainer {
            pointer: pointer.to_string(),
            segment,
            actual: json_type_name(other).to_string(),
        }),
    }
}

pub(crate) fn remove_parts(
    data: &mut Value,
    pointer: &str,
    parts: &[String],
) -> Result<Option<Value>, PointerError> {
    let Some((last, init)) = parts.split_last() else {
        return Ok(Some(std::mem::take(data)));
    };

    let mut current = data;
    for (segment, part) in init.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get_mut(part.as_str()),
            Value::Array(arr) => match parse_index(part) {
                Some(i) => arr.get_mut(i),
                None => {
                    return Err(PointerError::InvalidIndex {
                        pointer: pointer.to_string(),
                        segment,
                        token: part.clone(),
                    })
                }
            },
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }

    match current {
        Value::Object(map) => Ok(map.shift_remove(last.as_str())),
        Value::Array(arr) => {
            if last == DASH {
                return Err(PointerError::DashInRead {
                    pointer: pointer.to_string(),
                    segment: parts.len() - 1,
                });
            }
            match parse_index(last) {
                Some(i) if i < arr.len() => Ok(Some(arr.remove(i))),
                Some(_) => Ok(None),
                None => Err(PointerError::InvalidIndex {
                    pointer: pointer.to_string(),
                    segment: parts.len() - 1,
                    token: last.clone(),
                }),
            }
        }
        _ => Ok(None),
    }
}
