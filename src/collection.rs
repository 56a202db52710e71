//! Filtering, searching and sorting JSON item lists.
//!
//! These are the operations a cursor applies locally when its source cannot
//! apply them itself. Every function re-runs over the slice it is given.
//! Callers that run them repeatedly pass their own [`CompiledPointerCache`]
//! to the `_with` variants so each path is compiled once.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CursorError;
use crate::pointer::{CompiledPointer, CompiledPointerCache, STAR};
use crate::types::{
    CollectionFilterDescriptor, CollectionSortDescriptor, FilterOperator, SortDirection,
    UnknownOperatorPolicy,
};

/// Items satisfying every filter. Unknown operators never match.
///
/// A filter with a malformed path is logged and matches nothing.
pub fn filter_collection_by(items: &[Value], filters: &[CollectionFilterDescriptor]) -> Vec<Value> {
    match filter_collection_with(items, filters, UnknownOperatorPolicy::NonMatch) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(error = %e, "filter could not be applied");
            Vec::new()
        }
    }
}

/// Items satisfying every filter, with an explicit unknown-operator policy.
///
/// # Errors
///
/// Returns `CursorError::Pointer` for malformed paths, and
/// `CursorError::UnknownOperator` under [`UnknownOperatorPolicy::Reject`].
pub fn filter_collection_with(
    items: &[Value],
    filters: &[CollectionFilterDescriptor],
    policy: UnknownOperatorPolicy,
) -> Result<Vec<Value>, CursorError> {
    let matcher = ItemMatcher::new(filters, None, policy)?;
    let mut matched = Vec::new();
    for item in items {
        if matcher.matches(item)? {
            matched.push(item.clone());
        }
    }
    Ok(matched)
}

/// Evaluate one filter against one item.
///
/// Returns `None` when the operator is not recognised.
pub fn evaluate_filter(item: &Value, filter: &CollectionFilterDescriptor) -> Option<bool> {
    if filter.path == STAR {
        return evaluate_any_field(item, &filter.operator, &filter.value);
    }
    let pointer = crate::pointer::compile_pointer_get(&normalize_path(&filter.path), None).ok()?;
    let field = pointer.try_get(item);
    apply_operator(&filter.operator, field.as_deref(), &filter.value)
}

/// Items with any own field containing `term`, ignoring case.
pub fn search_collection(items: &[Value], term: &str) -> Vec<Value> {
    let needle = term.to_lowercase();
    items
        .iter()
        .filter(|item| search_matches(item, &needle))
        .cloned()
        .collect()
}

/// Stable multi-key sort in place.
///
/// Paths may omit the leading `/`. Items missing a key sort before items that
/// have it (after them when descending).
pub fn sort_collection_by(items: &mut Vec<Value>, sorters: &[CollectionSortDescriptor]) {
    sort_collection_with(items, sorters, &mut CompiledPointerCache::new());
}

/// [`sort_collection_by`] compiling sort paths through `cache`.
pub fn sort_collection_with(
    items: &mut Vec<Value>,
    sorters: &[CollectionSortDescriptor],
    cache: &mut CompiledPointerCache,
) {
    if sorters.is_empty() || items.len() < 2 {
        return;
    }

    let keys: Vec<(Arc<CompiledPointer>, SortDirection)> = sorters
        .iter()
        .filter_map(|s| match cache.get_or_compile(&normalize_path(&s.path)) {
            Ok(pointer) => Some((pointer, s.direction)),
            Err(e) => {
                tracing::warn!(path = %s.path, error = %e, "ignoring sort key");
                None
            }
        })
        .collect();

    let mut decorated: Vec<(Vec<Option<Value>>, Value)> = items
        .drain(..)
        .map(|item| {
            let values = keys
                .iter()
                .map(|(pointer, _)| pointer.try_get(&item).map(|v| v.into_owned()))
                .collect();
            (values, item)
        })
        .collect();

    decorated.sort_by(|(a, _), (b, _)| {
        for (i, (_, direction)) in keys.iter().enumerate() {
            let ord = compare_values(a[i].as_ref(), b[i].as_ref());
            let ord = match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    items.extend(decorated.into_iter().map(|(_, item)| item));
}

/// Filters and an optional search term, with pointers compiled once.
#[derive(Debug)]
pub struct ItemMatcher {
    filters: Vec<(CollectionFilterDescriptor, Option<Arc<CompiledPointer>>)>,
    search: Option<String>,
    policy: UnknownOperatorPolicy,
}

impl ItemMatcher {
    /// # Errors
    ///
    /// Fails if a filter path is not a valid absolute pointer.
    pub fn new(
        filters: &[CollectionFilterDescriptor],
        search: Option<&str>,
        policy: UnknownOperatorPolicy,
    ) -> Result<Self, CursorError> {
        Self::with_pointers(filters, search, policy, &mut CompiledPointerCache::new())
    }

    /// Like [`ItemMatcher::new`], reusing accessors already in `cache`.
    ///
    /// # Errors
    ///
    /// Fails if a filter path is not a valid absolute pointer.
    pub fn with_pointers(
        filters: &[CollectionFilterDescriptor],
        search: Option<&str>,
        policy: UnknownOperatorPolicy,
        cache: &mut CompiledPointerCache,
    ) -> Result<Self, CursorError> {
        let filters = filters
            .iter()
            .map(|f| {
                let pointer = if f.path == STAR {
                    None
                } else {
                    Some(cache.get_or_compile(&normalize_path(&f.path))?)
                };
                Ok((f.clone(), pointer))
            })
            .collect::<Result<Vec<_>, CursorError>>()?;

        Ok(Self {
            filters,
            search: search
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase),
            policy,
        })
    }

    /// True when nothing would be filtered out.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.search.is_none()
    }

    /// Whether `item` passes every filter and the search term.
    ///
    /// # Errors
    ///
    /// `CursorError::UnknownOperator` under [`UnknownOperatorPolicy::Reject`].
    pub fn matches(&self, item: &Value) -> Result<bool, CursorError> {
        for (filter, pointer) in &self.filters {
            let outcome = match pointer {
                None => evaluate_any_field(item, &filter.operator, &filter.value),
                Some(pointer) => {
                    let field = pointer.try_get(item);
                    apply_operator(&filter.operator, field.as_deref(), &filter.value)
                }
            };
            match outcome {
                Some(true) => {}
                Some(false) => return Ok(false),
                None => match self.policy {
                    UnknownOperatorPolicy::NonMatch => {
                        tracing::warn!(
                            operator = %filter.operator.as_str(),
                            path = %filter.path,
                            "unknown filter operator, treating as non-match"
                        );
                        return Ok(false);
                    }
                    UnknownOperatorPolicy::Reject => {
                        return Err(CursorError::UnknownOperator {
                            operator: filter.operator.as_str().to_string(),
                        })
                    }
                },
            }
        }

        Ok(match &self.search {
            Some(needle) => search_matches(item, needle),
            None => true,
        })
    }
}

// --- Internal implementation ---

/// Paths may omit the leading slash.
fn normalize_path(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn own_fields(item: &Value) -> Vec<&Value> {
    match item {
        Value::Object(map) => map.values().collect(),
        Value::Array(arr) => arr.iter().collect(),
        other => vec![other],
    }
}

fn evaluate_any_field(item: &Value, operator: &FilterOperator, target: &Value) -> Option<bool> {
    let mut any = false;
    for field in own_fields(item) {
        if apply_operator(operator, Some(field), target)? {
            any = true;
        }
    }
    Some(any)
}

fn search_matches(item: &Value, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    own_fields(item)
        .into_iter()
        .any(|field| coerce_text(field).to_lowercase().contains(needle_lower))
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn text_eq(a: &Value, b: &Value) -> bool {
    coerce_text(a).to_lowercase() == coerce_text(b).to_lowercase()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Number for numeric values, otherwise a length.
fn magnitude(value: &Value) -> Option<f64> {
    numeric(value).or(match value {
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        Value::Object(m) => Some(m.len() as f64),
        _ => None,
    })
}

fn compare_magnitude(field: &Value, target: &Value) -> Option<Ordering> {
    magnitude(field)?.partial_cmp(&magnitude(target)?)
}

/// `None` means the operator is unknown.
fn apply_operator(operator: &FilterOperator, field: Option<&Value>, target: &Value) -> Option<bool> {
    let positive = |f: &dyn Fn(&Value) -> bool| field.map(f).unwrap_or(false);

    let result = match operator {
        FilterOperator::Equals => positive(&|v| text_eq(v, target)),
        FilterOperator::NotEquals => !positive(&|v| text_eq(v, target)),
        FilterOperator::Contains => positive(&|v| contains(v, target)),
        FilterOperator::NotContains => !positive(&|v| contains(v, target)),
        FilterOperator::ContainsKey => positive(&|v| contains_key(v, target)),
        FilterOperator::LessThan => positive(&|v| compare_magnitude(v, target) == Some(Ordering::Less)),
        FilterOperator::LessThanOrEquals => positive(&|v| {
            matches!(compare_magnitude(v, target), Some(Ordering::Less | Ordering::Equal))
        }),
        FilterOperator::GreaterThan => {
            positive(&|v| compare_magnitude(v, target) == Some(Ordering::Greater))
        }
        FilterOperator::GreaterThanOrEquals => positive(&|v| {
            matches!(compare_magnitude(v, target), Some(Ordering::Greater | Ordering::Equal))
        }),
        FilterOperator::In => positive(&|v| is_in(v, target)),
        FilterOperator::NotIn => !positive(&|v| is_in(v, target)),
        FilterOperator::Other(_) => return None,
    };
    Some(result)
}

fn contains(field: &Value, target: &Value) -> bool {
    let needle = coerce_text(target).to_lowercase();
    match field {
        Value::Array(items) => items
            .iter()
            .any(|v| coerce_text(v).to_lowercase().contains(&needle)),
        other => coerce_text(other).to_lowercase().contains(&needle),
    }
}

fn contains_key(field: &Value, target: &Value) -> bool {
    let Value::Object(map) = field else {
        return false;
    };
    match target {
        Value::Array(keys) => keys
            .iter()
            .all(|k| map.contains_key(coerce_text(k).as_str())),
        key => map.contains_key(coerce_text(key).as_str()),
    }
}

fn is_in(field: &Value, target: &Value) -> bool {
    match (field, target) {
        (Value::Array(values), Value::Array(set)) => {
            values.iter().any(|v| set.iter().any(|s| text_eq(v, s)))
        }
        (value, Value::Array(set)) => set.iter().any(|s| text_eq(value, s)),
        (value, other) => text_eq(value, other),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
