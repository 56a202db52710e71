//! Pre-parsed pointer accessors.
//!
//! A [`CompiledPointer`] turns a pointer string into a list of typed steps
//! once, so evaluating it against many items (a page of filter candidates,
//! a sort) skips re-parsing.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::access::{DefaultGenerator, MissingPath, NotFoundDefault};
use super::{format_pointer, parse_index, parse_pointer_root_adjusted, AdjustedPointer, DASH, STAR};
use crate::error::PointerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Object key, or array index when the token is a valid index.
    Token { key: String, index: Option<usize> },
    Star,
    Dash,
}

impl Step {
    pub(crate) fn from_part(part: &str) -> Self {
        match part {
            STAR => Step::Star,
            DASH => Step::Dash,
            key => Step::Token {
                key: key.to_string(),
                index: parse_index(key),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Path { steps: Vec<Step>, key_modifier: bool },
    Key { parent: Vec<Step>, key: String },
}

/// A pointer compiled into accessor steps.
#[derive(Clone)]
pub struct CompiledPointer {
    pointer: String,
    parts: Vec<String>,
    target: Target,
    default: Option<Arc<dyn DefaultGenerator + Send + Sync>>,
}

impl std::fmt::Debug for CompiledPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPointer")
            .field("pointer", &self.pointer)
            .field("target", &self.target)
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// Compile `pointer` (resolved against `root` if relative) into an accessor.
///
/// # Errors
///
/// Returns the same parse errors as [`parse_pointer_root_adjusted`].
pub fn compile_pointer_get(
    pointer: &str,
    root: Option<&str>,
) -> Result<CompiledPointer, PointerError> {
    let (parts, target) = match parse_pointer_root_adjusted(pointer, root)? {
        AdjustedPointer::Path {
            parts,
            key_modifier,
        } => {
            let steps = parts.iter().map(|p| Step::from_part(p)).collect();
            (
                parts,
                Target::Path {
                    steps,
                    key_modifier,
                },
            )
        }
        AdjustedPointer::Key { parent, key } => {
            let steps = parent.iter().map(|p| Step::from_part(p)).collect();
            (parent, Target::Key { parent: steps, key })
        }
    };

    Ok(CompiledPointer {
        pointer: pointer.to_string(),
        parts,
        target,
        default: None,
    })
}

impl CompiledPointer {
    /// Use `default` instead of failing when a segment is missing.
    pub fn with_default(mut self, default: Arc<dyn DefaultGenerator + Send + Sync>) -> Self {
        self.default = Some(default);
        self
    }

    /// The source pointer string.
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// Absolute, unescaped segments this pointer walks.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Evaluate against `data` with the compiled-in default policy.
    pub fn get<'a>(&self, data: &'a Value) -> Result<Cow<'a, Value>, PointerError> {
        match &self.default {
            Some(default) => self.get_with(data, default.as_ref()),
            None => self.get_with(data, &NotFoundDefault),
        }
    }

    /// Evaluate against `data`, returning `None` on any error.
    pub fn try_get<'a>(&self, data: &'a Value) -> Option<Cow<'a, Value>> {
        self.get(data).ok()
    }

    /// Evaluate against `data`, consulting `default` for missing segments.
    pub fn get_with<'a>(
        &self,
        data: &'a Value,
        default: &dyn DefaultGenerator,
    ) -> Result<Cow<'a, Value>, PointerError> {
        match &self.target {
            Target::Path {
                steps,
                key_modifier,
            } => {
                let (value, key) = self.walk(steps, data, default)?;
                if !key_modifier {
                    return Ok(value);
                }
                key.map(Cow::Owned).ok_or_else(|| PointerError::Parse {
                    pointer: self.pointer.clone(),
                    reason: "'#' needs a segment to name".to_string(),
                })
            }
            Target::Key { parent, key } => {
                let (container, _) = self.walk(parent, data, default)?;
                Ok(Cow::Owned(key_value(&container, key)))
            }
        }
    }

    fn walk<'a>(
        &self,
        steps: &[Step],
        data: &'a Value,
        default: &dyn DefaultGenerator,
    ) -> Result<(Cow<'a, Value>, Option<Value>), PointerError> {
        let mut current = Cow::Borrowed(data);
        let mut last_key = None;

        for (segment, step) in steps.iter().enumerate() {
            let found = match step {
                Step::Dash => {
                    return Err(PointerError::DashInRead {
                        pointer: self.pointer.clone(),
                        segment,
                    })
                }
                Step::Star => first_child(current),
                Step::Token { key, index } => {
                    if let (Value::Array(_), None) = (current.as_ref(), index) {
                        return Err(PointerError::InvalidIndex {
                            pointer: self.pointer.clone(),
                            segment,
                            token: key.clone(),
                        });
                    }
                    child(current, key, *index)
                }
            };

            match found {
                Some((key, value)) => {
                    last_key = Some(key);
                    current = value;
                }
                None => {
                    let missing = MissingPath {
                        pointer: &self.pointer,
                        partial: format_pointer(&self.parts[..=segment]),
                        segment,
                    };
                    current = Cow::Owned(default.generate(&missing, data)?);
                    last_key = Some(match step {
                        Step::Token { key, .. } => Value::String(key.clone()),
                        _ => Value::Null,
                    });
                }
            }
        }

        Ok((current, last_key))
    }
}

/// The key named by `key` inside `container`: a number for array slots.
fn key_value(container: &Value, key: &str) -> Value {
    match (container, parse_index(key)) {
        (Value::Array(_), Some(index)) => Value::from(index),
        _ => Value::String(key.to_string()),
    }
}

fn first_child(current: Cow<'_, Value>) -> Option<(Value, Cow<'_, Value>)> {
    match current {
        Cow::Borrowed(Value::Array(arr)) => arr.first().map(|v| (Value::from(0), Cow::Borrowed(v))),
        Cow::Borrowed(Value::Object(map)) => map
            .iter()
            .next()
            .map(|(k, v)| (Value::String(k.clone()), Cow::Borrowed(v))),
        Cow::Owned(Value::Array(arr)) => arr
            .into_iter()
            .next()
            .map(|v| (Value::from(0), Cow::Owned(v))),
        Cow::Owned(Value::Object(map)) => map
            .into_iter()
            .next()
            .map(|(k, v)| (Value::String(k), Cow::Owned(v))),
        _ => None,
    }
}

fn child<'a>(
    current: Cow<'a, Value>,
    key: &str,
    index: Option<usize>,
) -> Option<(Value, Cow<'a, Value>)> {
    match current {
        Cow::Borrowed(Value::Object(map)) => map
            .get(key)
            .map(|v| (Value::String(key.to_string()), Cow::Borrowed(v))),
        Cow::Borrowed(Value::Array(arr)) => {
            let i = index?;
            arr.get(i).map(|v| (Value::from(i), Cow::Borrowed(v)))
        }
        Cow::Owned(Value::Object(mut map)) => map
            .remove(key)
            .map(|v| (Value::String(key.to_string()), Cow::Owned(v))),
        Cow::Owned(Value::Array(arr)) => {
            let i = index?;
            arr.into_iter().nth(i).map(|v| (Value::from(i), Cow::Owned(v)))
        }
        _ => None,
    }
}

/// Memoizes compiled accessors per distinct pointer string.
#[derive(Debug, Default, Clone)]
pub struct CompiledPointerCache {
    entries: HashMap<String, Arc<CompiledPointer>>,
}

impl CompiledPointerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the accessor for an absolute `pointer`, compiling it on first use.
    pub fn get_or_compile(&mut self, pointer: &str) -> Result<Arc<CompiledPointer>, PointerError> {
        if let Some(compiled) = self.entries.get(pointer) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(compile_pointer_get(pointer, None)?);
        self.entries
            .insert(pointer.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiled_matches_interpreted_reads() {
        let data = json!({ "a": { "b": [10, 20, { "c": "deep" }] } });
        for pointer in ["/a/b/0", "/a/b/2/c", "/a/*/1", "/a/b#", "/a/b/2/c#", ""] {
            let compiled = compile_pointer_get(pointer, None).unwrap();
            assert_eq!(
                compiled.get(&data).unwrap().into_owned(),
                crate::pointer::pointer_get(&data, pointer).unwrap(),
                "pointer {pointer}"
            );
        }
    }

    #[test]
    fn compiled_borrows_when_possible() {
        let data = json!({ "a": { "b": 1 } });
        let compiled = compile_pointer_get("/a", None).unwrap();
        assert!(matches!(compiled.get(&data).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn compiled_with_default_continues_into_generated_value() {
        let data = json!({});
        let compiled = compile_pointer_get("/settings/theme", None)
            .unwrap()
            .with_default(Arc::new(|_: &MissingPath<'_>, _: &Value| {
                Ok::<_, PointerError>(json!({ "theme": "dark" }))
            }));
        assert_eq!(compiled.get(&data).unwrap().into_owned(), json!("dark"));
    }

    #[test]
    fn compiled_relative_pointer() {
        let data = json!({ "users": [{ "name": "ada", "age": 36 }] });
        let compiled = compile_pointer_get("1/age", Some("/users/0/name")).unwrap();
        assert_eq!(compiled.get(&data).unwrap().into_owned(), json!(36));

        let key = compile_pointer_get("1#", Some("/users/0/name")).unwrap();
        assert_eq!(key.get(&data).unwrap().into_owned(), json!(0));
    }

    #[test]
    fn cache_reuses_entries() {
        let mut cache = CompiledPointerCache::new();
        let first = cache.get_or_compile("/a/b").unwrap();
        let second = cache.get_or_compile("/a/b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }
}
