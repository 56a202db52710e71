//! JSON Pointer engine.
//!
//! Supports three pointer forms:
//!
//! | Form | Example | Meaning |
//! |------|---------|---------|
//! | absolute | `/users/0/name` | RFC 6901 pointer from the document root |
//! | star | `/users/*/name` | `*` matches the first element on reads, every element when expanding |
//! | relative | `1/name`, `0#` | go up N levels from a root pointer, then continue (or return the key) |
//!
//! A trailing `#` on the last segment asks for the key at that location
//! instead of its value.
//!
//! # Example
//!
//! ```
//! use hyperschema_nav::{pointer_get, pointer_get_all, pointer_set};
//! use serde_json::json;
//!
//! let mut data = json!({ "users": [{ "name": "ada" }, { "name": "alan" }] });
//!
//! assert_eq!(pointer_get(&data, "/users/*/name").unwrap(), json!("ada"));
//! assert_eq!(
//!     pointer_get_all(&data, "/users/*/name", None, None).unwrap(),
//!     vec![json!("ada"), json!("alan")]
//! );
//!
//! pointer_set(&mut data, "/users/-", json!({ "name": "grace" })).unwrap();
//! assert_eq!(pointer_get(&data, "/users/2/name").unwrap(), json!("grace"));
//! ```

mod access;
mod compiled;
mod mask;

pub use access::{
    pointer_copy, pointer_expand, pointer_get, pointer_get_all, pointer_get_ref, pointer_get_with,
    pointer_remove, pointer_remove_with, pointer_set, pointer_set_with, try_pointer_get,
    DefaultGenerator, MissingPath, NotFoundDefault,
};
pub use compiled::{compile_pointer_get, CompiledPointer, CompiledPointerCache};
pub use mask::{pointer_exclusion_mask, pointer_inclusion_mask};

use crate::error::PointerError;

/// Wildcard segment.
pub const STAR: &str = "*";

/// "One past the end" array segment.
pub const DASH: &str = "-";

/// A pointer split into its components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPointer {
    /// Levels to ascend for relative pointers; `None` for absolute ones.
    pub root: Option<usize>,
    /// Unescaped path segments.
    pub parts: Vec<String>,
    /// Whether the key, not the value, was requested (`#`).
    pub key_modifier: bool,
}

impl ParsedPointer {
    pub fn is_relative(&self) -> bool {
        self.root.is_some()
    }

    pub fn has_star(&self) -> bool {
        self.parts.iter().any(|p| p == STAR)
    }
}

/// A pointer with any relative prefix resolved against its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustedPointer {
    Path { parts: Vec<String>, key_modifier: bool },
    /// `N#` form: the key found `N` levels above the root, and the path of
    /// the container that holds it.
    Key { parent: Vec<String>, key: String },
}

/// Split a pointer into `(root, parts, modifier)`.
///
/// # Errors
///
/// Returns `PointerError::Parse` if the pointer neither starts with `/` nor
/// with a non-negative integer, or contains an invalid `~` escape.
pub fn parse_pointer(pointer: &str) -> Result<ParsedPointer, PointerError> {
    if pointer.is_empty() {
        return Ok(ParsedPointer {
            root: None,
            parts: Vec::new(),
            key_modifier: false,
        });
    }

    // `N#` on its own: the key N levels up
    if let Some(levels) = pointer.strip_suffix('#').and_then(parse_level) {
        return Ok(ParsedPointer {
            root: Some(levels),
            parts: Vec::new(),
            key_modifier: true,
        });
    }

    let mut segments = pointer.split('/');
    let first = segments.next().unwrap_or_default();
    let root = if first.is_empty() {
        None
    } else {
        Some(parse_level(first).ok_or_else(|| PointerError::Parse {
            pointer: pointer.to_string(),
            reason: "must start with '/' or a non-negative integer".to_string(),
        })?)
    };

    let mut parts = segments
        .map(|segment| unescape_segment(pointer, segment))
        .collect::<Result<Vec<_>, _>>()?;

    let mut key_modifier = false;
    if let Some(last) = parts.last_mut() {
        if last.ends_with('#') {
            last.pop();
            key_modifier = true;
        }
    }

    Ok(ParsedPointer {
        root,
        parts,
        key_modifier,
    })
}

/// Resolve a relative pointer against `root`; absolute pointers pass through.
///
/// # Errors
///
/// Fails when a relative pointer has no root, when the root is itself
/// relative, or when the pointer climbs above the root's depth.
pub fn parse_pointer_root_adjusted(
    pointer: &str,
    root: Option<&str>,
) -> Result<AdjustedPointer, PointerError> {
    let parsed = parse_pointer(pointer)?;
    let Some(levels) = parsed.root else {
        return Ok(AdjustedPointer::Path {
            parts: parsed.parts,
            key_modifier: parsed.key_modifier,
        });
    };

    let root_pointer = root.ok_or_else(|| PointerError::MissingRoot {
        pointer: pointer.to_string(),
    })?;
    let root_parsed = parse_pointer(root_pointer)?;
    if root_parsed.is_relative() {
        return Err(PointerError::Parse {
            pointer: root_pointer.to_string(),
            reason: "root pointer must be absolute".to_string(),
        });
    }

    let depth = root_parsed.parts.len();
    let too_shallow = || PointerError::RootTooShallow {
        pointer: pointer.to_string(),
        root: root_pointer.to_string(),
        levels,
        depth,
    };

    if levels > depth {
        return Err(too_shallow());
    }

    let mut root_parts = root_parsed.parts;

    if parsed.key_modifier && parsed.parts.is_empty() {
        // the document root has no key
        if levels >= depth {
            return Err(too_shallow());
        }
        root_parts.truncate(depth - levels);
        let key = root_parts.pop().unwrap_or_default();
        return Ok(AdjustedPointer::Key {
            parent: root_parts,
            key,
        });
    }

    root_parts.truncate(depth - levels);
    root_parts.extend(parsed.parts);
    Ok(AdjustedPointer::Path {
        parts: root_parts,
        key_modifier: parsed.key_modifier,
    })
}

/// True for absolute pointers, star pointers included.
pub fn is_json_pointer(pointer: &str) -> bool {
    matches!(parse_pointer(pointer), Ok(p) if !p.is_relative())
}

/// True for absolute pointers with at least one `*` segment.
pub fn is_star_pointer(pointer: &str) -> bool {
    matches!(parse_pointer(pointer), Ok(p) if !p.is_relative() && p.has_star())
}

/// True for IETF relative JSON pointers (`0/foo`, `2#`).
pub fn is_relative_json_pointer(pointer: &str) -> bool {
    matches!(parse_pointer(pointer), Ok(p) if p.is_relative())
}

/// Escape a single segment (`~` → `~0`, `/` → `~1`).
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Build an absolute pointer from unescaped segments.
pub fn format_pointer<S: AsRef<str>>(parts: &[S]) -> String {
    parts.iter().fold(String::new(), |mut acc, part| {
        acc.push('/');
        acc.push_str(&escape_segment(part.as_ref()));
        acc
    })
}

/// Parse an array index token: digits only, no leading zeros.
pub(crate) fn parse_index(token: &str) -> Option<usize> {
    parse_level(token)
}

/// True if a segment addresses an array slot when creating containers.
pub(crate) fn is_array_token(token: &str) -> bool {
    token == DASH || parse_index(token).is_some()
}

fn parse_level(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn unescape_segment(pointer: &str, segment: &str) -> Result<String, PointerError> {
    if !segment.contains('~') {
        return Ok(segment.to_string());
    }

    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(PointerError::Parse {
                    pointer: pointer.to_string(),
                    reason: "'~' must be followed by '0' or '1'".to_string(),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_absolute() {
        let p = parse_pointer("/a/b/0").unwrap();
        assert_eq!(p.root, None);
        assert_eq!(p.parts, vec!["a", "b", "0"]);
        assert!(!p.key_modifier);
    }

    #[test]
    fn parse_empty_is_whole_document() {
        let p = parse_pointer("").unwrap();
        assert!(p.parts.is_empty());
        assert!(!p.is_relative());
    }

    #[test]
    fn parse_unescapes() {
        let p = parse_pointer("/a~1b/c~0d/~01").unwrap();
        assert_eq!(p.parts, vec!["a/b", "c~d", "~1"]);
    }

    #[test]
    fn parse_bad_escape() {
        assert!(matches!(
            parse_pointer("/a~2"),
            Err(PointerError::Parse { .. })
        ));
    }

    #[test]
    fn parse_key_only_relative() {
        let p = parse_pointer("2#").unwrap();
        assert_eq!(p.root, Some(2));
        assert!(p.parts.is_empty());
        assert!(p.key_modifier);
    }

    #[test]
    fn parse_relative_with_rest() {
        let p = parse_pointer("1/name").unwrap();
        assert_eq!(p.root, Some(1));
        assert_eq!(p.parts, vec!["name"]);
    }

    #[test]
    fn parse_trailing_key_modifier() {
        let p = parse_pointer("/users/*#").unwrap();
        assert_eq!(p.parts, vec!["users", "*"]);
        assert!(p.key_modifier);
    }

    #[test]
    fn parse_rejects_garbage_and_negative() {
        assert!(parse_pointer("users/0").is_err());
        assert!(parse_pointer("-1/a").is_err());
        assert!(parse_pointer("01/a").is_err());
    }

    #[test]
    fn root_adjusted_splices_root() {
        let adjusted = parse_pointer_root_adjusted("1/name", Some("/users/3/address")).unwrap();
        assert_eq!(
            adjusted,
            AdjustedPointer::Path {
                parts: vec!["users".into(), "3".into(), "name".into()],
                key_modifier: false,
            }
        );
    }

    #[test]
    fn root_adjusted_key_form() {
        let adjusted = parse_pointer_root_adjusted("0#", Some("/users/3")).unwrap();
        assert_eq!(
            adjusted,
            AdjustedPointer::Key {
                parent: vec!["users".into()],
                key: "3".into(),
            }
        );

        let adjusted = parse_pointer_root_adjusted("1#", Some("/users/3")).unwrap();
        assert_eq!(
            adjusted,
            AdjustedPointer::Key {
                parent: vec![],
                key: "users".into(),
            }
        );
    }

    #[test]
    fn root_adjusted_too_shallow() {
        assert!(matches!(
            parse_pointer_root_adjusted("5#", Some("/a/b")),
            Err(PointerError::RootTooShallow { levels: 5, depth: 2, .. })
        ));
        assert!(matches!(
            parse_pointer_root_adjusted("3/x", Some("/a/b")),
            Err(PointerError::RootTooShallow { .. })
        ));
        // climbing to the document root is fine, naming its key is not
        assert!(parse_pointer_root_adjusted("2/x", Some("/a/b")).is_ok());
        assert!(parse_pointer_root_adjusted("2#", Some("/a/b")).is_err());
    }

    #[test]
    fn root_adjusted_requires_root() {
        assert!(matches!(
            parse_pointer_root_adjusted("0/x", None),
            Err(PointerError::MissingRoot { .. })
        ));
    }

    #[test]
    fn pointer_kind_predicates() {
        assert!(is_json_pointer("/a/b"));
        assert!(is_json_pointer(""));
        assert!(!is_json_pointer("1/a"));
        assert!(is_star_pointer("/a/*/b"));
        assert!(!is_star_pointer("/a/b"));
        assert!(is_relative_json_pointer("0#"));
        assert!(is_relative_json_pointer("2/a"));
        assert!(!is_relative_json_pointer("/a"));
    }

    #[test]
    fn format_escapes() {
        assert_eq!(format_pointer(&["a/b", "c~d"]), "/a~1b/c~0d");
        assert_eq!(format_pointer::<&str>(&[]), "");
    }
}
