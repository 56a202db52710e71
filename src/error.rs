//! Error types for pointer resolution, schema navigation and cursors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing or walking a pointer.
///
/// Every variant names the offending pointer; navigation failures also carry
/// the zero-based index of the segment that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("invalid pointer \"{pointer}\": {reason}")]
    Parse { pointer: String, reason: String },

    #[error("relative pointer \"{pointer}\" needs a root pointer")]
    MissingRoot { pointer: String },

    #[error("relative pointer \"{pointer}\" goes up {levels} level(s) but root \"{root}\" has depth {depth}")]
    RootTooShallow {
        pointer: String,
        root: String,
        levels: usize,
        depth: usize,
    },

    #[error("\"{pointer}\" not found at segment {segment}")]
    NotFound { pointer: String, segment: usize },

    #[error("\"{pointer}\": index {index} out of bounds for array of length {len} at segment {segment}")]
    IndexOutOfBounds {
        pointer: String,
        segment: usize,
        index: usize,
        len: usize,
    },

    #[error("\"{pointer}\": \"{token}\" is not an array index at segment {segment}")]
    InvalidIndex {
        pointer: String,
        segment: usize,
        token: String,
    },

    #[error("\"{pointer}\": cannot descend into {actual} at segment {segment}")]
    NotContainer {
        pointer: String,
        segment: usize,
        actual: String,
    },

    #[error("\"{pointer}\": '-' cannot be read (segment {segment})")]
    DashInRead { pointer: String, segment: usize },

    #[error("\"{pointer}\": '-' is only valid as the last segment (segment {segment})")]
    DashNotLast { pointer: String, segment: usize },

    #[error("\"{pointer}\": '*' is ambiguous in a write (segment {segment})")]
    StarInWrite { pointer: String, segment: usize },

    #[error("\"{pointer}\": key pointers ('#') cannot be written")]
    KeyInWrite { pointer: String },
}

/// Errors while building or querying a schema navigator.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("no property root found for prefix \"{prefix}\"")]
    NoPropertyRoot { prefix: String },

    #[error("no identity property found for entity \"{entity}\"")]
    NoIdentity { entity: String },

    #[error("unresolved $ref \"{reference}\"")]
    UnresolvedRef { reference: String },

    #[error("invalid patternProperties regex \"{pattern}\": {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("link \"{href}\" parameter \"{parameter}\" has no value")]
    UnresolvedLinkParameter { href: String, parameter: String },

    #[error("malformed URI template \"{template}\": {message}")]
    InvalidTemplate { template: String, message: String },

    #[error(transparent)]
    Pointer(#[from] PointerError),
}

/// Errors surfaced by cursor operations.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("page must be a positive integer, got {page}")]
    InvalidPage { page: usize },

    #[error("page {page} is beyond the last page ({total_pages})")]
    PageOutOfRange { page: usize, total_pages: usize },

    #[error("page size must be positive")]
    InvalidLimit,

    #[error("unknown column \"{id}\"")]
    ColumnNotFound { id: String },

    #[error("column \"{id}\" is not sortable")]
    ColumnNotSortable { id: String },

    #[error("column \"{id}\" is not filterable")]
    ColumnNotFilterable { id: String },

    #[error("unknown filter operator \"{operator}\"")]
    UnknownOperator { operator: String },

    #[error("page fetch failed: {message}")]
    Fetch { message: String },

    #[error(transparent)]
    Pointer(#[from] PointerError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Errors loading schema or data documents.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("schema \"{id}\" not found")]
    SchemaNotFound { id: String },
}

/// Errors from schema caches and their storage.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("schema has no \"id\" or \"$id\"")]
    MissingId,

    #[error("storage error for \"{key}\": {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stored schema \"{key}\" is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors during validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Load(e) => e.exit_code(),
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("schema.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::SchemaNotFound {
            id: "user.json".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validate_error_exit_codes() {
        let err = ValidateError::Invalid {
            errors: vec![SchemaError {
                path: "/id".into(),
                message: "missing required field".into(),
            }],
        };
        assert_eq!(err.exit_code(), 1);

        let err = ValidateError::InvalidSchema {
            message: "bad".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn pointer_error_names_pointer_and_segment() {
        let err = PointerError::NotFound {
            pointer: "/a/b".into(),
            segment: 1,
        };
        assert_eq!(err.to_string(), "\"/a/b\" not found at segment 1");
    }

    #[test]
    fn cursor_error_wraps_pointer_error() {
        let err: CursorError = PointerError::KeyInWrite {
            pointer: "/a#".into(),
        }
        .into();
        assert!(matches!(err, CursorError::Pointer(_)));
    }
}
